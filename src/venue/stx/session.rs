//! Session client: login, token storage, and background keep-alive.
//!
//! Auth flow: `login` mutation with email/password/device id returns an
//! access token, a refresh token and its lifetime. With keep-alive enabled a
//! task refreshes the token `REFRESH_LEAD` before it expires and reports each
//! outcome to the session-status handler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::graphql::GraphQlClient;
use crate::error::SdkError;
use crate::types::{SessionMessage, SessionStatus, Tokens, UserData};
use crate::venue::{SessionClient, SessionStatusHandler};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const LOGIN_MUTATION: &str = r#"
mutation login($credentials: Credentials!) {
  login(credentials: $credentials) {
    token
    refreshToken
    userId
    email
    sessionId
    expiresIn
  }
}"#;

const NEW_TOKEN_MUTATION: &str = r#"
mutation newToken($refreshToken: String!) {
  newToken(refreshToken: $refreshToken) {
    token
    refreshToken
    userId
    email
    sessionId
    expiresIn
  }
}"#;

/// Refresh this long before the token expires.
const REFRESH_LEAD: Duration = Duration::from_secs(60);

/// Refresh period when the venue does not report a lifetime.
const FALLBACK_REFRESH: Duration = Duration::from_secs(600);

/// Never schedule refreshes closer together than this.
const MIN_REFRESH: Duration = Duration::from_secs(5);

const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    expires_in: Option<i64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct SessionInner {
    gql: GraphQlClient,
    device_id: String,
    tokens: RwLock<Option<Tokens>>,
    handler: RwLock<Option<SessionStatusHandler>>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let task = self
            .keep_alive
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Venue session. Clones share the same tokens.
#[derive(Clone)]
pub struct StxSession {
    inner: Arc<SessionInner>,
}

impl StxSession {
    pub fn new(gql: GraphQlClient) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                gql,
                device_id: uuid::Uuid::new_v4().to_string(),
                tokens: RwLock::new(None),
                handler: RwLock::new(None),
                keep_alive: Mutex::new(None),
            }),
        }
    }

    /// Access token for authenticated calls.
    pub fn token(&self) -> Option<SecretString> {
        self.inner.current_tokens().map(|t| t.token)
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.current_tokens().map(|t| t.user_id)
    }

    /// Access token, or an auth error when nobody has logged in.
    pub fn require_token(&self) -> Result<SecretString, SdkError> {
        self.token()
            .ok_or_else(|| SdkError::Auth("not logged in".into()))
    }

    fn spawn_keep_alive(&self) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(keep_alive(weak));
        let previous = self
            .inner
            .keep_alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl SessionInner {
    fn current_tokens(&self) -> Option<Tokens> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, payload: TokenPayload) -> Tokens {
        let tokens = tokens_from_payload(&payload, Utc::now());
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        tokens
    }

    fn notify(&self, message: SessionMessage) {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(message),
            None => debug!(status = %message.status, "Session status with no handler"),
        }
    }

    async fn refresh(&self) -> Result<Tokens, SdkError> {
        let refresh_token = self
            .current_tokens()
            .map(|t| t.refresh_token)
            .ok_or_else(|| SdkError::Auth("no refresh token".into()))?;

        let payload: TokenPayload = self
            .gql
            .execute(
                NEW_TOKEN_MUTATION,
                serde_json::json!({ "refreshToken": refresh_token.expose_secret() }),
                "newToken",
                None,
            )
            .await?;
        Ok(self.store(payload))
    }
}

fn tokens_from_payload(payload: &TokenPayload, now: DateTime<Utc>) -> Tokens {
    Tokens {
        token: SecretString::new(payload.token.clone()),
        refresh_token: SecretString::new(payload.refresh_token.clone()),
        user_id: payload.user_id.clone(),
        expires_at: payload
            .expires_in
            .map(|secs| now + chrono::Duration::seconds(secs)),
    }
}

/// How long to wait before the next refresh.
fn refresh_delay(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    match expires_at {
        Some(at) => (at - now)
            .to_std()
            .ok()
            .and_then(|left| left.checked_sub(REFRESH_LEAD))
            .unwrap_or(MIN_REFRESH)
            .max(MIN_REFRESH),
        None => FALLBACK_REFRESH,
    }
}

async fn keep_alive(session: Weak<SessionInner>) {
    let mut backoff = Duration::from_secs(1);
    let mut expired_reported = false;

    loop {
        let delay = match session.upgrade() {
            Some(inner) => refresh_delay(
                inner.current_tokens().and_then(|t| t.expires_at),
                Utc::now(),
            ),
            None => return,
        };
        tokio::time::sleep(delay).await;

        loop {
            let Some(inner) = session.upgrade() else {
                return;
            };
            match inner.refresh().await {
                Ok(tokens) => {
                    info!(expires_at = ?tokens.expires_at, "Session token refreshed");
                    inner.notify(SessionMessage::new(
                        SessionStatus::TokenRefreshed,
                        "token refreshed",
                    ));
                    backoff = Duration::from_secs(1);
                    expired_reported = false;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "Session token refresh failed");
                    inner.notify(SessionMessage::new(
                        SessionStatus::TokenRefreshFailed,
                        e.to_string(),
                    ));
                    let expired = inner
                        .current_tokens()
                        .and_then(|t| t.expires_at)
                        .is_some_and(|at| at <= Utc::now());
                    if expired && !expired_reported {
                        inner.notify(SessionMessage::new(
                            SessionStatus::SessionExpired,
                            "access token expired",
                        ));
                        expired_reported = true;
                    }
                }
            }
            drop(inner);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
        }
    }
}

#[async_trait]
impl SessionClient for StxSession {
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
        keep_session_alive: bool,
    ) -> Result<UserData, SdkError> {
        info!(email, keep_session_alive, "Logging in");

        let variables = serde_json::json!({
            "credentials": {
                "email": email,
                "password": password.expose_secret(),
                "deviceId": self.inner.device_id,
            }
        });

        let payload: TokenPayload = self
            .inner
            .gql
            .execute(LOGIN_MUTATION, variables, "login", None)
            .await
            .map_err(|e| match e {
                SdkError::Api(msg) => SdkError::Auth(msg),
                other => other,
            })?;

        let user = UserData {
            user_id: payload.user_id.clone(),
            email: payload.email.clone(),
            session_id: payload.session_id.clone(),
        };
        let tokens = self.inner.store(payload);
        info!(user_id = %user.user_id, expires_at = ?tokens.expires_at, "Login successful");

        self.inner.notify(SessionMessage::new(
            SessionStatus::LoggedIn,
            format!("logged in as {email}"),
        ));

        if keep_session_alive {
            self.spawn_keep_alive();
        }
        Ok(user)
    }

    fn tokens(&self) -> Option<Tokens> {
        self.inner.current_tokens()
    }

    fn set_session_status_handler(&self, handler: SessionStatusHandler) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
