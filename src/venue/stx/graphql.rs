//! GraphQL transport.
//!
//! Every request is a POST of `{query, variables}`. The venue answers 200
//! with `{data, errors}` for both success and business failures, so the body
//! is inspected before the status code is trusted.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::SdkError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "stx-worker/0.1.0";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphQlError {
    fn is_auth(&self) -> bool {
        let code = self
            .extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if code.eq_ignore_ascii_case("UNAUTHENTICATED") {
            return true;
        }
        let msg = self.message.to_lowercase();
        msg.contains("unauthorized") || msg.contains("unauthenticated")
    }
}

/// Thin GraphQL client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    http: Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SdkError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SdkError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Run `document` and deserialize `data.<field>`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
        field: &str,
        token: Option<&SecretString>,
    ) -> Result<T, SdkError> {
        debug!(endpoint = %self.endpoint, field, "GraphQL request");

        let mut req = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "query": document, "variables": variables }));
        if let Some(token) = token {
            req = req.bearer_auth(token.expose_secret());
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_response(status, &body, field)
    }
}

/// Turn a raw HTTP answer into `data.<field>` or a classified error.
pub(crate) fn parse_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
    field: &str,
) -> Result<T, SdkError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SdkError::Auth(format!("{status}: {body}")));
    }

    let parsed: GraphQlResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) if !status.is_success() => {
            return Err(SdkError::Api(format!("{status}: {body}")));
        }
        Err(e) => return Err(SdkError::Decode(e.to_string())),
    };

    if !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(if parsed.errors.iter().any(GraphQlError::is_auth) {
            SdkError::Auth(message)
        } else {
            SdkError::Api(message)
        });
    }

    if !status.is_success() {
        return Err(SdkError::Api(format!("{status}: {body}")));
    }

    let value = parsed
        .data
        .and_then(|mut d| d.get_mut(field).map(Value::take))
        .ok_or_else(|| SdkError::Decode(format!("response has no data.{field}")))?;

    serde_json::from_value(value).map_err(|e| SdkError::Decode(format!("data.{field}: {e}")))
}
