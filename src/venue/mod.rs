//! Venue integration.
//!
//! Defines the traits the worker core depends on, one per collaborator:
//! - `SessionClient`: login, tokens, session-status feed
//! - `MarketCatalog`: sports/competitions and market metadata
//! - `OrderGateway`: cancel-all and place-and-confirm
//! - `EventChannel`: one push subscription (market, orders, trades, portfolio)
//!
//! `stx` implements all of them against the GraphQL endpoint and the
//! websocket channels.

pub mod stx;

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SdkError;
use crate::types::{
    ConfirmedOrder, MarketInfo, MarketInfoFilter, OrderRequest, SessionMessage,
    SportAndCompetitions, Tokens, UserData,
};

#[cfg(test)]
use mockall::automock;

/// Callback invoked on every session-status change.
pub type SessionStatusHandler = Arc<dyn Fn(SessionMessage) + Send + Sync>;

/// Owner of the authenticated session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Authenticate once. With `keep_session_alive` the client refreshes
    /// its tokens in the background for the rest of the process.
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
        keep_session_alive: bool,
    ) -> Result<UserData, SdkError>;

    /// Current tokens, if logged in.
    fn tokens(&self) -> Option<Tokens>;

    /// Install the single session-status handler, replacing any previous one.
    fn set_session_status_handler(&self, handler: SessionStatusHandler);
}

/// Read-only market metadata.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn sport_and_competitions(&self) -> Result<Vec<SportAndCompetitions>, SdkError>;

    async fn market_infos(&self, filter: &MarketInfoFilter) -> Result<Vec<MarketInfo>, SdkError>;
}

/// Order entry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Cancel every working order for the session. Succeeds when there are none.
    async fn cancel_all_orders(&self) -> Result<(), SdkError>;

    /// Place a single order and wait for the venue to confirm it.
    async fn confirm_order(&self, request: &OrderRequest) -> Result<ConfirmedOrder, SdkError>;
}

/// A push subscription delivering payloads of type `T`.
///
/// `subscribe` connects and returns the inbound stream. Messages arrive in
/// the order the venue sent them. The worker never calls `subscribe` directly;
/// it goes through `engine::channels`, which binds the handler first.
#[async_trait]
pub trait EventChannel<T: Send + 'static>: Send + Sync {
    /// Short name used in logs and startup errors.
    fn name(&self) -> &'static str;

    async fn subscribe(&self) -> Result<mpsc::Receiver<T>, SdkError>;
}
