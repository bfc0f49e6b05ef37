//! Shared types for the STX worker.
//!
//! These mirror the venue's GraphQL and channel payloads closely enough to
//! deserialize them directly, and they are also what the record sink
//! serializes when it prints a status line.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// Trading status of a market as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    PreOpen,
    Closed,
    Suspended,
    Settled,
    #[serde(other)]
    Unknown,
}

impl MarketStatus {
    /// Statuses that accept new orders.
    pub const OPEN_SET: &'static [MarketStatus] = &[MarketStatus::Open, MarketStatus::PreOpen];

    pub fn is_open(&self) -> bool {
        Self::OPEN_SET.contains(self)
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::PreOpen => write!(f, "pre_open"),
            MarketStatus::Closed => write!(f, "closed"),
            MarketStatus::Suspended => write!(f, "suspended"),
            MarketStatus::Settled => write!(f, "settled"),
            MarketStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Market descriptor returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub market_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub status: MarketStatus,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub competition: Option<String>,
    #[serde(default)]
    pub open_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
}

impl MarketInfo {
    /// Minimal market with just an id and status.
    pub fn new(market_id: impl Into<String>, status: MarketStatus) -> Self {
        Self {
            market_id: market_id.into(),
            title: None,
            status,
            sport: None,
            competition: None,
            open_time: None,
            close_time: None,
        }
    }
}

/// The tradeable universe as of startup. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    markets: Vec<MarketInfo>,
}

impl MarketSnapshot {
    pub fn new(markets: Vec<MarketInfo>) -> Self {
        Self { markets }
    }

    /// Markets whose status accepts orders, in catalog order.
    pub fn open_markets(&self) -> impl Iterator<Item = &MarketInfo> {
        self.markets.iter().filter(|m| m.status.is_open())
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

/// A sport and the competitions listed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportAndCompetitions {
    pub sport: String,
    #[serde(default)]
    pub competitions: Vec<String>,
}

/// Filter for the market catalog query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfoFilter {
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub sport_and_competitions: Vec<SportAndCompetitions>,
}

impl MarketInfoFilter {
    /// Window of `days` starting at `from`, restricted to `sports`.
    /// An out-of-range window ends at the latest representable time.
    pub fn forward_window(
        from: DateTime<Utc>,
        days: i64,
        sports: Vec<SportAndCompetitions>,
    ) -> Self {
        let to_time = Duration::try_days(days)
            .and_then(|span| from.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            from_time: from,
            to_time,
            sport_and_competitions: sports,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Tokens held by the session client.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub token: SecretString,
    pub refresh_token: SecretString,
    pub user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Account details returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Out-of-band session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    LoggedIn,
    TokenRefreshed,
    TokenRefreshFailed,
    SessionExpired,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::LoggedIn => write!(f, "LoggedIn"),
            SessionStatus::TokenRefreshed => write!(f, "TokenRefreshed"),
            SessionStatus::TokenRefreshFailed => write!(f, "TokenRefreshFailed"),
            SessionStatus::SessionExpired => write!(f, "SessionExpired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub status: SessionStatus,
    pub message: String,
}

impl SessionMessage {
    pub fn new(status: SessionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Buy => write!(f, "BUY"),
            OrderAction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

/// A single order to place and confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub market_id: String,
    /// Price in venue ticks (cents).
    pub price: u32,
    pub quantity: u32,
    pub action: OrderAction,
    pub order_type: OrderType,
}

/// Order as the venue reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub market_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub price: Option<u32>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub filled_quantity: Option<u32>,
    #[serde(default)]
    pub action: Option<OrderAction>,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub inserted_at: Option<DateTime<Utc>>,
}

/// Result of a successful place-and-confirm call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedOrder {
    pub order: Order,
    #[serde(default)]
    pub status: Option<String>,
}

impl ConfirmedOrder {
    pub fn order_id(&self) -> &str {
        &self.order.id
    }
}

// ---------------------------------------------------------------------------
// Channel payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: i64,
}

/// Market channel push: status/price update for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketChannelData {
    pub market_id: String,
    #[serde(default)]
    pub status: Option<MarketStatus>,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub offers: Vec<PriceLevel>,
    #[serde(default)]
    pub last_traded_price: Option<Decimal>,
}

/// Snapshot of the account's working orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActiveOrders {
    #[serde(default)]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTrade {
    pub trade_id: String,
    pub order_id: String,
    pub market_id: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub action: Option<OrderAction>,
    #[serde(default)]
    pub traded_at: Option<DateTime<Utc>>,
}

/// Snapshot of the account's trades. The list itself may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActiveTrades {
    #[serde(default)]
    pub trades: Option<Vec<ActiveTrade>>,
}

impl ActiveTrades {
    /// First trade that filled the given order.
    pub fn find_by_order_id(&self, order_id: &str) -> Option<&ActiveTrade> {
        self.trades
            .as_deref()
            .and_then(|trades| trades.iter().find(|t| t.order_id == order_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    pub market_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Option<Decimal>,
}

/// Current holdings and balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub balance: Decimal,
    #[serde(default)]
    pub buying_power: Option<Decimal>,
    #[serde(default)]
    pub positions: Vec<PortfolioPosition>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
