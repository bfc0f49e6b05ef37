//! In-memory venue for integration testing.
//!
//! Implements every venue trait over one shared state. Each call is
//! appended to a timeline so tests can assert ordering, failures can be
//! forced per operation, and the four channels can be fed from test code.

use async_trait::async_trait;
use secrecy::SecretString;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use stx_worker::config::{Credentials, WorkerConfig};
use stx_worker::engine::{Venue, VenueChannels};
use stx_worker::error::SdkError;
use stx_worker::types::*;
use stx_worker::venue::{
    EventChannel, MarketCatalog, OrderGateway, SessionClient, SessionStatusHandler,
};

/// Which operations should fail, and how.
#[derive(Default, Clone)]
pub struct Failures {
    pub login: Option<SdkError>,
    pub catalog: Option<SdkError>,
    pub cancel: Option<SdkError>,
    pub confirm: Option<SdkError>,
    /// Name of a channel whose subscribe fails.
    pub channel: Option<&'static str>,
}

type Slot<T> = Mutex<Option<mpsc::Sender<T>>>;

#[derive(Default)]
struct Shared {
    timeline: Mutex<Vec<String>>,
    markets: Mutex<Vec<MarketInfo>>,
    failures: Mutex<Failures>,
    handler: Mutex<Option<SessionStatusHandler>>,
    order_seq: AtomicU64,
    market_tx: Slot<MarketChannelData>,
    orders_tx: Slot<ActiveOrders>,
    trades_tx: Slot<Option<ActiveTrades>>,
    portfolio_tx: Slot<Option<Portfolio>>,
}

impl Shared {
    fn log(&self, entry: impl Into<String>) {
        self.timeline.lock().unwrap().push(entry.into());
    }
}

/// A mock STX venue. Clone-free; hand out `venue()` bundles instead.
pub struct MockVenue {
    shared: Arc<Shared>,
}

impl MockVenue {
    pub fn new(markets: Vec<MarketInfo>) -> Self {
        let shared = Shared::default();
        *shared.markets.lock().unwrap() = markets;
        Self {
            shared: Arc::new(shared),
        }
    }

    /// One open market, one pre-open, one closed.
    pub fn with_default_markets() -> Self {
        Self::new(vec![
            MarketInfo::new("MKT-OPEN", MarketStatus::Open),
            MarketInfo::new("MKT-PRE", MarketStatus::PreOpen),
            MarketInfo::new("MKT-CLOSED", MarketStatus::Closed),
        ])
    }

    pub fn set_failures(&self, failures: Failures) {
        *self.shared.failures.lock().unwrap() = failures;
    }

    pub fn timeline(&self) -> Vec<String> {
        self.shared.timeline.lock().unwrap().clone()
    }

    /// Build a worker-facing bundle over this venue's state.
    pub fn venue(&self) -> Venue {
        Venue {
            session: Arc::new(MockSession(self.shared.clone())),
            catalog: Arc::new(MockCatalog(self.shared.clone())),
            orders: Arc::new(MockOrders(self.shared.clone())),
            channels: VenueChannels {
                market: Box::new(MockChannel::new("market", &self.shared, |s| &s.market_tx)),
                orders: Box::new(MockChannel::new("orders", &self.shared, |s| &s.orders_tx)),
                trades: Box::new(MockChannel::new("trades", &self.shared, |s| &s.trades_tx)),
                portfolio: Box::new(MockChannel::new("portfolio", &self.shared, |s| {
                    &s.portfolio_tx
                })),
            },
        }
    }

    /// Fire a session-status event through the installed handler.
    pub fn push_session_status(&self, message: SessionMessage) {
        let handler = self.shared.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub async fn push_trades(&self, trades: Option<ActiveTrades>) {
        let tx = self.shared.trades_tx.lock().unwrap().clone();
        tx.expect("trades channel not subscribed").send(trades).await.unwrap();
    }

    pub async fn push_orders(&self, orders: ActiveOrders) {
        let tx = self.shared.orders_tx.lock().unwrap().clone();
        tx.expect("orders channel not subscribed").send(orders).await.unwrap();
    }

    pub async fn push_portfolio(&self, portfolio: Option<Portfolio>) {
        let tx = self.shared.portfolio_tx.lock().unwrap().clone();
        tx.expect("portfolio channel not subscribed").send(portfolio).await.unwrap();
    }

    pub async fn push_market(&self, data: MarketChannelData) {
        let tx = self.shared.market_tx.lock().unwrap().clone();
        tx.expect("market channel not subscribed").send(data).await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

struct MockSession(Arc<Shared>);

#[async_trait]
impl SessionClient for MockSession {
    async fn login(
        &self,
        email: &str,
        _password: &SecretString,
        keep_session_alive: bool,
    ) -> Result<UserData, SdkError> {
        self.0.log(format!("login:{email}:{keep_session_alive}"));
        if let Some(e) = self.0.failures.lock().unwrap().login.clone() {
            return Err(e);
        }
        let handler = self.0.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(SessionMessage::new(SessionStatus::LoggedIn, "logged in"));
        }
        Ok(UserData {
            user_id: "user-1".into(),
            email: Some(email.to_string()),
            session_id: Some("session-1".into()),
        })
    }

    fn tokens(&self) -> Option<Tokens> {
        self.0.log("tokens");
        Some(Tokens {
            token: SecretString::new("token".into()),
            refresh_token: SecretString::new("refresh".into()),
            user_id: "user-1".into(),
            expires_at: None,
        })
    }

    fn set_session_status_handler(&self, handler: SessionStatusHandler) {
        self.0.log("set_session_status_handler");
        *self.0.handler.lock().unwrap() = Some(handler);
    }
}

struct MockCatalog(Arc<Shared>);

#[async_trait]
impl MarketCatalog for MockCatalog {
    async fn sport_and_competitions(&self) -> Result<Vec<SportAndCompetitions>, SdkError> {
        self.0.log("sport_and_competitions");
        if let Some(e) = self.0.failures.lock().unwrap().catalog.clone() {
            return Err(e);
        }
        Ok(vec![SportAndCompetitions {
            sport: "Soccer".into(),
            competitions: vec!["Premier League".into()],
        }])
    }

    async fn market_infos(&self, filter: &MarketInfoFilter) -> Result<Vec<MarketInfo>, SdkError> {
        self.0.log(format!(
            "market_infos:{}",
            (filter.to_time - filter.from_time).num_days()
        ));
        Ok(self.0.markets.lock().unwrap().clone())
    }
}

struct MockOrders(Arc<Shared>);

#[async_trait]
impl OrderGateway for MockOrders {
    async fn cancel_all_orders(&self) -> Result<(), SdkError> {
        self.0.log("cancel_all_orders");
        match self.0.failures.lock().unwrap().cancel.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn confirm_order(&self, request: &OrderRequest) -> Result<ConfirmedOrder, SdkError> {
        self.0.log(format!("confirm_order:{}", request.market_id));
        if let Some(e) = self.0.failures.lock().unwrap().confirm.clone() {
            return Err(e);
        }
        let n = self.0.order_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConfirmedOrder {
            order: Order {
                id: format!("order-{n}"),
                market_id: request.market_id.clone(),
                status: Some("open".into()),
                price: Some(request.price),
                quantity: Some(request.quantity),
                filled_quantity: Some(0),
                action: Some(request.action),
                order_type: Some(request.order_type),
                inserted_at: None,
            },
            status: Some("confirmed".into()),
        })
    }
}

struct MockChannel<T> {
    name: &'static str,
    shared: Arc<Shared>,
    slot: fn(&Shared) -> &Slot<T>,
}

impl<T> MockChannel<T> {
    fn new(name: &'static str, shared: &Arc<Shared>, slot: fn(&Shared) -> &Slot<T>) -> Self {
        Self {
            name,
            shared: shared.clone(),
            slot,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> EventChannel<T> for MockChannel<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<T>, SdkError> {
        self.shared.log(format!("subscribe:{}", self.name));
        if self.shared.failures.lock().unwrap().channel == Some(self.name) {
            return Err(SdkError::Connection(format!("{} refused", self.name)));
        }
        let (tx, rx) = mpsc::channel(64);
        *(self.slot)(&self.shared).lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn credentials() -> Credentials {
    Credentials {
        email: "trader@example.com".into(),
        password: SecretString::new("hunter2".into()),
    }
}

pub fn worker_config(orders_per_market: u32) -> WorkerConfig {
    WorkerConfig {
        orders_per_market,
        cycle_delay_ms: 10,
        ..WorkerConfig::default()
    }
}

/// `Write` target shared with the test, standing in for stdout.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Poll `cond` until it holds, yielding to the runtime between tries.
pub async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
