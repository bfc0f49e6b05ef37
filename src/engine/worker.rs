//! The worker: startup sequence and cancel-then-place control loop.
//!
//! `Worker::start` runs the one-time sequence (session handler → login →
//! tokens → catalog → channels) and yields a `RunningWorker`. The running
//! worker repeats `run_cycle` after a fixed delay until shutdown. Only
//! startup failures are fatal; every loop failure is logged and skipped.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::channels::{StartedChannel, UnboundChannel};
use super::handlers::EventHandlers;
use super::sink::{Record, RecordSink};
use super::state::SharedState;
use super::ticker::CycleTicker;
use crate::config::{Credentials, WorkerConfig};
use crate::error::{SdkError, StartupError};
use crate::strategy::{OrderStrategy, RandomLimitStrategy};
use crate::types::{
    ActiveOrders, ActiveTrades, MarketChannelData, MarketInfoFilter, MarketSnapshot, Portfolio,
    Tokens, UserData,
};
use crate::venue::{EventChannel, MarketCatalog, OrderGateway, SessionClient};

// ---------------------------------------------------------------------------
// Venue bundle
// ---------------------------------------------------------------------------

/// The four push subscriptions, not yet started.
pub struct VenueChannels {
    pub market: Box<dyn EventChannel<MarketChannelData>>,
    pub orders: Box<dyn EventChannel<ActiveOrders>>,
    pub trades: Box<dyn EventChannel<Option<ActiveTrades>>>,
    pub portfolio: Box<dyn EventChannel<Option<Portfolio>>>,
}

/// Everything the worker needs from the venue.
pub struct Venue {
    pub session: Arc<dyn SessionClient>,
    pub catalog: Arc<dyn MarketCatalog>,
    pub orders: Arc<dyn OrderGateway>,
    pub channels: VenueChannels,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one cancel-then-place cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub cancel_succeeded: bool,
    pub open_markets: usize,
    pub attempts: usize,
    pub placed: usize,
    pub failed: usize,
}

fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        cancelled = report.cancel_succeeded,
        open_markets = report.open_markets,
        attempts = report.attempts,
        placed = report.placed,
        failed = report.failed,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Worker (before startup)
// ---------------------------------------------------------------------------

pub struct Worker {
    venue: Venue,
    credentials: Credentials,
    config: WorkerConfig,
    state: Arc<SharedState>,
    strategy: Box<dyn OrderStrategy>,
}

impl Worker {
    /// Bounds in `config` are expected to be validated already.
    pub fn new(venue: Venue, credentials: Credentials, config: WorkerConfig, sink: RecordSink) -> Self {
        let strategy = Box::new(RandomLimitStrategy::new(&config));
        Self {
            venue,
            credentials,
            config,
            state: Arc::new(SharedState::new(sink)),
            strategy,
        }
    }

    /// Replace the default random strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn OrderStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Run the startup sequence. Any error here is fatal for the process.
    pub async fn start(self) -> Result<RunningWorker, StartupError> {
        let Worker {
            venue,
            credentials,
            config,
            state,
            strategy,
        } = self;
        let handlers = EventHandlers::new(state.clone());

        info!(strategy = strategy.name(), "Starting STX worker");

        // 1. Session status feed.
        let session_handlers = handlers.clone();
        venue
            .session
            .set_session_status_handler(Arc::new(move |msg| session_handlers.on_session_status(msg)));

        // 2. Login.
        let user = venue
            .session
            .login(&credentials.email, &credentials.password, config.keep_session_alive)
            .await
            .map_err(StartupError::Login)?;
        info!(user_id = %user.user_id, "Logged in");

        // 3. Tokens.
        let tokens = venue.session.tokens();
        if tokens.is_none() {
            warn!("Session reported no tokens after login");
        }

        // 4. Market catalog.
        let sports = venue
            .catalog
            .sport_and_competitions()
            .await
            .map_err(StartupError::Catalog)?;
        let filter = MarketInfoFilter::forward_window(Utc::now(), config.market_window_days, sports);
        let markets = venue
            .catalog
            .market_infos(&filter)
            .await
            .map_err(StartupError::Catalog)?;
        let snapshot = MarketSnapshot::new(markets);
        info!(
            markets = snapshot.len(),
            open = snapshot.open_markets().count(),
            "Market snapshot loaded"
        );

        // 5. Channels, in fixed order.
        let VenueChannels {
            market,
            orders,
            trades,
            portfolio,
        } = venue.channels;
        let mut channels = Vec::with_capacity(4);

        let h = handlers.clone();
        channels.push(start_channel(UnboundChannel::new(market), move |d| h.on_market_update(d)).await?);
        let h = handlers.clone();
        channels.push(start_channel(UnboundChannel::new(orders), move |o| h.on_orders_update(o)).await?);
        let h = handlers.clone();
        channels.push(start_channel(UnboundChannel::new(trades), move |t| h.on_trades_update(t)).await?);
        let h = handlers;
        channels.push(
            start_channel(UnboundChannel::new(portfolio), move |p| h.on_portfolio_update(p)).await?,
        );

        info!(channels = channels.len(), "Startup complete");

        Ok(RunningWorker {
            orders: venue.orders,
            config,
            state,
            strategy,
            snapshot,
            user,
            tokens,
            channels,
            cycles: 0,
        })
    }
}

async fn start_channel<T, F>(channel: UnboundChannel<T>, handler: F) -> Result<StartedChannel, StartupError>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let name = channel.name();
    let mut started = channel
        .bind(handler)
        .start()
        .await
        .map_err(|source| StartupError::ChannelStart {
            channel: name,
            source,
        })?;
    // `start` has returned; only now may the handler run.
    started.open();
    Ok(started)
}

// ---------------------------------------------------------------------------
// Running worker
// ---------------------------------------------------------------------------

pub struct RunningWorker {
    orders: Arc<dyn OrderGateway>,
    config: WorkerConfig,
    state: Arc<SharedState>,
    strategy: Box<dyn OrderStrategy>,
    snapshot: MarketSnapshot,
    user: UserData,
    tokens: Option<Tokens>,
    channels: Vec<StartedChannel>,
    cycles: u64,
}

impl RunningWorker {
    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn user(&self) -> &UserData {
        &self.user
    }

    pub fn tokens(&self) -> Option<&Tokens> {
        self.tokens.as_ref()
    }

    pub fn channels(&self) -> &[StartedChannel] {
        &self.channels
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One cancel-then-place pass over the open markets.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..CycleReport::default()
        };

        info!(cycle = report.cycle, "Cancelling orders");
        match self.orders.cancel_all_orders().await {
            Ok(()) => report.cancel_succeeded = true,
            Err(e) => warn!(cycle = report.cycle, error = %e, "Cancel all orders failed, continuing"),
        }

        for market in self.snapshot.open_markets() {
            report.open_markets += 1;
            info!(market_id = %market.market_id, "Placing orders on market");

            for attempt in 1..=self.config.orders_per_market {
                let request = self.strategy.next_order(market, attempt);
                debug!(
                    market_id = %market.market_id,
                    attempt,
                    price = request.price,
                    quantity = request.quantity,
                    "Placing order"
                );
                report.attempts += 1;

                match self.orders.confirm_order(&request).await {
                    Ok(confirmed) => {
                        report.placed += 1;
                        self.state.record_placed_order(confirmed).await;
                    }
                    Err(e) => {
                        report.failed += 1;
                        self.state
                            .emit_waiting(Record::OrderError {
                                market_id: market.market_id.clone(),
                                attempt,
                                message: order_error_message(&e),
                            })
                            .await;
                    }
                }
            }
        }

        report
    }

    /// Cycle forever (delay first) until `shutdown` resolves. Shutdown is
    /// also honoured mid-cycle; the in-flight venue call is abandoned.
    pub async fn run<S>(mut self, shutdown: S) -> u64
    where
        S: Future<Output = ()>,
    {
        let mut ticker = CycleTicker::new(self.config.cycle_delay());
        tokio::pin!(shutdown);

        info!(
            delay_ms = self.config.cycle_delay_ms,
            orders_per_market = self.config.orders_per_market,
            "Entering control loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    info!(cycles = self.cycles, "Shutdown signal received");
                    break;
                }
            }

            let outcome = tokio::select! {
                report = self.run_cycle() => Some(report),
                _ = &mut shutdown => None,
            };
            let Some(report) = outcome else {
                info!(cycles = self.cycles, "Shutdown signal received mid-cycle");
                break;
            };

            log_cycle_report(&report);
            for channel in self.channels.iter().filter(|c| c.is_finished()) {
                error!(channel = channel.name(), "Channel stream has ended");
            }
        }

        self.cycles
    }
}

fn order_error_message(e: &SdkError) -> String {
    match e {
        SdkError::Auth(m) | SdkError::Api(m) | SdkError::Connection(m) | SdkError::Decode(m) => {
            m.clone()
        }
    }
}
