//! Callbacks for the session feed and the four push channels.
//!
//! Handlers run on the channels' own tasks, concurrently with the control
//! loop and with each other. They only read shared state and emit records.

use std::sync::Arc;
use tracing::{debug, trace};

use super::sink::Record;
use super::state::SharedState;
use crate::types::{ActiveOrders, ActiveTrades, MarketChannelData, Portfolio, SessionMessage};

#[derive(Clone)]
pub struct EventHandlers {
    state: Arc<SharedState>,
}

impl EventHandlers {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// Observe only; the session client handles refreshes itself.
    pub fn on_session_status(&self, message: SessionMessage) {
        debug!(status = %message.status, message = %message.message, "Session status");
        self.state.emit(Record::SessionStatus(message));
    }

    /// Hook for market-driven logic. Intentionally does nothing yet.
    pub fn on_market_update(&self, data: MarketChannelData) {
        trace!(market_id = %data.market_id, status = ?data.status, "Market update");
    }

    pub fn on_orders_update(&self, orders: ActiveOrders) {
        self.state.emit(Record::Orders(orders));
    }

    pub fn on_portfolio_update(&self, portfolio: Option<Portfolio>) {
        if let Some(portfolio) = portfolio {
            self.state.emit(Record::Portfolio(portfolio));
        }
    }

    /// Report the trade that filled our latest order, if it is in the snapshot.
    pub fn on_trades_update(&self, trades: Option<ActiveTrades>) {
        if !self.state.has_placed_order() {
            return;
        }
        let Some(trades) = trades.filter(|t| t.trades.is_some()) else {
            return;
        };

        self.state.emit_with_placed_order(|placed| {
            placed
                .and_then(|id| trades.find_by_order_id(id))
                .cloned()
                .map(Record::Trade)
        });
    }
}
