//! Uniform random BUY/LIMIT orders.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::OrderStrategy;
use crate::config::{WorkerConfig, MIN_ORDER_PRICE, MIN_ORDER_QUANTITY};
use crate::types::{MarketInfo, OrderAction, OrderRequest, OrderType};

/// Draws price from `[MIN_ORDER_PRICE, max_price)` and quantity from
/// `[MIN_ORDER_QUANTITY, max_quantity)`.
pub struct RandomLimitStrategy {
    rng: StdRng,
    max_price: u32,
    max_quantity: u32,
}

impl RandomLimitStrategy {
    /// Bounds must already be validated (`WorkerConfig::validate`).
    pub fn new(config: &WorkerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic draws for tests and replays.
    pub fn seeded(config: &WorkerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &WorkerConfig, rng: StdRng) -> Self {
        Self {
            rng,
            max_price: config.max_order_price.max(MIN_ORDER_PRICE + 1),
            max_quantity: config.max_order_quantity.max(MIN_ORDER_QUANTITY + 1),
        }
    }
}

impl OrderStrategy for RandomLimitStrategy {
    fn next_order(&mut self, market: &MarketInfo, _attempt: u32) -> OrderRequest {
        OrderRequest {
            market_id: market.market_id.clone(),
            price: self.rng.gen_range(MIN_ORDER_PRICE..self.max_price),
            quantity: self.rng.gen_range(MIN_ORDER_QUANTITY..self.max_quantity),
            action: OrderAction::Buy,
            order_type: OrderType::Limit,
        }
    }

    fn name(&self) -> &str {
        "random-limit"
    }
}
