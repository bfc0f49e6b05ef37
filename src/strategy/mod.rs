//! Order generation.
//!
//! The control loop asks an `OrderStrategy` for every attempt it makes.
//! `RandomLimitStrategy` is the stock placeholder: uniformly random price
//! and quantity, always a BUY limit order.

pub mod random;

pub use random::RandomLimitStrategy;

use crate::types::{MarketInfo, OrderRequest};

/// Produces the order for one placement attempt.
pub trait OrderStrategy: Send {
    /// `attempt` is 1-based within the current market.
    fn next_order(&mut self, market: &MarketInfo, attempt: u32) -> OrderRequest;

    fn name(&self) -> &str;
}
