//! STX venue client.
//!
//! GraphQL for request/response calls, Phoenix websocket channels for
//! pushes. All services share one `StxSession`, which owns the tokens.

pub mod channels;
pub mod graphql;
pub mod markets;
pub mod orders;
pub mod session;

pub use channels::{StxChannel, Topic};
pub use graphql::GraphQlClient;
pub use markets::StxMarketService;
pub use orders::StxOrderService;
pub use session::StxSession;

use crate::config::Endpoints;
use crate::error::SdkError;
use crate::types::{ActiveOrders, ActiveTrades, MarketChannelData, Portfolio};

/// All venue services wired to one session.
pub struct StxClient {
    pub session: StxSession,
    pub markets: StxMarketService,
    pub orders: StxOrderService,
    channels_uri: String,
}

impl StxClient {
    pub fn new(endpoints: &Endpoints) -> Result<Self, SdkError> {
        let gql = GraphQlClient::new(endpoints.graphql_uri.clone())?;
        let session = StxSession::new(gql.clone());
        Ok(Self {
            markets: StxMarketService::new(gql.clone(), session.clone()),
            orders: StxOrderService::new(gql, session.clone()),
            session,
            channels_uri: endpoints.channels_uri.clone(),
        })
    }

    pub fn market_channel(&self) -> StxChannel<MarketChannelData> {
        StxChannel::market(&self.channels_uri, self.session.clone())
    }

    pub fn orders_channel(&self) -> StxChannel<ActiveOrders> {
        StxChannel::orders(&self.channels_uri, self.session.clone())
    }

    pub fn trades_channel(&self) -> StxChannel<Option<ActiveTrades>> {
        StxChannel::trades(&self.channels_uri, self.session.clone())
    }

    pub fn portfolio_channel(&self) -> StxChannel<Option<Portfolio>> {
        StxChannel::portfolio(&self.channels_uri, self.session.clone())
    }
}
