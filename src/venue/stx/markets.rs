//! Market catalog queries.

use async_trait::async_trait;
use tracing::{debug, info};

use super::graphql::GraphQlClient;
use super::session::StxSession;
use crate::error::SdkError;
use crate::types::{MarketInfo, MarketInfoFilter, SportAndCompetitions};
use crate::venue::MarketCatalog;

const SPORT_AND_COMPETITIONS_QUERY: &str = r#"
query sportAndCompetitions {
  sportAndCompetitions {
    sport
    competitions
  }
}"#;

const MARKET_INFOS_QUERY: &str = r#"
query marketInfos($filter: MarketInfoFilter) {
  marketInfos(filter: $filter) {
    marketId
    title
    status
    sport
    competition
    openTime
    closeTime
  }
}"#;

pub struct StxMarketService {
    gql: GraphQlClient,
    session: StxSession,
}

impl StxMarketService {
    pub fn new(gql: GraphQlClient, session: StxSession) -> Self {
        Self { gql, session }
    }
}

#[async_trait]
impl MarketCatalog for StxMarketService {
    async fn sport_and_competitions(&self) -> Result<Vec<SportAndCompetitions>, SdkError> {
        let token = self.session.require_token()?;
        let sports: Vec<SportAndCompetitions> = self
            .gql
            .execute(
                SPORT_AND_COMPETITIONS_QUERY,
                serde_json::json!({}),
                "sportAndCompetitions",
                Some(&token),
            )
            .await?;
        debug!(count = sports.len(), "Fetched sports and competitions");
        Ok(sports)
    }

    async fn market_infos(&self, filter: &MarketInfoFilter) -> Result<Vec<MarketInfo>, SdkError> {
        let token = self.session.require_token()?;
        let variables = serde_json::json!({ "filter": filter });
        let markets: Vec<MarketInfo> = self
            .gql
            .execute(MARKET_INFOS_QUERY, variables, "marketInfos", Some(&token))
            .await?;
        info!(
            count = markets.len(),
            from = %filter.from_time,
            to = %filter.to_time,
            "Fetched market infos"
        );
        Ok(markets)
    }
}
