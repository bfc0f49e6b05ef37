//! Order entry mutations.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::graphql::GraphQlClient;
use super::session::StxSession;
use crate::error::SdkError;
use crate::types::{ConfirmedOrder, Order, OrderRequest};
use crate::venue::OrderGateway;

const CANCEL_ALL_ORDERS_MUTATION: &str = r#"
mutation cancelAllOrders {
  cancelAllOrders {
    status
  }
}"#;

const CONFIRM_ORDER_MUTATION: &str = r#"
mutation confirmOrder($userOrder: UserOrder!) {
  confirmOrder(userOrder: $userOrder) {
    status
    order {
      id
      marketId
      status
      price
      quantity
      filledQuantity
      action
      orderType
      insertedAt
    }
    errors {
      code
      message
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct CancelAllPayload {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfirmPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    order: Option<Order>,
    #[serde(default)]
    errors: Option<Vec<PayloadError>>,
}

#[derive(Debug, Deserialize)]
struct PayloadError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl ConfirmPayload {
    fn into_confirmed(self) -> Result<ConfirmedOrder, SdkError> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .iter()
                .map(|e| match &e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SdkError::Api(message));
        }
        let order = self.order.ok_or_else(|| {
            SdkError::Api(format!(
                "order not confirmed (status: {})",
                self.status.as_deref().unwrap_or("unknown")
            ))
        })?;
        Ok(ConfirmedOrder {
            order,
            status: self.status,
        })
    }
}

pub struct StxOrderService {
    gql: GraphQlClient,
    session: StxSession,
}

impl StxOrderService {
    pub fn new(gql: GraphQlClient, session: StxSession) -> Self {
        Self { gql, session }
    }
}

#[async_trait]
impl OrderGateway for StxOrderService {
    async fn cancel_all_orders(&self) -> Result<(), SdkError> {
        let token = self.session.require_token()?;
        let payload: CancelAllPayload = self
            .gql
            .execute(
                CANCEL_ALL_ORDERS_MUTATION,
                serde_json::json!({}),
                "cancelAllOrders",
                Some(&token),
            )
            .await?;
        debug!(status = ?payload.status, "Cancel all orders");
        Ok(())
    }

    async fn confirm_order(&self, request: &OrderRequest) -> Result<ConfirmedOrder, SdkError> {
        let token = self.session.require_token()?;
        let payload: ConfirmPayload = self
            .gql
            .execute(
                CONFIRM_ORDER_MUTATION,
                serde_json::json!({ "userOrder": request }),
                "confirmOrder",
                Some(&token),
            )
            .await?;
        payload.into_confirmed()
    }
}
