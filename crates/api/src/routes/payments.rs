//! Payment URL and gateway notification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Serialize;

use super::{parse_order_id, user_id};
use crate::AppState;
use crate::error::ApiError;

/// Body the gateway expects once a notification has been accepted.
pub const NOTIFY_ACK: &str = "success";

#[derive(Serialize)]
pub struct PaymentUrlResponse {
    pub order_id: String,
    pub payment_url: String,
}

/// GET /orders/{id}/payment-url: build the gateway URL for an unpaid order.
#[tracing::instrument(skip(state, headers))]
pub async fn payment_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PaymentUrlResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let order_id = parse_order_id(&id)?;

    let payment_url = state.orchestrator.get_payment_url(user_id, order_id).await?;
    Ok(Json(PaymentUrlResponse {
        order_id: order_id.to_string(),
        payment_url,
    }))
}

/// POST /payments/notify: apply a signed, form-encoded gateway notification.
///
/// Duplicates and non-success trade statuses are acknowledged too, so the
/// gateway stops redelivering them.
#[tracing::instrument(skip(state, body))]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<&'static str, ApiError> {
    let outcome = state.orchestrator.confirm_payment(&body).await?;
    tracing::debug!(?outcome, "payment notification handled");
    Ok(NOTIFY_ACK)
}
