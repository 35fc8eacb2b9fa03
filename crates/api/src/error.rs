//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::IdGeneratorError;
use order_saga::{PaymentError, PlaceOrderError, ServiceError, StoreCallError};
use order_store::OrderStoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The caller did not identify itself.
    Unauthorized(String),
    /// Order placement failed.
    PlaceOrder(PlaceOrderError),
    /// Payment URL or notification handling failed.
    Payment(PaymentError),
    /// Order lookup failed.
    Store(StoreCallError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::PlaceOrder(err) => place_order_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "order lookup failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Order service temporarily unavailable".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn place_order_error_to_response(err: PlaceOrderError) -> (StatusCode, String) {
    let status = match &err {
        PlaceOrderError::Invalid(_) => StatusCode::BAD_REQUEST,
        PlaceOrderError::ProductUnavailable { .. } | PlaceOrderError::InsufficientStock { .. } => {
            StatusCode::CONFLICT
        }
        PlaceOrderError::PricingUnavailable { .. }
        | PlaceOrderError::StockReservationFailed { .. }
        | PlaceOrderError::IdGenerationFailed { .. }
        | PlaceOrderError::OrderPersistFailed { .. } => {
            tracing::error!(error = %err, "order placement failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, err.public_message())
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    match &err {
        PaymentError::InvalidSignature(_) | PaymentError::MalformedNotification(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        PaymentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PaymentError::InvalidOrderState { .. } | PaymentError::PaymentAmountMismatch { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        PaymentError::Gateway(_) | PaymentError::Timeout { .. } | PaymentError::Store(_) => {
            tracing::error!(error = %err, "payment handling failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Payment service temporarily unavailable".to_string(),
            )
        }
    }
}

impl From<PlaceOrderError> for ApiError {
    fn from(err: PlaceOrderError) -> Self {
        ApiError::PlaceOrder(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<StoreCallError> for ApiError {
    fn from(err: StoreCallError) -> Self {
        ApiError::Store(err)
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid order id generator settings: {0}")]
    IdGenerator(#[from] IdGeneratorError),

    #[error("Remote service client setup failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Order store setup failed: {0}")]
    Store(#[from] OrderStoreError),

    #[error("Metrics recorder setup failed: {0}")]
    Metrics(String),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
