//! Saga error types.

use std::time::Duration;

use common::{CorrelationId, IdGeneratorError, OrderId, VariantId};
use domain::{Money, OrderError, OrderStatus};
use order_store::OrderStoreError;
use thiserror::Error;

/// Failure of a call to a remote collaborator (inventory, cart).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The call did not finish before its deadline.
    #[error("{service}.{operation} timed out after {timeout:?}")]
    Timeout {
        service: &'static str,
        operation: &'static str,
        timeout: Duration,
    },

    /// The service answered and refused the request.
    #[error("{service}.{operation} rejected: {message}")]
    Rejected {
        service: &'static str,
        operation: &'static str,
        message: String,
    },

    /// The request never got a usable answer.
    #[error("{service}.{operation} transport error: {source}")]
    Transport {
        service: &'static str,
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of a call to the order store.
#[derive(Debug, Error)]
pub enum StoreCallError {
    /// The store returned an error.
    #[error(transparent)]
    Store(#[from] OrderStoreError),

    /// The store call did not finish before its deadline.
    #[error("Order store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned by order placement.
///
/// Validation and availability errors describe what to change in the request.
/// The remaining variants are internal failures; callers see only
/// [`PlaceOrderError::public_message`] for them.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    /// The request itself is malformed (empty, zero quantity, overflowing amounts).
    #[error("Invalid order request: {0}")]
    Invalid(#[from] OrderError),

    /// At least one requested variant no longer exists.
    #[error("Products unavailable: requested {requested} variants, found {found}")]
    ProductUnavailable {
        requested: usize,
        found: usize,
        missing: Vec<VariantId>,
    },

    /// The pricing snapshot shows too little stock for a variant.
    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The snapshot query to the inventory service failed.
    #[error("Pricing lookup failed (ref {correlation_id}): {source}")]
    PricingUnavailable {
        correlation_id: CorrelationId,
        #[source]
        source: ServiceError,
    },

    /// The inventory service did not grant the reservation.
    #[error("Stock reservation failed (ref {correlation_id}): {source}")]
    StockReservationFailed {
        correlation_id: CorrelationId,
        #[source]
        source: ServiceError,
    },

    /// No order id could be issued after stock was reserved.
    #[error("Order id generation failed (ref {correlation_id}, reservation released: {compensated}): {source}")]
    IdGenerationFailed {
        correlation_id: CorrelationId,
        compensated: bool,
        #[source]
        source: IdGeneratorError,
    },

    /// The durable order write failed after stock was reserved.
    #[error("Order {order_id} could not be persisted (ref {correlation_id}, reservation released: {compensated}): {source}")]
    OrderPersistFailed {
        correlation_id: CorrelationId,
        order_id: OrderId,
        compensated: bool,
        #[source]
        source: StoreCallError,
    },
}

impl PlaceOrderError {
    /// Returns true if the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PlaceOrderError::Invalid(_)
                | PlaceOrderError::ProductUnavailable { .. }
                | PlaceOrderError::InsufficientStock { .. }
        )
    }

    /// Returns the correlation id for internal failures.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            PlaceOrderError::PricingUnavailable { correlation_id, .. }
            | PlaceOrderError::StockReservationFailed { correlation_id, .. }
            | PlaceOrderError::IdGenerationFailed { correlation_id, .. }
            | PlaceOrderError::OrderPersistFailed { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }

    /// Returns true if the reservation was left held and needs manual
    /// reconciliation against the order table.
    pub fn orphaned_reservation(&self) -> bool {
        matches!(
            self,
            PlaceOrderError::IdGenerationFailed {
                compensated: false,
                ..
            } | PlaceOrderError::OrderPersistFailed {
                compensated: false,
                ..
            }
        )
    }

    /// Message safe to show to the caller.
    ///
    /// Client errors are returned verbatim. Internal failures never expose
    /// inventory or storage details, only the correlation id.
    pub fn public_message(&self) -> String {
        match self.correlation_id() {
            Some(correlation_id) => {
                format!("Order could not be placed, please try again later (ref {correlation_id})")
            }
            None => self.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PlaceOrderError::Invalid(_) => "invalid_request",
            PlaceOrderError::ProductUnavailable { .. } => "product_unavailable",
            PlaceOrderError::InsufficientStock { .. } => "insufficient_stock",
            PlaceOrderError::PricingUnavailable { .. } => "pricing_unavailable",
            PlaceOrderError::StockReservationFailed { .. } => "stock_reservation_failed",
            PlaceOrderError::IdGenerationFailed { .. } => "id_generation_failed",
            PlaceOrderError::OrderPersistFailed { .. } => "order_persist_failed",
        }
    }
}

/// Errors returned by the payment flows.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The notification signature is missing or wrong.
    #[error("Invalid payment notification signature: {0}")]
    InvalidSignature(String),

    /// The notification is signed but lacks required fields.
    #[error("Malformed payment notification: {0}")]
    MalformedNotification(String),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order cannot be paid by this user in its current status.
    #[error("Order {order_id} cannot be paid: {reason} (status {status})")]
    InvalidOrderState {
        order_id: OrderId,
        status: OrderStatus,
        reason: &'static str,
    },

    /// The gateway reports a different amount than the order expects.
    #[error("Payment amount mismatch for order {order_id}: expected {expected}, received {received}")]
    PaymentAmountMismatch {
        order_id: OrderId,
        expected: Money,
        received: Money,
    },

    /// The payment adapter could not build a request.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// A payment adapter call did not finish before its deadline.
    #[error("Payment adapter {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Reading or updating the order failed.
    #[error("Order store error: {0}")]
    Store(#[from] StoreCallError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_details() {
        let err = PlaceOrderError::InsufficientStock {
            variant_id: VariantId::new(1001),
            requested: 200,
            available: 99,
        };
        assert!(err.is_client_error());
        assert!(err.correlation_id().is_none());
        assert!(err.public_message().contains("1001"));
        assert_eq!(err.kind(), "insufficient_stock");
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let correlation_id = CorrelationId::new();
        let err = PlaceOrderError::StockReservationFailed {
            correlation_id,
            source: ServiceError::Rejected {
                service: "inventory",
                operation: "reserve_stock",
                message: "warehouse 7 locked by batch job".to_string(),
            },
        };
        assert!(!err.is_client_error());
        let message = err.public_message();
        assert!(message.contains(&correlation_id.to_string()));
        assert!(!message.contains("warehouse"));
        assert!(err.to_string().contains("warehouse"));
    }

    #[test]
    fn test_orphaned_reservation_flag() {
        let err = PlaceOrderError::OrderPersistFailed {
            correlation_id: CorrelationId::new(),
            order_id: OrderId::new(1),
            compensated: false,
            source: StoreCallError::Timeout(Duration::from_secs(1)),
        };
        assert!(err.orphaned_reservation());

        let err = PlaceOrderError::OrderPersistFailed {
            correlation_id: CorrelationId::new(),
            order_id: OrderId::new(1),
            compensated: true,
            source: StoreCallError::Timeout(Duration::from_secs(1)),
        };
        assert!(!err.orphaned_reservation());
    }
}
