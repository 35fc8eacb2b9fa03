//! Order status state machine.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// AwaitingPayment ──► AwaitingShipment ──► Shipped ──► Completed
///        │                   │
///        └───────────────────┴──► Cancelled
/// ```
///
/// The order service itself only performs `AwaitingPayment ──► AwaitingShipment`,
/// driven by a verified payment notification. The remaining edges belong to
/// the shipping and after-sales services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order is durably recorded and stock is reserved; waiting for payment.
    #[default]
    AwaitingPayment,

    /// Payment confirmed, waiting for the warehouse.
    AwaitingShipment,

    /// Handed over to the carrier.
    Shipped,

    /// Delivered and closed (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns the persisted status code.
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::Cancelled => 0,
            OrderStatus::AwaitingPayment => 10,
            OrderStatus::AwaitingShipment => 20,
            OrderStatus::Shipped => 40,
            OrderStatus::Completed => 50,
        }
    }

    /// Maps a persisted status code back to a status.
    pub fn from_code(code: i16) -> Result<Self, OrderError> {
        match code {
            0 => Ok(OrderStatus::Cancelled),
            10 => Ok(OrderStatus::AwaitingPayment),
            20 => Ok(OrderStatus::AwaitingShipment),
            40 => Ok(OrderStatus::Shipped),
            50 => Ok(OrderStatus::Completed),
            other => Err(OrderError::UnknownStatus(other)),
        }
    }

    /// Returns true if a payment can be started or confirmed in this status.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::AwaitingPayment)
    }

    /// Returns true if `self ──► next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::AwaitingPayment, OrderStatus::AwaitingShipment)
                | (OrderStatus::AwaitingShipment, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Completed)
                | (OrderStatus::AwaitingPayment, OrderStatus::Cancelled)
                | (OrderStatus::AwaitingShipment, OrderStatus::Cancelled)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "AwaitingPayment",
            OrderStatus::AwaitingShipment => "AwaitingShipment",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::AwaitingPayment,
        OrderStatus::AwaitingShipment,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_awaiting_payment() {
        assert_eq!(OrderStatus::default(), OrderStatus::AwaitingPayment);
    }

    #[test]
    fn test_status_codes_are_stable() {
        for status in ALL {
            assert_eq!(OrderStatus::from_code(status.code()).unwrap(), status);
        }
        assert_eq!(OrderStatus::AwaitingPayment.code(), 10);
        assert_eq!(OrderStatus::AwaitingShipment.code(), 20);
        assert_eq!(
            OrderStatus::from_code(7),
            Err(OrderError::UnknownStatus(7))
        );
    }

    #[test]
    fn test_only_awaiting_payment_can_pay() {
        assert!(OrderStatus::AwaitingPayment.can_pay());
        assert!(!OrderStatus::AwaitingShipment.can_pay());
        assert!(!OrderStatus::Shipped.can_pay());
        assert!(!OrderStatus::Completed.can_pay());
        assert!(!OrderStatus::Cancelled.can_pay());
    }

    #[test]
    fn test_transitions() {
        assert!(OrderStatus::AwaitingPayment.can_transition_to(OrderStatus::AwaitingShipment));
        assert!(!OrderStatus::AwaitingShipment.can_transition_to(OrderStatus::AwaitingPayment));
        assert!(!OrderStatus::AwaitingPayment.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::AwaitingPayment));
    }

    #[test]
    fn test_display() {
        assert_eq!(OrderStatus::AwaitingPayment.to_string(), "AwaitingPayment");
        assert_eq!(OrderStatus::AwaitingShipment.to_string(), "AwaitingShipment");
        assert_eq!(OrderStatus::Cancelled.to_string(), "Cancelled");
    }
}
