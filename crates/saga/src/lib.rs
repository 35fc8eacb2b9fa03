//! Order placement saga and payment confirmation.
//!
//! Placing an order runs these steps in order:
//! 1. Validate and normalize the request
//! 2. Price it from inventory snapshots
//! 3. Reserve stock
//! 4. Assign an order id
//! 5. Persist header and line items atomically
//! 6. Clear the ordered variants from the cart (best-effort)
//!
//! A failure in step 4 or 5 releases the reservation before the error is
//! returned. Payment notifications move an order from AwaitingPayment to
//! AwaitingShipment through a conditional update, so redelivery is harmless.

pub mod best_effort;
pub mod error;
pub mod orchestrator;
pub mod pricing;
pub mod services;
pub mod step;

pub use best_effort::BestEffort;
pub use error::{PaymentError, PlaceOrderError, ServiceError, StoreCallError};
pub use orchestrator::{
    OrchestratorConfig, OrderDetail, OrderOrchestrator, PaymentOutcome, PlacedOrder,
};
pub use services::{
    CartClient, HmacPaymentGateway, HttpCartClient, HttpInventoryClient, InMemoryCartService,
    InMemoryInventoryService, InventoryClient, PaymentAdapter, PaymentGatewayConfig,
    PaymentNotification, ReservationItem,
};
pub use step::PlacementStep;
