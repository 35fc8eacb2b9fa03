//! Collaborator traits used by the placement saga, with in-memory and HTTP
//! implementations.

pub mod cart;
pub mod http;
pub mod inventory;
pub mod payment;

pub use cart::{CartClient, InMemoryCartService};
pub use http::{HttpCartClient, HttpInventoryClient};
pub use inventory::{InMemoryInventoryService, InventoryClient, ReservationItem};
pub use payment::{
    HmacPaymentGateway, PaymentAdapter, PaymentGatewayConfig, PaymentNotification,
    SUCCESS_STATUSES,
};
