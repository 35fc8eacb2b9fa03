//! Order storage.
//!
//! An order header and its line items are written in one transaction, and
//! status changes are compare-and-swap updates keyed on the expected prior
//! status. Two implementations share the [`OrderStore`] trait: PostgreSQL for
//! production and an in-memory store for tests and local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{OrderStoreError, Result};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::{OrderStore, StatusUpdate};
