//! Shared identifiers for the order services.
//!
//! Numeric ids are 64-bit and assigned by the owning service. Order ids come
//! from [`SnowflakeGenerator`], which is constructed once per process and
//! injected wherever new orders are created.

pub mod id_generator;
pub mod types;

pub use id_generator::{
    DEFAULT_EPOCH_MS, IdGenerator, IdGeneratorError, MAX_WORKER_ID, SnowflakeGenerator,
};
pub use types::{CorrelationId, OrderId, ProductId, UserId, VariantId};
