//! Time-ordered 64-bit order id generation.
//!
//! Layout of an id, most significant bit first:
//!
//! ```text
//! 0 | 41 bits: ms since epoch | 10 bits: worker id | 12 bits: sequence
//! ```
//!
//! Ids from one generator are strictly increasing. Ids from generators with
//! distinct worker ids never collide.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::OrderId;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

/// Largest worker id that fits in the layout.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;
const MAX_ELAPSED_MS: u64 = (1 << TIMESTAMP_BITS) - 1;

/// 2024-01-01T00:00:00Z in milliseconds since the Unix epoch.
pub const DEFAULT_EPOCH_MS: u64 = 1_704_067_200_000;

/// Errors raised while issuing an id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdGeneratorError {
    /// Worker id does not fit in 10 bits.
    #[error("Worker id {0} exceeds maximum {MAX_WORKER_ID}")]
    InvalidWorkerId(u16),

    /// The wall clock reads earlier than the configured epoch.
    #[error("Clock reads {now_ms} ms, before epoch {epoch_ms} ms")]
    ClockBeforeEpoch { now_ms: u64, epoch_ms: u64 },

    /// The wall clock went backwards since the last issued id.
    #[error("Clock moved backwards: last id at {last_ms} ms, now {now_ms} ms")]
    ClockMovedBackwards { last_ms: u64, now_ms: u64 },

    /// The 41-bit timestamp range is used up for this epoch.
    #[error("Timestamp range exhausted for configured epoch")]
    Exhausted,

    /// A previous caller panicked while holding the generator lock.
    #[error("Id generator state is poisoned")]
    Poisoned,
}

/// Source of new order ids.
pub trait IdGenerator: Send + Sync {
    /// Issues a fresh id. Never returns the same id twice.
    fn next_id(&self) -> Result<OrderId, IdGeneratorError>;
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

#[derive(Debug, Default)]
struct SnowflakeState {
    last_ms: u64,
    sequence: u16,
}

/// Snowflake-style generator owned by whoever constructs it.
pub struct SnowflakeGenerator {
    worker_id: u16,
    epoch_ms: u64,
    clock: Clock,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeGenerator {
    /// Creates a generator reading the system clock.
    pub fn new(worker_id: u16, epoch_ms: u64) -> Result<Self, IdGeneratorError> {
        Self::with_clock(worker_id, epoch_ms, system_millis)
    }

    /// Creates a generator with an explicit millisecond clock.
    pub fn with_clock(
        worker_id: u16,
        epoch_ms: u64,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Result<Self, IdGeneratorError> {
        if worker_id > MAX_WORKER_ID {
            return Err(IdGeneratorError::InvalidWorkerId(worker_id));
        }
        Ok(Self {
            worker_id,
            epoch_ms,
            clock: Box::new(clock),
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    /// Returns the worker id embedded in every id from this generator.
    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Splits an id into (ms since epoch, worker id, sequence).
    pub fn decompose(id: OrderId) -> (u64, u16, u16) {
        let raw = id.get();
        let sequence = (raw & SEQUENCE_MASK as u64) as u16;
        let worker = ((raw >> SEQUENCE_BITS) & MAX_WORKER_ID as u64) as u16;
        let elapsed = raw >> (SEQUENCE_BITS + WORKER_BITS);
        (elapsed, worker, sequence)
    }

    fn compose(&self, elapsed_ms: u64, sequence: u16) -> OrderId {
        OrderId::new(
            (elapsed_ms << (SEQUENCE_BITS + WORKER_BITS))
                | ((self.worker_id as u64) << SEQUENCE_BITS)
                | sequence as u64,
        )
    }

    fn read_clock(&self) -> Result<u64, IdGeneratorError> {
        let now_ms = (self.clock)();
        if now_ms < self.epoch_ms {
            return Err(IdGeneratorError::ClockBeforeEpoch {
                now_ms,
                epoch_ms: self.epoch_ms,
            });
        }
        Ok(now_ms)
    }
}

impl IdGenerator for SnowflakeGenerator {
    fn next_id(&self) -> Result<OrderId, IdGeneratorError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| IdGeneratorError::Poisoned)?;

        let mut now_ms = self.read_clock()?;
        if now_ms < state.last_ms {
            return Err(IdGeneratorError::ClockMovedBackwards {
                last_ms: state.last_ms,
                now_ms,
            });
        }

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted within this millisecond.
                while now_ms <= state.last_ms {
                    std::thread::yield_now();
                    now_ms = self.read_clock()?;
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now_ms;

        let elapsed = now_ms - self.epoch_ms;
        if elapsed > MAX_ELAPSED_MS {
            return Err(IdGeneratorError::Exhausted);
        }
        Ok(self.compose(elapsed, state.sequence))
    }
}

impl std::fmt::Debug for SnowflakeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeGenerator")
            .field("worker_id", &self.worker_id)
            .field("epoch_ms", &self.epoch_ms)
            .finish_non_exhaustive()
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
