//! # Key Generators
//!
//! Distributed primary keys for generated-key columns.
//!
//! Snowflake layout (64 bits):
//!
//! ```text
//! | sign (1) | millis since epoch (41) | worker id (10) | sequence (12) |
//! ```

use crate::domain::{KeyGenerationError, KeyGenerator, TimeSource, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snowflake epoch: 2016-11-01T00:00:00Z.
pub const SNOWFLAKE_EPOCH_MILLIS: u64 = 1_477_929_600_000;

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest configurable worker id.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Default tolerated clock regression.
pub const DEFAULT_MAX_TOLERATE_MILLIS: u64 = 10;

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: u64,
    sequence: u64,
}

/// Time-ordered 64-bit keys.
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    time_source: Arc<dyn TimeSource>,
    worker_id: u64,
    max_tolerate_millis: u64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    /// Type name.
    pub const TYPE: &'static str = "SNOWFLAKE";

    /// Create with an explicit clock and worker id (masked to 10 bits).
    pub fn new(
        time_source: Arc<dyn TimeSource>,
        worker_id: u16,
        max_tolerate_millis: u64,
    ) -> Self {
        Self {
            time_source,
            worker_id: u64::from(worker_id & MAX_WORKER_ID),
            max_tolerate_millis,
            state: Mutex::new(SnowflakeState::default()),
        }
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn generate(&self) -> Result<Value, KeyGenerationError> {
        let mut state = self.state.lock();
        let mut now = self.time_source.now_millis();

        if now < state.last_millis {
            let behind = state.last_millis - now;
            if behind > self.max_tolerate_millis {
                return Err(KeyGenerationError::ClockBackwards(behind));
            }
            now = state.last_millis;
        }

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; borrow the next one.
                now = state.last_millis + 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        let elapsed = now.saturating_sub(SNOWFLAKE_EPOCH_MILLIS);
        let id = (elapsed << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;
        Ok(Value::Int(id as i64))
    }
}

/// Random 128-bit keys rendered as 32 hex characters.
#[derive(Debug, Default)]
pub struct UuidKeyGenerator;

impl UuidKeyGenerator {
    /// Type name.
    pub const TYPE: &'static str = "UUID";
}

impl KeyGenerator for UuidKeyGenerator {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn generate(&self) -> Result<Value, KeyGenerationError> {
        Ok(Value::Text(uuid::Uuid::new_v4().simple().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug)]
    struct FixedClock(AtomicU64);

    impl TimeSource for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn clock(at: u64) -> Arc<FixedClock> {
        Arc::new(FixedClock(AtomicU64::new(at)))
    }

    #[test]
    fn test_snowflake_layout() {
        let generator = SnowflakeKeyGenerator::new(clock(SNOWFLAKE_EPOCH_MILLIS + 1), 3, 10);
        let id = generator.generate().unwrap().as_i64().unwrap() as u64;
        assert_eq!(id >> 22, 1);
        assert_eq!((id >> 12) & 0x3FF, 3);
    }

    #[test]
    fn test_snowflake_monotonic_with_frozen_clock() {
        let generator = SnowflakeKeyGenerator::new(clock(SNOWFLAKE_EPOCH_MILLIS + 5), 1, 10);
        let mut last = 0i64;
        for _ in 0..10_000 {
            let id = generator.generate().unwrap().as_i64().unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_snowflake_clock_regression() {
        let source = clock(SNOWFLAKE_EPOCH_MILLIS + 1_000);
        let generator = SnowflakeKeyGenerator::new(source.clone(), 0, 10);
        generator.generate().unwrap();

        source.0.store(SNOWFLAKE_EPOCH_MILLIS + 995, Ordering::SeqCst);
        assert!(generator.generate().is_ok());

        source.0.store(SNOWFLAKE_EPOCH_MILLIS + 900, Ordering::SeqCst);
        assert_eq!(
            generator.generate(),
            Err(KeyGenerationError::ClockBackwards(100))
        );
    }

    #[test]
    fn test_uuid_keys_are_unique_hex() {
        let generator = UuidKeyGenerator;
        let a = generator.generate().unwrap().to_string();
        let b = generator.generate().unwrap().to_string();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
