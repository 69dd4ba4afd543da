//! IdGenerator port - task id generation.
//!
//! Ids must be unique for the lifetime of the store. Generation is a trait so
//! tests can make it deterministic (or deliberately collide).
//!
//! # Implementations
//! - **UlidGenerator**: ULID from the clock's millisecond timestamp plus 80 random bits

use crate::domain::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// ULID based generator.
///
/// Ids generated from the same [`crate::ports::FixedClock`] share their
/// timestamp part and differ only in the random part.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        let id3 = id_gen.generate_task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
