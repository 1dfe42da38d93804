use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::pb::sf::substreams::v1::Clock;

/// Decides whether a block is "live", i.e. close enough to the chain head.
///
/// When a checker is configured on the sinker, every block handed to the
/// handler carries an `is_live` flag; without one the flag is absent.
pub trait LivenessChecker: Send + Sync {
    fn is_live(&self, clock: &Clock) -> bool;
}

/// Delta-based [`LivenessChecker`]: a block is live iff its timestamp is at
/// most `delta` behind the current wall clock.
#[derive(Clone, Debug)]
pub struct DeltaLivenessChecker {
    delta: Duration,
}

impl DeltaLivenessChecker {
    #[must_use]
    pub fn new(delta: Duration) -> Self {
        Self { delta }
    }
}

impl LivenessChecker for DeltaLivenessChecker {
    fn is_live(&self, clock: &Clock) -> bool {
        let Some(timestamp) = clock.timestamp.as_ref() else {
            return false;
        };
        let Ok(seconds) = u64::try_from(timestamp.seconds) else {
            return false;
        };

        let nanos = u32::try_from(timestamp.nanos.max(0)).unwrap_or(0);
        let block_time = UNIX_EPOCH + Duration::new(seconds, nanos);
        match SystemTime::now().duration_since(block_time) {
            Ok(age) => age <= self.delta,
            // Block timestamp ahead of our clock, certainly near head.
            Err(_) => true,
        }
    }
}
