use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

/// A thread-safe tracker for the maximum value ever seen for some quantity.
///
/// Implemented as a compare-and-retry loop over a single atomic cell:
/// writers never block each other and the recorded value never decreases.
/// Contention is expected to be frequent and short, so no mutex is involved.
#[derive(Debug, Default)]
pub struct HighWaterMark(AtomicI64);

impl HighWaterMark {
    pub const fn new() -> Self {
        HighWaterMark(AtomicI64::new(0))
    }

    /// Returns true if and only if `candidate` is the highest value ever seen.
    ///
    /// When a concurrent writer races ahead, the whole read-compare-swap
    /// sequence retries against the fresh observed value until either this
    /// call's candidate is no longer the maximum or the swap succeeds.
    pub fn update(
        &self,
        candidate: i64,
    ) -> bool {
        let mut observed = self.0.load(Ordering::Acquire);
        loop {
            if candidate <= observed {
                return false;
            }
            match self.0.compare_exchange(observed, candidate, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Current maximum. Safe to read concurrently with writers.
    pub fn current(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}
