//! Process-local worker state: the single-flight flag and the failure count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::escalator::FailureEscalator;

/// State owned by the run scheduler and threaded through each tick.
#[derive(Debug)]
pub struct WorkerRunState {
    in_flight: Arc<AtomicBool>,
    escalator: FailureEscalator,
}

impl WorkerRunState {
    pub fn new(max_consecutive_errors: u32) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            escalator: FailureEscalator::new(max_consecutive_errors),
        }
    }

    /// Marks a tick as in flight, or returns `None` if one already is.
    ///
    /// The flag is cleared when the returned guard is dropped, whether the
    /// tick succeeded, failed, panicked or was aborted.
    pub fn try_begin(&self) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn escalator(&self) -> &FailureEscalator {
        &self.escalator
    }

    pub fn escalator_mut(&mut self) -> &mut FailureEscalator {
        &mut self.escalator
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.escalator.consecutive_failures()
    }
}

/// Holds the single-flight flag for the duration of one tick.
#[derive(Debug)]
pub struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
