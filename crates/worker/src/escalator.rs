//! Consecutive-failure counter that decides when the worker gives up.
//!
//! Only pipeline-level failures (store I/O, merge, retire) are recorded here.
//! Rejected events never reach the escalator.

/// Where the worker stands after the latest tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// No failures since the last successful tick.
    Healthy,
    /// Some consecutive failures, below the threshold.
    Degraded { failures: u32 },
    /// Threshold reached; the process must exit.
    Fatal { failures: u32 },
}

impl EscalationState {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Counts consecutive failed ticks against a fixed threshold.
#[derive(Debug, Clone)]
pub struct FailureEscalator {
    consecutive_failures: u32,
    max_failures: u32,
}

impl FailureEscalator {
    /// A threshold of zero is treated as one.
    pub fn new(max_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn record_success(&mut self) -> EscalationState {
        self.consecutive_failures = 0;
        self.state()
    }

    pub fn record_failure(&mut self) -> EscalationState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state()
    }

    pub fn state(&self) -> EscalationState {
        match self.consecutive_failures {
            0 => EscalationState::Healthy,
            n if n >= self.max_failures => EscalationState::Fatal { failures: n },
            n => EscalationState::Degraded { failures: n },
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }
}
