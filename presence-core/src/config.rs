//! Timing and priority knobs for the presence detectors.

use core::time::Duration;

use crate::hooks::{HookPriority, PRIORITY_DEFAULT};

/// Interval between authoritative polls of every detector.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Delay between a rising edge and the deferred connect it schedules.
pub const DEFAULT_EDGE_SETTLE: Duration = Duration::ZERO;

/// Relative ordering of the periodic detector hooks.
///
/// Lower numbers run first within a tick. Servo detection must precede the AP
/// and EC polls so it can claim the shared EC TX line before the EC detector is
/// allowed to start transmitting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HookPriorities {
    pub servo: HookPriority,
    pub ap: HookPriority,
    pub ec: HookPriority,
    pub arbitration: HookPriority,
}

impl HookPriorities {
    /// Priorities used on production boards.
    pub const fn standard() -> Self {
        Self {
            servo: PRIORITY_DEFAULT - 1,
            ap: PRIORITY_DEFAULT,
            ec: PRIORITY_DEFAULT,
            arbitration: PRIORITY_DEFAULT + 1,
        }
    }
}

impl Default for HookPriorities {
    fn default() -> Self {
        Self::standard()
    }
}

/// Configuration shared by every detector in a suite.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectConfig {
    poll_period: Duration,
    edge_settle: Duration,
    priorities: HookPriorities,
}

impl DetectConfig {
    /// Creates a configuration with explicit timings.
    pub const fn new(poll_period: Duration, edge_settle: Duration) -> Self {
        Self {
            poll_period,
            edge_settle,
            priorities: HookPriorities::standard(),
        }
    }

    /// Overrides the hook priorities.
    #[must_use]
    pub const fn with_priorities(mut self, priorities: HookPriorities) -> Self {
        self.priorities = priorities;
        self
    }

    /// Returns the poll interval.
    pub const fn poll_period(&self) -> Duration {
        self.poll_period
    }

    /// Returns the deferred connect delay used by the edge fast path.
    pub const fn edge_settle(&self) -> Duration {
        self.edge_settle
    }

    /// Returns the configured hook priorities.
    pub const fn priorities(&self) -> HookPriorities {
        self.priorities
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_PERIOD, DEFAULT_EDGE_SETTLE)
    }
}
