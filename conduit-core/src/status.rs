//! Health verdicts reported by sinks and sources.

use std::fmt;

/// Point-in-time health of a sink or source.
///
/// Computed fresh on every query; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    /// True if the backing topic is fully usable.
    pub working: bool,
    /// Human-readable reasons the status is degraded.
    pub problems: Vec<String>,
}

impl Status {
    /// Creates a healthy status with no problems.
    #[must_use]
    pub const fn working() -> Self {
        Self {
            working: true,
            problems: Vec::new(),
        }
    }

    /// Creates a degraded status from a list of problems.
    #[must_use]
    pub fn degraded(problems: Vec<String>) -> Self {
        Self {
            working: false,
            problems,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.working {
            return write!(f, "working");
        }
        write!(f, "degraded: {}", self.problems.join("; "))
    }
}
