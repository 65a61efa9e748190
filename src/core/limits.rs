/// Per-run resource ceilings: characters written, wall-clock time, and
/// frame-stack depth.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Which ceiling a run hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resource {
    Characters,
    StackDepth,
    Timeout,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Characters => write!(f, "character limit"),
            Resource::StackDepth => write!(f, "stack depth"),
            Resource::Timeout => write!(f, "timeout (ms)"),
        }
    }
}

/// A ceiling was reached. The interpreter attaches a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitExceeded {
    pub resource: Resource,
    pub limit: u64,
}

/// Character budget shared by every output of a run.
#[derive(Debug, Clone, Default)]
pub struct CharLimit {
    max: Option<usize>,
    used: usize,
}

impl CharLimit {
    pub fn new(max: Option<usize>) -> Self {
        CharLimit { max, used: 0 }
    }

    pub fn unlimited() -> Self {
        CharLimit::default()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Reserve `count` characters. Nothing is reserved on failure.
    pub fn accumulate(&mut self, count: usize) -> Result<(), LimitExceeded> {
        let next = self.used.saturating_add(count);
        match self.max {
            Some(max) if next > max => Err(LimitExceeded {
                resource: Resource::Characters,
                limit: max as u64,
            }),
            _ => {
                self.used = next;
                Ok(())
            }
        }
    }
}

/// Wall-clock budget measured from construction.
#[derive(Debug, Clone)]
pub struct Timeout {
    started: Instant,
    budget: Option<Duration>,
}

impl Timeout {
    pub fn new(budget: Option<Duration>) -> Self {
        Timeout {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> Result<(), LimitExceeded> {
        match self.budget {
            Some(budget) if self.started.elapsed() > budget => Err(LimitExceeded {
                resource: Resource::Timeout,
                limit: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            }),
            _ => Ok(()),
        }
    }
}

/// Frame-stack ceiling.
#[derive(Debug, Clone, Copy)]
pub struct DepthLimit {
    pub max: usize,
}

impl DepthLimit {
    pub fn check(&self, depth: usize) -> Result<(), LimitExceeded> {
        if depth > self.max {
            Err(LimitExceeded {
                resource: Resource::StackDepth,
                limit: self.max as u64,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_limit_rejects_without_committing() {
        let mut limit = CharLimit::new(Some(5));
        assert!(limit.accumulate(3).is_ok());
        let err = limit.accumulate(3).unwrap_err();
        assert_eq!(err.resource, Resource::Characters);
        assert_eq!(err.limit, 5);
        assert_eq!(limit.used(), 3);
        assert!(limit.accumulate(2).is_ok());
        assert_eq!(limit.used(), 5);
    }

    #[test]
    fn unlimited_never_fails() {
        let mut limit = CharLimit::unlimited();
        assert!(limit.accumulate(usize::MAX).is_ok());
    }

    #[test]
    fn zero_timeout_expires() {
        let timeout = Timeout::new(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(timeout.check().unwrap_err().resource, Resource::Timeout);
        assert!(Timeout::new(None).check().is_ok());
    }

    #[test]
    fn depth_limit() {
        let limit = DepthLimit { max: 2 };
        assert!(limit.check(2).is_ok());
        assert_eq!(limit.check(3).unwrap_err().limit, 2);
    }
}
