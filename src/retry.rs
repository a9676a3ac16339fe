//! Bounded polling with a fixed interval
//!
//! Built on `tokio::time`, so tests drive it with a paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How often and how long to poll a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Overall deadline across all attempts
    pub timeout: Option<Duration>,
}

/// Result of [`RetryPolicy::poll_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the given (1-based) attempt
    Ready { attempts: u32 },
    /// The attempt budget or deadline ran out
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts } | Self::Exhausted { attempts } => *attempts,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Call `check` until it returns true
    ///
    /// Sleeps `interval` between attempts, never after the last one.
    pub async fn poll_until<F, Fut>(&self, mut check: F) -> PollOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            if check(attempts).await {
                return PollOutcome::Ready { attempts };
            }

            if attempts == self.max_attempts {
                break;
            }
            if let Some(deadline) = deadline
                && Instant::now() + self.interval > deadline
            {
                tracing::debug!(attempts, "Poll deadline reached");
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        PollOutcome::Exhausted { attempts }
    }
}
