use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;

/// A failure worth retrying: the network, a timeout, or a status that may
/// clear up on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("rate limited (429)")]
    RateLimited,
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            TransportError::RateLimited
        } else if let Some(status) = e.status() {
            TransportError::Status(status)
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

impl TransportError {
    /// Classifies a non-success status.
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            TransportError::RateLimited
        } else {
            TransportError::Status(status)
        }
    }
}

/// Bounded retries with linearly increasing backoff: attempt `n` failing
/// waits `base_delay × n` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Sleeps after a failed `attempt` unless it was the last one.
    pub async fn backoff(&self, attempt: u32) {
        if attempt >= self.max_attempts {
            return;
        }
        let delay = self.delay_after(attempt);
        if !delay.is_zero() {
            log::debug!("Backing off for {:?} before attempt {}", delay, attempt + 1);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Politeness delay between players: a fixed pause plus up to `jitter` of
/// random extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub fixed: Duration,
    pub jitter: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            fixed: Duration::from_secs(2),
            jitter: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            fixed: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.fixed + Duration::from_millis(extra)
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            TransportError::from_status(StatusCode::TOO_MANY_REQUESTS),
            TransportError::RateLimited
        );
        assert_eq!(
            TransportError::from_status(StatusCode::BAD_GATEWAY),
            TransportError::Status(StatusCode::BAD_GATEWAY)
        );
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_pacing_bounds() {
        let pacing = Pacing {
            fixed: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        };
        for _ in 0..20 {
            let delay = pacing.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
        assert_eq!(Pacing::none().next_delay(), Duration::ZERO);
    }
}
