//! Sliding-window request admission.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: usize,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window rate limiter over a timestamp queue.
///
/// Each admission evicts timestamps older than the window from the
/// front of the queue, then admits iff the queue is below capacity.
/// Process-wide scope; the queue sits behind the limiter's own mutex.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter with the given window policy.
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.max_requests;
        Self {
            config,
            requests: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// The window length, for retry hints in denial messages.
    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// The per-window request cap.
    pub fn max_requests(&self) -> usize {
        self.config.max_requests
    }

    /// Admits or denies one request.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().expect("rate limiter lock poisoned");

        while let Some(&front) = requests.front() {
            if now.duration_since(front) > self.config.window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= self.config.max_requests {
            return false;
        }
        requests.push_back(now);
        true
    }

    /// Requests currently inside the window.
    pub fn current_count(&self) -> usize {
        self.requests.lock().expect("rate limiter lock poisoned").len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn limiter(max_requests: usize, window: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { max_requests, window })
    }

    #[test]
    fn admits_up_to_capacity() {
        let limiter = limiter(3, Duration::from_secs(60));
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert_eq!(limiter.current_count(), 3);
    }

    #[test]
    fn window_eviction_frees_capacity() {
        let limiter = limiter(2, Duration::from_millis(30));
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());

        thread::sleep(Duration::from_millis(60));
        assert!(limiter.admit());
        assert_eq!(limiter.current_count(), 1);
    }

    #[test]
    fn denied_requests_do_not_consume_capacity() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert!(!limiter.admit());
        assert_eq!(limiter.current_count(), 1);
    }
}
