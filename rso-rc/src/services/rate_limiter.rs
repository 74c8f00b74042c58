//! Token-bucket rate limiter for the external ratings API
//!
//! The bucket holds `max_tokens` and resets to full capacity at each fixed
//! window boundary (no proportional trickle). `acquire` consumes a token
//! when one is available; otherwise it sleeps out the remainder of the
//! current window (never less than 100 ms, to avoid busy-looping near the
//! boundary) and tries again. No fairness guarantee across waiters beyond
//! the tokio scheduler's own ordering.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Minimum sleep before re-checking the bucket
const MIN_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    window_start: Instant,
}

/// Token-bucket gate, default 10 requests per 1000 ms window
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<BucketState>,
    max_tokens: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_tokens: u32, window: Duration) -> Self {
        Self {
            state: Mutex::new(BucketState { tokens: max_tokens, window_start: Instant::now() }),
            max_tokens,
            window,
        }
    }

    /// Consume one token, waiting for a window reset if the bucket is empty
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;

                // Reset fully at each window boundary
                let elapsed = state.window_start.elapsed();
                if elapsed >= self.window {
                    state.tokens = self.max_tokens;
                    state.window_start = Instant::now();
                }

                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }

                // Bucket exhausted: wait out the rest of the window
                self.window.saturating_sub(state.window_start.elapsed()).max(MIN_WAIT)
            };

            tracing::debug!("Rate limiting: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens left in the current window (diagnostics only)
    pub async fn available(&self) -> u32 {
        let state = self.state.lock().await;
        if state.window_start.elapsed() >= self.window {
            self.max_tokens
        } else {
            state.tokens
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_creation() {
        let limiter = RateLimiter::new(10, Duration::from_millis(1000));
        assert_eq!(limiter.max_tokens, 10);
        assert_eq!(limiter.window, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_tokens_within_window_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.available().await, 0);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_waits_for_window_reset() {
        let limiter = RateLimiter::new(2, Duration::from_millis(300));

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;

        // Third acquire must wait out the remainder of the 300ms window
        limiter.acquire().await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(250), "waited only {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_window_reset_restores_full_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));

        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(limiter.available().await, 2);

        // Both tokens usable immediately after the reset
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
