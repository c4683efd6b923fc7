//! Sliding-window rate limiter for provider requests.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

/// Caps requests at `max_requests` per sliding `window`.
///
/// `acquire()` suspends the calling task until a slot frees; it never
/// blocks the thread. Timestamps of recent sends are kept in a deque under
/// one mutex, and the wait is computed from the oldest stamp still inside
/// the window.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a send slot and claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = stamps.front() {
                    if now.duration_since(oldest) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }
                if stamps.len() < self.max_requests {
                    stamps.push_back(now);
                    return;
                }
                // Full: wait until the oldest stamp leaves the window.
                let oldest = *stamps.front().expect("non-empty when full");
                self.window - now.duration_since(oldest)
            };
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn under_the_cap_is_immediate() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn over_the_cap_waits_for_the_oldest_stamp() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        // Third acquire must wait until the first stamp exits the window.
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_as_the_window_slides() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(1));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(1)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
