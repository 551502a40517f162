use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

/// Leaky-bucket pacing towards a target byte rate.
///
/// Bytes are counted per window; once the count would exceed the target
/// rate, the pacer sleeps out the rest of the window and starts a new one.
#[derive(Debug)]
pub struct RatePacer {
    window: Duration,
    byte_count: u64,
    window_start: Instant,
}

impl RatePacer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            byte_count: 0,
            window_start: Instant::now(),
        }
    }

    /// Account for `bytes` just delivered, sleeping if ahead of
    /// `target_bytes_per_sec`. Fails only when `token` is cancelled mid-sleep.
    pub async fn pace(
        &mut self,
        target_bytes_per_sec: f64,
        bytes: usize,
        token: &CancellationToken,
    ) -> Result<(), IngestError> {
        self.byte_count += bytes as u64;
        let windows_per_sec = 1.0 / self.window.as_secs_f64().max(f64::EPSILON);
        if (self.byte_count as f64) * windows_per_sec <= target_bytes_per_sec {
            return Ok(());
        }

        let elapsed = self.window_start.elapsed();
        if elapsed < self.window {
            tokio::select! {
                _ = token.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(self.window - elapsed) => {}
            }
        }
        self.window_start = Instant::now();
        self.byte_count = 0;
        Ok(())
    }
}

/// Bytes per second over a sliding window.
#[derive(Debug)]
pub struct RateCounter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn add(&mut self, bytes: usize) {
        let now = Instant::now();
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) <= self.window {
                break;
            }
            self.samples.pop_front();
        }
        self.samples.push_back((now, bytes as u64));
    }

    pub fn rate(&self) -> f64 {
        let now = Instant::now();
        let bytes: u64 = self
            .samples
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= self.window)
            .map(|(_, n)| n)
            .sum();
        bytes as f64 / self.window.as_secs_f64()
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pacer_approximates_target_rate() {
        let token = CancellationToken::new();
        let mut pacer = RatePacer::new(Duration::from_millis(80));
        let start = Instant::now();
        // 100 packets per second
        for _ in 0..900 {
            pacer.pace(18_800.0, 188, &token).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(9), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_does_not_sleep_under_target() {
        let token = CancellationToken::new();
        let mut pacer = RatePacer::new(Duration::from_millis(80));
        let start = Instant::now();
        for _ in 0..5 {
            pacer.pace(1_000_000.0, 188, &token).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_cancellable_mid_sleep() {
        let token = CancellationToken::new();
        token.cancel();
        let mut pacer = RatePacer::new(Duration::from_millis(80));
        assert!(matches!(
            pacer.pace(1.0, 188, &token).await,
            Err(IngestError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_counter_window() {
        let mut counter = RateCounter::default();
        counter.add(500);
        counter.add(500);
        assert_eq!(counter.rate(), 1000.0);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(counter.rate(), 0.0);
        counter.add(200);
        assert_eq!(counter.rate(), 200.0);
    }
}
