use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::ConfigError;

/// Uniform random duration in `[min_secs, max_secs]`.
pub fn randomized_delay<R: Rng + ?Sized>(
    rng: &mut R,
    min_secs: f64,
    max_secs: f64,
) -> Result<Duration, ConfigError> {
    let valid = min_secs.is_finite() && max_secs.is_finite() && min_secs >= 0.0 && max_secs >= min_secs;
    if !valid {
        return Err(ConfigError::InvalidDelayBounds { min: min_secs, max: max_secs });
    }
    let secs = if max_secs > min_secs {
        rng.random_range(min_secs..=max_secs)
    } else {
        min_secs
    };
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::InvalidDelayBounds { min: min_secs, max: max_secs })
}

/// Randomized pause between lines of a message burst. Bounds given in
/// either order.
pub fn burst_pause<R: Rng + ?Sized>(rng: &mut R, min_ms: u64, max_ms: u64) -> tokio::time::Sleep {
    let (lo, hi) = (min_ms.min(max_ms), min_ms.max(max_ms));
    let ms = if hi > lo { rng.random_range(lo..=hi) } else { lo };
    tokio::time::sleep(Duration::from_millis(ms))
}

/// Sliding-window limiter: at most `max_events` within any `window`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_events: usize,
    window: chrono::Duration,
    events: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRateLimit {
            max_events,
            window_secs: window.as_secs(),
        };
        if max_events == 0 || window.is_zero() {
            return Err(invalid());
        }
        let window = chrono::Duration::from_std(window).map_err(|_| invalid())?;
        Ok(Self {
            max_events,
            window,
            events: VecDeque::with_capacity(max_events),
        })
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some(oldest) = self.events.front() {
            if now - *oldest >= self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events still allowed in the current window.
    pub fn remaining(&mut self, now: DateTime<Utc>) -> usize {
        self.evict(now);
        self.max_events.saturating_sub(self.events.len())
    }

    /// Record an event if the window has room.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        if self.remaining(now) == 0 {
            return false;
        }
        self.events.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn delay_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let d = randomized_delay(&mut rng, 2.0, 5.0).unwrap();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn equal_bounds_are_fixed() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(randomized_delay(&mut rng, 4.0, 4.0).unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn bad_bounds_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(randomized_delay(&mut rng, -1.0, 5.0).is_err());
        assert!(randomized_delay(&mut rng, 6.0, 5.0).is_err());
        assert!(randomized_delay(&mut rng, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn oversized_bounds_are_an_error() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(randomized_delay(&mut rng, 1.0, 1e20).is_err());
        assert!(randomized_delay(&mut rng, 1e20, 1e20).is_err());
    }

    #[test]
    fn rate_limiter_rejects_non_positive_params() {
        assert!(RateLimiter::new(0, Duration::from_secs(60)).is_err());
        assert!(RateLimiter::new(3, Duration::ZERO).is_err());
    }

    #[test]
    fn rate_limiter_slides() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60)).unwrap();
        let now = Utc::now();
        assert!(limiter.try_acquire(now));
        assert!(limiter.try_acquire(now + chrono::Duration::seconds(10)));
        assert!(!limiter.try_acquire(now + chrono::Duration::seconds(20)));
        assert_eq!(limiter.remaining(now + chrono::Duration::seconds(60)), 1);
        assert!(limiter.try_acquire(now + chrono::Duration::seconds(61)));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_pause_sleeps_within_bounds() {
        let mut rng = StdRng::seed_from_u64(8);
        let start = tokio::time::Instant::now();
        burst_pause(&mut rng, 500, 200).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(200) && waited <= Duration::from_millis(501));
    }
}
