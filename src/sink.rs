use crate::analyzer::GridSnapshot;
use crate::events::NetworkPayload;

use std::time::{Duration, Instant};
use tracing::trace;

/// Receives grid snapshots to draw as overlays.
///
/// Snapshots are read-only copies; the engine never hands out a live
/// reference into its grid. Implementations must absorb their own failures —
/// nothing a sink does may fail the session.
pub trait RenderSink: Send {
    /// Overlay for the locally detected grid
    fn render_local(&mut self, snapshot: &GridSnapshot);

    /// Overlay for a remote peer's grid, drawn independently
    fn render_remote(&mut self, snapshot: &GridSnapshot);
}

/// Receives serializable payloads bound for the remote peer.
///
/// Delivery, retries and ordering are the transport's responsibility.
pub trait NetworkSink: Send {
    fn send(&mut self, payload: NetworkPayload);
}

/// Render sink that draws nothing; useful for headless operation and tests
#[derive(Debug, Default)]
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn render_local(&mut self, _snapshot: &GridSnapshot) {}
    fn render_remote(&mut self, _snapshot: &GridSnapshot) {}
}

/// Network sink that drops every payload
#[derive(Debug, Default)]
pub struct NullNetworkSink;

impl NetworkSink for NullNetworkSink {
    fn send(&mut self, _payload: NetworkPayload) {}
}

/// Minimum-interval limiter with its own last-fired timestamp.
///
/// Each output surface (local render, remote render, network emit) gets an
/// independent limiter, decoupled from the driver's tick-rate limit.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Returns true and records `now` if the interval has elapsed
    pub fn try_fire(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.interval => {
                trace!("Rate limiter suppressed an emission");
                false
            }
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    /// Forget the last emission so the next attempt fires immediately
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_fires() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        assert!(limiter.try_fire(Instant::now()));
    }

    #[test]
    fn test_suppresses_until_interval_elapses() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert!(limiter.try_fire(t0));
        assert!(!limiter.try_fire(t0 + Duration::from_millis(50)));
        assert!(!limiter.try_fire(t0 + Duration::from_millis(99)));
        assert!(limiter.try_fire(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_reset_allows_immediate_fire() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert!(limiter.try_fire(t0));
        limiter.reset();
        assert!(limiter.try_fire(t0 + Duration::from_millis(1)));
    }
}
