use crate::config::PauseConfig;

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// State change reported by the pause controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTransition {
    /// Excessive motion observed, detection suspended
    Entered,
    /// Aggregate motion dropped well below the pause threshold
    ResumedEarly,
    /// The resume deadline elapsed while still paused
    ResumedScheduled,
}

/// Suspends detection globally when too many cells report high intensity.
///
/// Pause and resume use separate thresholds: entering requires
/// `pause_threshold` of cells at High, resuming early requires dropping below
/// half of it. A scheduled resume fires unconditionally once the resume
/// deadline elapses.
pub struct PauseController {
    pause_threshold: f64,
    resume_threshold: f64,
    resume_delay: Duration,
    paused: bool,
    resume_deadline: Option<Instant>,
}

impl PauseController {
    pub fn new(config: &PauseConfig) -> Self {
        Self {
            pause_threshold: config.pause_threshold,
            resume_threshold: config.resume_threshold(),
            resume_delay: config.resume_delay(),
            paused: false,
            resume_deadline: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Feed the fraction of high-intensity cells observed this tick
    pub fn update(&mut self, high_fraction: f64, now: Instant) -> Option<PauseTransition> {
        if !self.paused {
            if high_fraction >= self.pause_threshold {
                self.paused = true;
                self.resume_deadline = Some(now + self.resume_delay);
                info!(
                    "Motion detection paused: {:.1}% high intensity cells",
                    high_fraction * 100.0
                );
                return Some(PauseTransition::Entered);
            }
            return None;
        }

        if high_fraction < self.resume_threshold {
            self.resume();
            info!(
                "Motion detection resumed early: {:.1}% high intensity cells",
                high_fraction * 100.0
            );
            return Some(PauseTransition::ResumedEarly);
        }

        self.poll(now)
    }

    /// Check the resume deadline without new aggregate data.
    ///
    /// Called by the driver on paused invocations, where the analyzer is
    /// skipped and no fraction is available.
    pub fn poll(&mut self, now: Instant) -> Option<PauseTransition> {
        match self.resume_deadline {
            Some(deadline) if self.paused && deadline <= now => {
                self.resume();
                info!("Motion detection resumed after scheduled delay");
                Some(PauseTransition::ResumedScheduled)
            }
            _ => None,
        }
    }

    fn resume(&mut self) {
        self.paused = false;
        self.resume_deadline = None;
    }

    /// Clear the paused flag and any pending deadline. Idempotent.
    pub fn reset(&mut self) {
        if self.paused {
            debug!("Pause controller reset while paused");
        }
        self.resume();
    }
}
