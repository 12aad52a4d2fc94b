//! Retransmission Timeout Timer
//!
//! Single retransmission timer covering the oldest unacknowledged segment.
//! RTT estimation follows RFC 6298: exponentially weighted moving averages
//! of the RTT mean and deviation, with the timeout interval derived as
//! `estimated_rtt + gamma * dev_rtt`. Samples are only taken for segments
//! sent exactly once; restarting the timer without a sample request cancels
//! any measurement in flight, so retransmitted segments never skew the
//! estimate (Karn's algorithm).

use std::time::{Duration, Instant};

/// Weight of a new sample in the RTT mean
const ALPHA: f64 = 0.125;

/// Weight of a new sample in the RTT deviation
const BETA: f64 = 0.25;

/// Initial RTT estimate before any sample, in milliseconds
const INITIAL_ESTIMATED_RTT_MS: f64 = 500.0;

/// Initial RTT deviation before any sample, in milliseconds
const INITIAL_DEV_RTT_MS: f64 = 250.0;

/// Adaptive retransmission timer
#[derive(Debug, Clone)]
pub struct RtoTimer {
    gamma: u32,
    estimated_rtt: f64,
    dev_rtt: f64,
    timeout_interval: f64,
    started_at: Option<Instant>,
    sampling: bool,
}

impl RtoTimer {
    /// Create a timer with the standard initial estimates
    pub fn new(gamma: u32) -> Self {
        Self::with_estimates(gamma, INITIAL_ESTIMATED_RTT_MS, INITIAL_DEV_RTT_MS)
    }

    /// Create a timer with explicit initial estimates in milliseconds
    pub fn with_estimates(gamma: u32, estimated_rtt: f64, dev_rtt: f64) -> Self {
        RtoTimer {
            gamma,
            estimated_rtt,
            dev_rtt,
            timeout_interval: estimated_rtt + gamma as f64 * dev_rtt,
            started_at: None,
            sampling: false,
        }
    }

    /// Start (or restart) the timer.
    ///
    /// `sample` marks whether the segment now covered by the timer is
    /// eligible for RTT measurement. Restarting with `sample = false`
    /// discards any measurement in flight, which is exactly what a
    /// retransmission must do.
    pub fn start(&mut self, sample: bool) {
        self.started_at = Some(Instant::now());
        self.sampling = sample;
    }

    /// Stop the timer without taking a sample
    pub fn stop(&mut self) {
        self.started_at = None;
        self.sampling = false;
    }

    /// Whether the timer is currently running
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Whether the timer has run past its timeout interval
    pub fn expired(&self) -> bool {
        match self.started_at {
            Some(at) => at.elapsed().as_secs_f64() * 1000.0 >= self.timeout_interval,
            None => false,
        }
    }

    /// Take the RTT sample for the segment covered by the timer, if one
    /// was requested and not cancelled since. Returns the measured sample.
    pub fn complete_sample(&mut self) -> Option<Duration> {
        if !self.sampling {
            return None;
        }
        let at = self.started_at?;
        let sample = at.elapsed();
        self.apply_sample(sample.as_secs_f64() * 1000.0);
        self.sampling = false;
        Some(sample)
    }

    /// Fold a measured RTT (milliseconds) into the estimates.
    ///
    /// The deviation is updated first, against the estimate that was in
    /// effect when the sample was taken, then the estimate itself, then
    /// the timeout interval.
    pub fn apply_sample(&mut self, sample_ms: f64) {
        self.dev_rtt = (1.0 - BETA) * self.dev_rtt + BETA * (sample_ms - self.estimated_rtt).abs();
        self.estimated_rtt = (1.0 - ALPHA) * self.estimated_rtt + ALPHA * sample_ms;
        self.timeout_interval = self.estimated_rtt + self.gamma as f64 * self.dev_rtt;
    }

    /// Current timeout interval
    pub fn timeout_interval(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_interval / 1000.0)
    }

    /// Current smoothed RTT estimate in milliseconds
    pub fn estimated_rtt_ms(&self) -> f64 {
        self.estimated_rtt
    }

    /// Current RTT deviation estimate in milliseconds
    pub fn dev_rtt_ms(&self) -> f64 {
        self.dev_rtt
    }
}
