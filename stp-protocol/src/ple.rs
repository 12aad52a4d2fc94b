//! Packet Loss Emulation
//!
//! Every outbound data segment passes through this module, which decides its
//! fate from a sequence of independent seeded trials in fixed priority
//! order: drop, duplicate, corrupt, reorder, delay, deliver. The first trial
//! that fires wins. Reordering uses a single hold slot: a captured segment
//! is released only after `max_order` later sends have passed through, and
//! a capture attempt while the slot is occupied falls back to normal
//! delivery. Handshake and teardown segments never come through here.

use crate::frame::Segment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Emulation probabilities and bounds
#[derive(Debug, Clone, Default)]
pub struct PleConfig {
    pub p_drop: f64,
    pub p_duplicate: f64,
    pub p_corrupt: f64,
    pub p_order: f64,
    /// Number of subsequent sends a reordered segment is held for
    pub max_order: u32,
    pub p_delay: f64,
    /// Upper bound of the uniform delay draw, in milliseconds
    pub max_delay_ms: f64,
    pub seed: u64,
}

/// Fate assigned to one segment
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Transmit normally
    Deliver(Segment),
    /// Do not transmit at all
    Drop(Segment),
    /// Transmit twice back-to-back
    Duplicate(Segment),
    /// Transmit through the corrupting pack
    Corrupt(Segment),
    /// Captured into the reorder slot; nothing goes out this send
    Held,
    /// Transmit from a deferred task after the given delay
    Delay(Segment, Duration),
}

/// The emulation layer: seeded RNG plus the reorder hold slot
#[derive(Debug)]
pub struct Ple {
    config: PleConfig,
    rng: StdRng,
    held: Option<Segment>,
    countdown: u32,
}

impl Ple {
    pub fn new(config: PleConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Ple {
            config,
            rng,
            held: None,
            countdown: 0,
        }
    }

    pub fn config(&self) -> &PleConfig {
        &self.config
    }

    /// Advance the reorder slot by one send. Called at the entry of every
    /// emulated send, before the current segment's trials: returns the held
    /// segment once its countdown has run out, otherwise ticks the
    /// countdown down.
    pub fn reorder_step(&mut self) -> Option<Segment> {
        if self.countdown == 0 {
            self.held.take()
        } else {
            self.countdown -= 1;
            None
        }
    }

    /// Run the trials for one segment and assign its fate
    pub fn judge(&mut self, segment: Segment) -> Disposition {
        if self.trial(self.config.p_drop) {
            return Disposition::Drop(segment);
        }
        if self.trial(self.config.p_duplicate) {
            return Disposition::Duplicate(segment);
        }
        if self.trial(self.config.p_corrupt) {
            return Disposition::Corrupt(segment);
        }
        if self.trial(self.config.p_order) {
            if self.held.is_none() {
                self.held = Some(segment);
                self.countdown = self.config.max_order;
                return Disposition::Held;
            }
            // slot occupied: pass the segment through untouched
            return Disposition::Deliver(segment);
        }
        if self.trial(self.config.p_delay) {
            let delay_ms = self.rng.gen_range(0.0..=self.config.max_delay_ms);
            return Disposition::Delay(segment, Duration::from_secs_f64(delay_ms / 1000.0));
        }
        Disposition::Deliver(segment)
    }

    fn trial(&mut self, probability: f64) -> bool {
        self.rng.gen::<f64>() < probability
    }
}
