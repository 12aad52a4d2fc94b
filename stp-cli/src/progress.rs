//! Console Progress Display
//!
//! Single-line carriage-return progress, rewritten on every update. The
//! sender shows a bar over the acknowledged byte range plus the live
//! timeout and RTT estimates; the receiver just shows the spinner and the
//! latest sequence value.

use std::io::{self, Write};

const BAR_WIDTH: usize = 25;

/// Alternating-spinner progress line
#[derive(Debug, Default)]
pub struct Progress {
    flip: bool,
}

impl Progress {
    pub fn new() -> Self {
        Progress::default()
    }

    fn spinner(&mut self) -> char {
        self.flip = !self.flip;
        if self.flip {
            '\\'
        } else {
            '/'
        }
    }

    /// Sender-side line: bar, current ack, timeout and RTT estimates
    pub fn upload(&mut self, ack: u32, file_size: u64, timeout_ms: f64, estimated_rtt_ms: f64) {
        let ratio = if file_size > 0 {
            (ack as f64 / file_size as f64).min(1.0)
        } else {
            1.0
        };
        let bar = "#".repeat((ratio * BAR_WIDTH as f64) as usize);
        print!(
            "\rUpload Progress: {} [{:<25}] ack: [{}] timeout: [{:.2}] EstRTT: [{:.2}]",
            self.spinner(),
            bar,
            ack,
            timeout_ms,
            estimated_rtt_ms
        );
        let _ = io::stdout().flush();
    }

    /// Receiver-side line: latest data sequence value
    pub fn download(&mut self, seq: u32) {
        print!("\rDownload Progress: {} seq: [{}]", self.spinner(), seq);
        let _ = io::stdout().flush();
    }
}
