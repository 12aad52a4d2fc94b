//! Per-Role Event Logs
//!
//! Each role appends one line per protocol event to its own plain-text
//! file, truncated at startup: `<event> <elapsedSeconds> <type> <seq>
//! <bytes> <ack>`. The counters summary block is appended at teardown.
//! Individual write failures are logged and otherwise ignored; a lost log
//! line never takes the transfer down with it.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;
use stp_protocol::frame::Segment;

/// Sender-side event log filename
pub const SENDER_LOG: &str = "Sender_log";

/// Receiver-side event log filename
pub const RECEIVER_LOG: &str = "Receiver_log";

/// Append-only event log with a shared transfer clock
pub struct EventLog {
    file: Mutex<File>,
    start: Instant,
}

impl EventLog {
    /// Create (truncating) the log file and start the transfer clock
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(EventLog {
            file: Mutex::new(file),
            start: Instant::now(),
        })
    }

    /// Seconds elapsed since the log was created
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Append one event line for a segment
    pub fn record(&self, event: &str, segment: &Segment) {
        let line = format!(
            "{} {:.2} {} {} {} {}\n",
            event,
            self.elapsed(),
            segment.kind().code(),
            segment.seq,
            segment.payload.len(),
            segment.ack
        );
        self.append(&line);
    }

    /// Append the counters summary block
    pub fn append_summary(&self, summary: &str) {
        self.append(summary);
    }

    fn append(&self, text: &str) {
        let mut file = self.file.lock();
        if let Err(err) = file.write_all(text.as_bytes()) {
            tracing::warn!("event log write failed: {}", err);
        }
    }
}
