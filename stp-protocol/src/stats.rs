//! Transfer Statistics
//!
//! Counters accumulated over one transfer, rendered as the summary block
//! appended to the event log and printed to stdout at teardown.

const BORDER: &str =
    "=======================================================";

fn row(label: &str, value: u64) -> String {
    format!("{:<45} {:>7}\n", label, value)
}

/// Counters kept by the sending side
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    /// Size of the transferred file in bytes
    pub file_size: u64,
    /// Every protocol-level send attempt, including drops and retransmissions
    pub transmitted: u64,
    /// Segments that went through the emulation layer
    pub ple_handled: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub reordered: u64,
    pub duplicated: u64,
    pub delayed: u64,
    pub timeout_retransmissions: u64,
    pub fast_retransmissions: u64,
    pub duplicate_acks_received: u64,
}

impl SenderStats {
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(BORDER);
        out.push('\n');
        out.push_str(&row("Size of the file (in Bytes)", self.file_size));
        out.push_str(&row(
            "Segments transmitted (including drop & RXT)",
            self.transmitted,
        ));
        out.push_str(&row("Number of Segments handled by PLE", self.ple_handled));
        out.push_str(&row("Number of Segments dropped", self.dropped));
        out.push_str(&row("Number of Segments Corrupted", self.corrupted));
        out.push_str(&row("Number of Segments Re-ordered", self.reordered));
        out.push_str(&row("Number of Segments Duplicated", self.duplicated));
        out.push_str(&row("Number of Segments Delayed", self.delayed));
        out.push_str(&row(
            "Number of Retransmissions due to timeout",
            self.timeout_retransmissions,
        ));
        out.push_str(&row(
            "Number of Fast Retransmissions",
            self.fast_retransmissions,
        ));
        out.push_str(&row(
            "Number of Duplicate ACKs received",
            self.duplicate_acks_received,
        ));
        out.push_str(BORDER);
        out.push('\n');
        out
    }
}

/// Counters kept by the receiving side
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Payload bytes received across all valid data segments
    pub bytes_received: u64,
    /// Every segment that passed checksum verification
    pub segments_received: u64,
    /// Valid segments carrying payload
    pub data_segments_received: u64,
    /// Datagrams rejected as corrupt or structurally unusable
    pub bit_error_segments: u64,
    pub duplicate_data_segments: u64,
    pub duplicate_acks_sent: u64,
}

impl ReceiverStats {
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(BORDER);
        out.push('\n');
        out.push_str(&row("Amount of data received (bytes)", self.bytes_received));
        out.push_str(&row("Total Segments Received", self.segments_received));
        out.push_str(&row(
            "Data segments received",
            self.data_segments_received,
        ));
        out.push_str(&row(
            "Data segments with Bit Errors",
            self.bit_error_segments,
        ));
        out.push_str(&row(
            "Duplicate data segments received",
            self.duplicate_data_segments,
        ));
        out.push_str(&row("Duplicate ACKs sent", self.duplicate_acks_sent));
        out.push_str(BORDER);
        out.push('\n');
        out
    }
}
