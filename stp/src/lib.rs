//! STP - Simple Transfer Protocol
//!
//! Reliable unidirectional file transfer over UDP, with a sliding window,
//! adaptive retransmission timeout and a built-in loss emulation layer.

pub use stp_io as io;
pub use stp_protocol as protocol;

// Re-export commonly used types
pub use protocol::{Flags, Segment, SegmentKind};
