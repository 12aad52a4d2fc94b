//! STP Protocol Core Implementation
//!
//! This crate implements the core STP (Simple Transfer Protocol) mechanics,
//! including the segment wire format, the sender sliding window, adaptive
//! retransmission timing, packet loss emulation, and transfer statistics.

pub mod frame;
pub mod ple;
pub mod stats;
pub mod timer;
pub mod window;

pub use frame::{Flags, FrameError, Segment, SegmentKind, HEADER_LEN};
pub use ple::{Disposition, Ple, PleConfig};
pub use stats::{ReceiverStats, SenderStats};
pub use timer::RtoTimer;
pub use window::{AckOutcome, QueuedSegment, SegmentQueue, Window, WindowError};
