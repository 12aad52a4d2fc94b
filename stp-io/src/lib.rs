//! STP I/O Layer
//!
//! UDP socket plumbing and the per-role event logs.

pub mod log;
pub mod socket;

pub use log::{EventLog, RECEIVER_LOG, SENDER_LOG};
pub use socket::{Inbound, SocketError, StpSocket, BUFFER_SIZE};
