//! STP CLI Library
//!
//! Shared functionality for the STP command-line sender and receiver.

pub mod args;
pub mod progress;
pub mod receiver;
pub mod sender;

pub use args::{ArgsError, ReceiverArgs, ReceiverConfig, SenderArgs, SenderConfig};
pub use receiver::{ReceiverError, ReceiverSession};
pub use sender::{SenderError, SenderSession};
