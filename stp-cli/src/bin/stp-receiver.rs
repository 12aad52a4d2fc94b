//! STP Receiver
//!
//! Listens for one upload, acks data segments cumulatively while
//! buffering out-of-order arrivals, and writes the assembled file once
//! the connection tears down.

use clap::Parser;
use stp_cli::{ReceiverArgs, ReceiverSession};

fn main() -> anyhow::Result<()> {
    let args = ReceiverArgs::parse();
    tracing_subscriber::fmt::init();

    let config = args.validate()?;
    tracing::info!("STP receiver starting");
    tracing::info!(listen = %config.listen, file = %config.filename, "receiver parameters");

    let stats = ReceiverSession::bind(config)?.serve()?;
    tracing::info!(bytes = stats.bytes_received, "transfer complete");
    Ok(())
}
