//! STP Sender
//!
//! Uploads one file over UDP with a sliding window, adaptive
//! retransmission timeout and fast retransmit. Every outbound data
//! segment passes through the loss emulation layer configured on the
//! command line.

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use stp_cli::{SenderArgs, SenderSession};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

fn main() -> anyhow::Result<()> {
    let args = SenderArgs::parse();
    tracing_subscriber::fmt::init();

    let config = args.validate()?;
    tracing::info!("STP sender starting");
    tracing::info!(
        receiver = %config.receiver,
        file = %config.filename,
        mws = config.max_window_size,
        mss = config.max_segment_size,
        gamma = config.gamma,
        "transfer parameters"
    );
    tracing::info!(
        p_drop = config.ple.p_drop,
        p_duplicate = config.ple.p_duplicate,
        p_corrupt = config.ple.p_corrupt,
        p_order = config.ple.p_order,
        max_order = config.ple.max_order,
        p_delay = config.ple.p_delay,
        max_delay_ms = config.ple.max_delay_ms,
        seed = config.ple.seed,
        "emulation parameters"
    );

    // an interrupt mid-transfer forces teardown instead of killing the
    // process with the receiver still waiting
    unsafe {
        libc::signal(
            libc::SIGINT,
            handle_signal as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            handle_signal as *const () as libc::sighandler_t,
        );
    }

    SenderSession::run(config, || INTERRUPTED.load(Ordering::Relaxed))?;
    Ok(())
}
