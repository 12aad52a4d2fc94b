//! End-to-end transfer tests
//!
//! Runs a real sender and receiver over loopback UDP, with and without
//! loss emulation, and checks the delivered file byte for byte.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use stp_cli::{ReceiverConfig, ReceiverSession, SenderConfig, SenderSession};
use stp_protocol::{PleConfig, ReceiverStats, SenderStats};

// both sides write their event logs into the working directory, so
// transfers must not overlap
static TRANSFER_GUARD: Mutex<()> = Mutex::new(());

fn scratch_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("stp-e2e-{}-{}", std::process::id(), name));
    path
}

fn run_transfer(
    name: &str,
    payload: &[u8],
    window_size: usize,
    segment_size: usize,
    ple: PleConfig,
) -> (SenderStats, ReceiverStats, Vec<u8>) {
    let _guard = TRANSFER_GUARD.lock().unwrap_or_else(|e| e.into_inner());

    let input = scratch_path(&format!("{}-in", name));
    let output = scratch_path(&format!("{}-out", name));
    fs::write(&input, payload).unwrap();

    let receiver = ReceiverSession::bind(ReceiverConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        filename: output.to_str().unwrap().to_string(),
    })
    .unwrap();
    let addr: SocketAddr = receiver.local_addr().unwrap();
    let serving = thread::spawn(move || receiver.serve().unwrap());

    let sender_stats = SenderSession::run(
        SenderConfig {
            receiver: addr,
            filename: input.to_str().unwrap().to_string(),
            max_window_size: window_size,
            max_segment_size: segment_size,
            gamma: 4,
            ple,
        },
        || false,
    )
    .unwrap();

    let receiver_stats = serving.join().unwrap();
    let written = fs::read(&output).unwrap();
    let _ = fs::remove_file(&input);
    let _ = fs::remove_file(&output);
    (sender_stats, receiver_stats, written)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn test_clean_transfer_delivers_file_exactly() {
    let payload = patterned(250);
    let (sender, receiver, written) =
        run_transfer("clean", &payload, 300, 100, PleConfig::default());

    assert_eq!(written, payload);
    assert_eq!(sender.file_size, 250);

    // with emulation off, no fate counter can move
    assert_eq!(sender.dropped, 0);
    assert_eq!(sender.corrupted, 0);
    assert_eq!(sender.reordered, 0);
    assert_eq!(sender.duplicated, 0);
    assert_eq!(sender.delayed, 0);
    assert_eq!(receiver.bit_error_segments, 0);

    // three data sends plus the four handshake and teardown sends, plus
    // whatever a stalled scheduler pass had to retransmit
    assert_eq!(
        sender.transmitted,
        7 + sender.timeout_retransmissions + sender.fast_retransmissions
    );
    assert_eq!(sender.ple_handled, sender.transmitted - 4);
    assert!(receiver.data_segments_received >= 3);
    assert!(receiver.bytes_received >= 250);
}

#[test]
fn test_single_segment_transfer() {
    let payload = patterned(40);
    let (sender, receiver, written) =
        run_transfer("single", &payload, 100, 100, PleConfig::default());

    assert_eq!(written, payload);
    assert_eq!(sender.file_size, 40);
    assert!(receiver.data_segments_received >= 1);
    assert_eq!(receiver.duplicate_acks_sent, 0);
}

#[test]
fn test_forced_reordering_reassembles() {
    // pOrder 1 with maxOrder 1 swaps every pair: each segment is held,
    // the next one passes through, and the held one flushes on the send
    // after that. The receiver sees 2, 1, 4, 3, ... and has to buffer
    // ahead of the cumulative ack to rebuild the file.
    let payload = patterned(400);
    let ple = PleConfig {
        p_order: 1.0,
        max_order: 1,
        ..Default::default()
    };
    let (sender, receiver, written) = run_transfer("reorder", &payload, 400, 100, ple);

    assert_eq!(written, payload);

    // the only emulation outcome in play is the reorder slot
    assert_eq!(sender.dropped, 0);
    assert_eq!(sender.corrupted, 0);
    assert_eq!(sender.duplicated, 0);
    assert_eq!(sender.delayed, 0);

    // one pane is always parked in the slot when the sends run out; only
    // the timeout retransmission flushes it, and the retransmitted copy
    // is captured in its place
    assert!(sender.reordered >= 3);
    assert!(sender.timeout_retransmissions >= 1);
    assert_eq!(sender.fast_retransmissions, 0);
    assert_eq!(sender.ple_handled, sender.transmitted - 4);

    // the two ahead-of-sequence arrivals each drew a duplicate ack
    assert!(receiver.duplicate_acks_sent >= 2);
    assert!(receiver.bytes_received >= 400);
}

#[test]
fn test_lossy_transfer_still_delivers_file_exactly() {
    let payload = patterned(2000);
    let ple = PleConfig {
        p_drop: 0.1,
        p_duplicate: 0.1,
        p_corrupt: 0.1,
        p_order: 0.1,
        max_order: 2,
        p_delay: 0.1,
        max_delay_ms: 30.0,
        seed: 300,
    };
    let (sender, receiver, written) = run_transfer("lossy", &payload, 1000, 250, ple);

    // whatever the emulation did, the receiver must reconstruct the file
    assert_eq!(written, payload);
    assert_eq!(sender.file_size, 2000);

    // eight data segments minimum, and every fate was drawn from real sends
    assert!(sender.transmitted >= 12);
    let fates = sender.dropped
        + sender.duplicated
        + sender.corrupted
        + sender.reordered
        + sender.delayed;
    assert!(fates <= sender.ple_handled);
    assert!(receiver.bytes_received >= 2000);
}
