//! Sending Side of a Transfer
//!
//! Orchestrates one upload. The file is read and chunked up front, the
//! opening handshake runs on a blocking socket, then two threads share the
//! transfer: a scheduler that fills the window and retransmits on timeout,
//! and the main loop that consumes acks. Data segments pass through the
//! loss emulation layer on the way out; handshake and teardown segments
//! go to the wire untouched.

use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stp_io::{EventLog, Inbound, SocketError, StpSocket, SENDER_LOG};
use stp_protocol::{
    AckOutcome, Disposition, Flags, Ple, RtoTimer, Segment, SegmentQueue, SenderStats, Window,
    WindowError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::args::SenderConfig;
use crate::progress::Progress;

/// Pacing for the scheduler pass and the non-blocking ack poll
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on each blocking wait during teardown, so a vanished
/// receiver cannot hold the sender forever
const TEARDOWN_WAIT: Duration = Duration::from_secs(5);

/// Sender failures
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Window(#[from] WindowError),

    /// The peer sent something other than the awaited teardown segment
    #[error("teardown expected {awaited}")]
    TeardownViolation { awaited: &'static str },

    #[error("timed out waiting for the peer during teardown")]
    TeardownTimeout,
}

/// Mutable transfer state. One lock guards it, shared between the ack
/// loop, the scheduler thread and any deferred delayed sends; every
/// outbound socket write happens under it.
struct TransferState {
    window: Window,
    timer: RtoTimer,
    ple: Ple,
    stats: SenderStats,
    progress: Progress,
    /// Next sequence value, which after the handshake is always the
    /// latest cumulative ack
    seq: u32,
    /// Ack field stamped on every outbound segment, fixed after the
    /// handshake at the peer's sequence plus one
    ack_field: u32,
}

struct Shared {
    state: Mutex<TransferState>,
    socket: StpSocket,
    log: EventLog,
    peer: SocketAddr,
    /// Cleared at teardown entry; deferred delayed sends re-check it
    /// before firing
    transferring: AtomicBool,
    scheduler_stop: AtomicBool,
}

/// One upload to one receiver
#[derive(Clone)]
pub struct SenderSession {
    shared: Arc<Shared>,
}

impl SenderSession {
    /// Run a complete transfer: handshake, windowed upload, teardown.
    /// `interrupted` is polled from the ack loop; once it reports true the
    /// upload stops and teardown is forced.
    pub fn run(
        config: SenderConfig,
        interrupted: impl Fn() -> bool,
    ) -> Result<SenderStats, SenderError> {
        let data = fs::read(&config.filename)?;
        let log = EventLog::create(SENDER_LOG)?;
        let socket = StpSocket::open()?;

        let queue = SegmentQueue::build(&data, 1, config.max_segment_size);
        let window = Window::new(queue, config.max_window_size, config.max_segment_size)?;
        let mut stats = SenderStats::default();
        stats.file_size = window.queue().total_bytes();

        let session = SenderSession {
            shared: Arc::new(Shared {
                state: Mutex::new(TransferState {
                    window,
                    timer: RtoTimer::new(config.gamma),
                    ple: Ple::new(config.ple.clone()),
                    stats,
                    progress: Progress::new(),
                    seq: 0,
                    ack_field: 0,
                }),
                socket,
                log,
                peer: config.receiver,
                transferring: AtomicBool::new(true),
                scheduler_stop: AtomicBool::new(false),
            }),
        };

        session.handshake()?;

        let scheduler = {
            let session = session.clone();
            thread::spawn(move || session.scheduler_loop())
        };

        let outcome = session.ack_loop(&interrupted);

        session.shared.scheduler_stop.store(true, Ordering::Relaxed);
        let _ = scheduler.join();
        println!();

        outcome?;
        session.teardown()?;

        let stats = session.shared.state.lock().stats.clone();
        Ok(stats)
    }

    /// Three-segment opening handshake on the blocking socket. Anything
    /// that is not the awaited SYN-ACK is ignored.
    fn handshake(&self) -> Result<(), SenderError> {
        info!(peer = %self.shared.peer, "opening connection");

        let syn = Segment::control(Flags::SYN, 0, 0);
        self.send_clean(&syn, "snd")?;

        let peer_seq = loop {
            match self.shared.socket.recv()? {
                Inbound::Segment(segment, _) if segment.is_syn_ack() && segment.ack == 1 => {
                    self.shared.log.record("rcv", &segment);
                    break segment.seq;
                }
                other => debug!("ignoring while waiting for SYN-ACK: {:?}", other),
            }
        };

        let ack_field = peer_seq.wrapping_add(1);
        let ack = Segment::control(Flags::ACK, 1, ack_field);
        self.send_clean(&ack, "snd")?;

        {
            let mut state = self.shared.state.lock();
            state.seq = 1;
            state.ack_field = ack_field;
        }

        self.shared.socket.set_nonblocking(true)?;
        info!("connection established");
        Ok(())
    }

    /// Main-thread loop: poll for acks until the whole queue is
    /// acknowledged or the caller interrupts.
    fn ack_loop(&self, interrupted: &impl Fn() -> bool) -> Result<(), SenderError> {
        if self.shared.state.lock().window.is_complete() {
            return Ok(());
        }

        loop {
            if interrupted() {
                warn!("interrupted, forcing teardown");
                return Ok(());
            }

            match self.shared.socket.poll_recv()? {
                Some(Inbound::Segment(segment, _)) if segment.is_ack() => {
                    if self.handle_ack(&segment) {
                        return Ok(());
                    }
                }
                // inbound corruption only matters on the receiver side
                Some(_) => {}
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Apply one ack to the window. Returns true once the transfer is
    /// complete.
    fn handle_ack(&self, segment: &Segment) -> bool {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        match state.window.on_ack(segment.ack) {
            AckOutcome::Advanced {
                cumulative_ack,
                finished,
                outstanding,
            } => {
                let timeout_ms = state.timer.timeout_interval().as_secs_f64() * 1000.0;
                let estimated = state.timer.estimated_rtt_ms();
                state
                    .progress
                    .upload(segment.ack, state.stats.file_size, timeout_ms, estimated);

                self.shared.log.record("rcv", segment);
                state.timer.complete_sample();
                state.seq = cumulative_ack;

                if finished {
                    return true;
                }
                if outstanding {
                    state.timer.start(false);
                }
                false
            }
            AckOutcome::Duplicate { retransmit } => {
                let timeout_ms = state.timer.timeout_interval().as_secs_f64() * 1000.0;
                let estimated = state.timer.estimated_rtt_ms();
                state
                    .progress
                    .upload(segment.ack, state.stats.file_size, timeout_ms, estimated);

                state.stats.duplicate_acks_received += 1;
                self.shared.log.record("rcv/DA", segment);

                if let Some(pane) = retransmit {
                    let queued = state
                        .window
                        .queue()
                        .get(pane)
                        .map(|q| (q.seq, q.payload.clone()));
                    if let Some((seq, payload)) = queued {
                        let resend = Segment::data(seq, state.ack_field, payload);
                        self.dispatch(state, resend, "snd/RXT");
                        state.stats.fast_retransmissions += 1;
                        state.timer.start(false);
                    }
                }
                false
            }
            AckOutcome::Unknown => {
                self.shared.log.record("rcv", segment);
                false
            }
        }
    }

    /// Scheduler thread: retransmit the window base on timeout and keep
    /// the window full of in-flight segments.
    fn scheduler_loop(&self) {
        while !self.shared.scheduler_stop.load(Ordering::Relaxed) {
            {
                let mut guard = self.shared.state.lock();
                let state = &mut *guard;

                if state.timer.expired() && !state.window.is_complete() {
                    let base = state
                        .window
                        .base_segment()
                        .map(|q| (q.seq, q.payload.clone()));
                    if let Some((seq, payload)) = base {
                        let resend = Segment::data(seq, state.ack_field, payload);
                        self.dispatch(state, resend, "snd/RXT");
                        state.timer.start(false);
                        state.stats.timeout_retransmissions += 1;
                    }
                }

                for pane in state.window.unsent_panes() {
                    let queued = state
                        .window
                        .queue()
                        .get(pane)
                        .map(|q| (q.seq, q.payload.clone()));
                    if let Some((seq, payload)) = queued {
                        let fresh = Segment::data(seq, state.ack_field, payload);
                        self.dispatch(state, fresh, "snd");
                        if !state.timer.is_started() || state.timer.expired() {
                            state.timer.start(true);
                        }
                        state.window.mark_sent(pane);
                    }
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Send one data segment through the emulation layer, recording the
    /// outcome against `event` ("snd" or "snd/RXT").
    fn dispatch(&self, state: &mut TransferState, segment: Segment, event: &str) {
        state.stats.transmitted += 1;
        state.stats.ple_handled += 1;

        // a held segment due for release goes out first, skipping the trials
        if let Some(released) = state.ple.reorder_step() {
            self.send_raw(&released.encode());
            self.shared.log.record("snd/rord", &released);
        }

        match state.ple.judge(segment) {
            Disposition::Deliver(segment) => {
                self.send_raw(&segment.encode());
                self.shared.log.record(event, &segment);
            }
            Disposition::Drop(segment) => {
                state.stats.dropped += 1;
                self.shared.log.record(&format!("{}/drop", event), &segment);
            }
            Disposition::Duplicate(segment) => {
                let wire = segment.encode();
                self.send_raw(&wire);
                self.send_raw(&wire);
                state.stats.duplicated += 1;
                self.shared.log.record(&format!("{}/dup", event), &segment);
            }
            Disposition::Corrupt(segment) => {
                self.send_raw(&segment.encode_corrupted());
                state.stats.corrupted += 1;
                self.shared.log.record(&format!("{}/corr", event), &segment);
            }
            Disposition::Held => {
                // capture is silent; the release is logged when it happens
                state.stats.reordered += 1;
            }
            Disposition::Delay(segment, delay) => {
                state.stats.delayed += 1;
                self.spawn_delayed(segment, delay);
            }
        }
    }

    /// Fire a delayed segment from its own thread, unless the transfer
    /// has already moved on to teardown.
    fn spawn_delayed(&self, segment: Segment, delay: Duration) {
        let shared = self.shared.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            if !shared.transferring.load(Ordering::Relaxed) {
                return;
            }
            let _state = shared.state.lock();
            match shared.socket.send_to(&segment.encode(), shared.peer) {
                Ok(_) => shared.log.record("snd/dely", &segment),
                Err(err) => warn!("delayed send failed: {}", err),
            }
        });
    }

    /// Bypass the emulation layer. Handshake and teardown segments still
    /// count as transmissions and still hit the event log.
    fn send_clean(&self, segment: &Segment, event: &str) -> Result<(), SenderError> {
        let mut state = self.shared.state.lock();
        state.stats.transmitted += 1;
        self.shared.socket.send_to(&segment.encode(), self.shared.peer)?;
        self.shared.log.record(event, segment);
        Ok(())
    }

    /// Transfer-phase send: failures are survivable because the timer
    /// will retransmit.
    fn send_raw(&self, wire: &[u8]) {
        if let Err(err) = self.shared.socket.send_to(wire, self.shared.peer) {
            warn!("send failed: {}", err);
        }
    }

    /// Four-segment close: FIN, await its ack, await the peer's FIN, ack
    /// it. Stale acks from the transfer are skipped; anything else out of
    /// place is a protocol violation.
    fn teardown(&self) -> Result<(), SenderError> {
        info!("closing connection");
        self.shared.transferring.store(false, Ordering::Relaxed);
        self.shared.socket.set_nonblocking(false)?;
        self.shared.socket.set_read_timeout(Some(TEARDOWN_WAIT))?;

        let (mut seq, ack_field) = {
            let state = self.shared.state.lock();
            (state.seq, state.ack_field)
        };

        let fin = Segment::control(Flags::FIN, seq, ack_field);
        self.send_clean(&fin, "snd")?;
        seq = seq.wrapping_add(1);

        // FIN_WAIT_1: the ack of our FIN
        loop {
            match self.recv_teardown()? {
                Inbound::Segment(segment, _) if segment.is_ack() => {
                    if segment.ack == seq {
                        self.shared.log.record("rcv", &segment);
                        break;
                    }
                    if segment.ack < seq {
                        continue;
                    }
                    return Err(SenderError::TeardownViolation { awaited: "ACK" });
                }
                _ => return Err(SenderError::TeardownViolation { awaited: "ACK" }),
            }
        }

        // FIN_WAIT_2: the peer's own FIN
        let peer_fin = loop {
            match self.recv_teardown()? {
                Inbound::Segment(segment, _) => {
                    if segment.is_ack() && segment.ack < seq {
                        continue;
                    }
                    if segment.is_fin() {
                        self.shared.log.record("rcv", &segment);
                        break segment;
                    }
                    return Err(SenderError::TeardownViolation { awaited: "FIN" });
                }
                _ => return Err(SenderError::TeardownViolation { awaited: "FIN" }),
            }
        };

        let last_ack = Segment::control(Flags::ACK, seq, peer_fin.seq.wrapping_add(1));
        self.send_clean(&last_ack, "snd")?;

        let summary = self.shared.state.lock().stats.summary();
        self.shared.log.append_summary(&summary);
        print!("{}", summary);
        info!("connection closed");
        Ok(())
    }

    fn recv_teardown(&self) -> Result<Inbound, SenderError> {
        match self.shared.socket.recv() {
            Ok(inbound) => Ok(inbound),
            Err(SocketError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                Err(SenderError::TeardownTimeout)
            }
            Err(err) => Err(err.into()),
        }
    }
}
