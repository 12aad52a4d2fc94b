//! Receiving Side of a Transfer
//!
//! Binds the listening socket and serves one upload: answer the opening
//! SYN, ack data segments cumulatively while buffering whatever arrives
//! ahead of sequence, then complete the teardown and write the assembled
//! file. Connection state is keyed by peer address, so the map survives
//! the arrival of segments from an address it has never seen.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::net::SocketAddr;
use stp_io::{EventLog, Inbound, SocketError, StpSocket, RECEIVER_LOG};
use stp_protocol::{Flags, ReceiverStats, Segment};
use thiserror::Error;
use tracing::{info, warn};

use crate::args::ReceiverConfig;
use crate::progress::Progress;

/// Receiver failures
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("could not write {filename}: {source}")]
    WriteOutput {
        filename: String,
        source: std::io::Error,
    },
}

/// Per-peer transfer state
struct Connection {
    /// Our own sequence value, stamped on every reply
    seq: u32,
    /// Next in-order data sequence we want from the peer
    expected: u32,
    /// Out-of-order and in-order payloads, keyed by sequence
    buffer: BTreeMap<u32, Bytes>,
}

/// One listening endpoint serving one upload
pub struct ReceiverSession {
    socket: StpSocket,
    log: EventLog,
    connections: Mutex<HashMap<SocketAddr, Connection>>,
    stats: ReceiverStats,
    progress: Progress,
    filename: String,
}

impl ReceiverSession {
    /// Bind the listening socket. Serving is split out so a caller can
    /// learn the bound address before any SYN is in flight.
    pub fn bind(config: ReceiverConfig) -> Result<ReceiverSession, ReceiverError> {
        let socket = StpSocket::bind(config.listen)?;
        let log = EventLog::create(RECEIVER_LOG)?;
        Ok(ReceiverSession {
            socket,
            log,
            connections: Mutex::new(HashMap::new()),
            stats: ReceiverStats::default(),
            progress: Progress::new(),
            filename: config.filename,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ReceiverError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until one transfer completes, then write the received file.
    pub fn serve(mut self) -> Result<ReceiverStats, ReceiverError> {
        info!(listen = %self.local_addr()?, "awaiting connection");
        self.serve_loop()?;
        Ok(self.stats)
    }

    fn serve_loop(&mut self) -> Result<(), ReceiverError> {
        loop {
            let (segment, from) = match self.socket.recv()? {
                Inbound::Segment(segment, from) => (segment, from),
                Inbound::Corrupt(_) | Inbound::Malformed(_) => {
                    self.stats.bit_error_segments += 1;
                    continue;
                }
            };
            self.register_arrival(&segment);

            let known = self.connections.lock().contains_key(&from);
            if !known {
                self.open_connection(&segment, from);
            } else if !segment.payload.is_empty() {
                self.handle_data(&segment, from);
            } else if segment.is_fin() {
                self.teardown(&segment, from)?;
                return Ok(());
            }
            // the bare ack that closes the handshake needs no reply
        }
    }

    /// Counters and the central "rcv" log line for every valid segment
    fn register_arrival(&mut self, segment: &Segment) {
        self.stats.segments_received += 1;
        if !segment.payload.is_empty() {
            self.stats.data_segments_received += 1;
            self.stats.bytes_received += segment.payload.len() as u64;
        }
        self.log.record("rcv", segment);
    }

    /// A segment from an address with no connection must be a SYN.
    fn open_connection(&mut self, segment: &Segment, from: SocketAddr) {
        if !segment.is_syn() {
            warn!(%from, "expected SYN from unknown peer");
            return;
        }
        info!(%from, "handshake initiated");

        let expected = segment.seq.wrapping_add(1);
        let syn_ack = Segment::control(Flags::SYN_ACK, 0, expected);
        self.send_segment(&syn_ack, "snd", from);

        self.connections.lock().insert(
            from,
            Connection {
                seq: 1,
                expected,
                buffer: BTreeMap::new(),
            },
        );
    }

    /// Ack one data segment cumulatively. In-order data extends the
    /// expected sequence through every contiguous buffered successor;
    /// anything else is answered with a duplicate ack for the sequence
    /// still owed.
    fn handle_data(&mut self, segment: &Segment, from: SocketAddr) {
        let mut connections = self.connections.lock();
        let conn = match connections.get_mut(&from) {
            Some(conn) => conn,
            None => return,
        };

        self.progress.download(segment.seq);

        if segment.ack != conn.seq {
            warn!(
                got = segment.ack,
                expected = conn.seq,
                "ack does not match the connection"
            );
            return;
        }

        let event;
        let next;
        if segment.seq == conn.expected {
            conn.buffer.insert(segment.seq, segment.payload.clone());
            let mut ahead = segment.seq.wrapping_add(segment.payload.len() as u32);
            while let Some(buffered) = conn.buffer.get(&ahead) {
                ahead = ahead.wrapping_add(buffered.len() as u32);
            }
            conn.expected = ahead;
            next = ahead;
            event = "snd";
        } else if segment.seq < conn.expected {
            // already delivered; re-request what we are owed
            self.stats.duplicate_data_segments += 1;
            self.stats.duplicate_acks_sent += 1;
            next = conn.expected;
            event = "snd/DA";
        } else {
            // a gap before it; hold on to the payload for later
            if conn.buffer.contains_key(&segment.seq) {
                self.stats.duplicate_data_segments += 1;
            } else {
                conn.buffer.insert(segment.seq, segment.payload.clone());
            }
            self.stats.duplicate_acks_sent += 1;
            next = conn.expected;
            event = "snd/DA";
        }

        let reply = Segment::control(Flags::ACK, conn.seq, next);
        drop(connections);
        self.send_segment(&reply, event, from);
    }

    /// Answer the peer's FIN with our ack and our own FIN, wait out the
    /// final ack, then assemble and write the file.
    fn teardown(&mut self, fin: &Segment, from: SocketAddr) -> Result<(), ReceiverError> {
        info!(%from, "teardown requested");

        let seq = {
            let mut connections = self.connections.lock();
            match connections.get_mut(&from) {
                Some(conn) => {
                    let seq = conn.seq;
                    conn.seq = seq.wrapping_add(1);
                    seq
                }
                None => return Ok(()),
            }
        };

        let fin_ack = fin.seq.wrapping_add(1);
        self.send_segment(&Segment::control(Flags::ACK, seq, fin_ack), "snd", from);
        self.send_segment(&Segment::control(Flags::FIN, seq, fin_ack), "snd", from);

        // LAST_ACK: skip late arrivals from the transfer until the peer
        // acks our FIN
        let awaited = seq.wrapping_add(1);
        loop {
            let segment = match self.socket.recv()? {
                Inbound::Segment(segment, _) => segment,
                Inbound::Corrupt(_) | Inbound::Malformed(_) => {
                    self.stats.bit_error_segments += 1;
                    continue;
                }
            };
            self.register_arrival(&segment);
            if segment.is_ack() && segment.ack == awaited {
                break;
            }
        }

        let data = {
            let mut connections = self.connections.lock();
            match connections.remove(&from) {
                Some(conn) => assemble(conn.buffer),
                None => Vec::new(),
            }
        };

        println!();
        let summary = self.stats.summary();
        self.log.append_summary(&summary);
        print!("{}", summary);

        fs::write(&self.filename, &data).map_err(|source| ReceiverError::WriteOutput {
            filename: self.filename.clone(),
            source,
        })?;
        info!(bytes = data.len(), file = %self.filename, "connection terminated");
        Ok(())
    }

    fn send_segment(&self, segment: &Segment, event: &str, to: SocketAddr) {
        if let Err(err) = self.socket.send_to(&segment.encode(), to) {
            warn!("send failed: {}", err);
            return;
        }
        self.log.record(event, segment);
    }
}

/// Concatenate buffered payloads in ascending sequence order.
fn assemble(buffer: BTreeMap<u32, Bytes>) -> Vec<u8> {
    let mut data = Vec::with_capacity(buffer.values().map(|payload| payload.len()).sum());
    for payload in buffer.values() {
        data.extend_from_slice(payload);
    }
    data
}
