//! UDP socket wrapper for STP
//!
//! One datagram carries exactly one segment. Inbound datagrams are decoded
//! and verified on receipt, so callers see either a valid segment or a
//! classified rejection, never raw bytes.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::Duration;
use stp_protocol::frame::{FrameError, Segment};
use thiserror::Error;

/// Receive buffer size; far above any valid segment
pub const BUFFER_SIZE: usize = 64000;

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid socket address")]
    InvalidAddress,
}

/// One received datagram, already decoded and verified
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Checksum-verified segment
    Segment(Segment, SocketAddr),
    /// Parsed but failed checksum verification
    Corrupt(SocketAddr),
    /// Too short to carry a segment header
    Malformed(SocketAddr),
}

/// UDP socket carrying STP segments
pub struct StpSocket {
    inner: Socket,
}

impl StpSocket {
    /// Create an unbound socket (sender side; the OS assigns a local port
    /// on the first send). Starts in blocking mode.
    pub fn open() -> Result<Self, SocketError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        Ok(StpSocket { inner: socket })
    }

    /// Create a socket bound to the given address (receiver side).
    /// Starts in blocking mode.
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        Ok(StpSocket { inner: socket })
    }

    /// Toggle blocking mode. The sender runs blocking during handshake and
    /// teardown and non-blocking during the transfer.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), SocketError> {
        self.inner.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Bound the wait of blocking receives. `None` waits forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), SocketError> {
        self.inner.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(SocketError::InvalidAddress)
    }

    /// Send raw datagram bytes to the target
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, &target.into())?)
    }

    /// Blocking receive of one datagram
    pub fn recv(&self) -> Result<Inbound, SocketError> {
        let mut buf = [0u8; BUFFER_SIZE];
        let (len, addr) = self.recv_from(&mut buf)?;
        Ok(classify(&buf[..len], addr))
    }

    /// Non-blocking receive: `Ok(None)` when no datagram is waiting
    pub fn poll_recv(&self) -> Result<Option<Inbound>, SocketError> {
        let mut buf = [0u8; BUFFER_SIZE];
        match self.recv_from(&mut buf) {
            Ok((len, addr)) => Ok(Some(classify(&buf[..len], addr))),
            Err(SocketError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        // socket2 wants a MaybeUninit buffer; u8 and MaybeUninit<u8> share
        // a layout, so reuse the caller's initialized one
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };
        let (len, addr) = self.inner.recv_from(uninit)?;
        let addr = addr.as_socket().ok_or(SocketError::InvalidAddress)?;
        Ok((len, addr))
    }
}

fn classify(datagram: &[u8], from: SocketAddr) -> Inbound {
    match Segment::decode(datagram) {
        Ok(segment) => Inbound::Segment(segment, from),
        Err(FrameError::Corrupt { .. }) => Inbound::Corrupt(from),
        Err(FrameError::Truncated { .. }) => Inbound::Malformed(from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use stp_protocol::frame::Flags;

    fn bound() -> StpSocket {
        StpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_bind_assigns_port() {
        let socket = bound();
        assert!(socket.local_addr().unwrap().port() > 0);
    }

    #[test]
    fn test_segment_roundtrip_over_loopback() {
        let sender = bound();
        let receiver = bound();
        let target = receiver.local_addr().unwrap();

        let segment = Segment::data(1, 1, Bytes::from_static(b"over loopback"));
        sender.send_to(&segment.encode(), target).unwrap();

        match receiver.recv().unwrap() {
            Inbound::Segment(received, from) => {
                assert_eq!(received, segment);
                assert_eq!(from, sender.local_addr().unwrap());
            }
            other => panic!("expected segment, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_datagram_classified() {
        let sender = bound();
        let receiver = bound();
        let target = receiver.local_addr().unwrap();

        let wire = Segment::control(Flags::ACK, 5, 9).encode_corrupted();
        sender.send_to(&wire, target).unwrap();

        assert!(matches!(receiver.recv().unwrap(), Inbound::Corrupt(_)));
    }

    #[test]
    fn test_short_datagram_classified_malformed() {
        let sender = bound();
        let receiver = bound();
        let target = receiver.local_addr().unwrap();

        sender.send_to(b"tiny", target).unwrap();

        assert!(matches!(receiver.recv().unwrap(), Inbound::Malformed(_)));
    }

    #[test]
    fn test_poll_recv_empty_then_ready() {
        let sender = bound();
        let receiver = bound();
        receiver.set_nonblocking(true).unwrap();

        assert!(receiver.poll_recv().unwrap().is_none());

        let segment = Segment::control(Flags::SYN, 0, 0);
        sender
            .send_to(&segment.encode(), receiver.local_addr().unwrap())
            .unwrap();

        // loopback delivery is fast but not instantaneous
        for _ in 0..50 {
            if let Some(inbound) = receiver.poll_recv().unwrap() {
                assert!(matches!(inbound, Inbound::Segment(s, _) if s.is_syn()));
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("datagram never arrived");
    }
}
