//! STP Segment Structure and Serialization
//!
//! This module implements the STP segment format: an 11-byte header
//! (`seq: u32`, `ack: u32`, `flags: u8`, `checksum: u16`, all network byte
//! order) followed by an optional payload. The checksum is the RFC 1071
//! 16-bit one's-complement Internet checksum computed over the header with
//! a zeroed checksum field plus the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Size of the STP segment header in bytes (seq 4 + ack 4 + flags 1 + checksum 2)
pub const HEADER_LEN: usize = 11;

/// Byte offset of the checksum field within the header
const CHECKSUM_OFFSET: usize = 9;

/// Segment flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// No flags set (data segments)
    pub const NONE: Flags = Flags(0);
    /// Connection request
    pub const SYN: Flags = Flags(0b001);
    /// Acknowledgement
    pub const ACK: Flags = Flags(0b010);
    /// Connection request acknowledgement
    pub const SYN_ACK: Flags = Flags(0b011);
    /// Connection close request
    pub const FIN: Flags = Flags(0b100);

    /// Reconstruct flags from a raw header byte
    pub fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Raw header byte value
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Check that every bit of `other` is set
    #[inline]
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Short type code used in the event logs, with fixed classification
/// precedence: SYN+ACK > data (non-empty payload) > FIN > SYN > ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    SynAck,
    Data,
    Fin,
    Syn,
    Ack,
}

impl SegmentKind {
    /// Two-letter code written to the event logs
    pub fn code(self) -> &'static str {
        match self {
            SegmentKind::SynAck => "SA",
            SegmentKind::Data => "D",
            SegmentKind::Fin => "F",
            SegmentKind::Syn => "S",
            SegmentKind::Ack => "A",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single STP segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number of the first payload byte
    pub seq: u32,
    /// Acknowledgement number (next expected sequence value)
    pub ack: u32,
    /// Control flags
    pub flags: Flags,
    /// Payload data (empty for pure control segments)
    pub payload: Bytes,
}

impl Segment {
    /// Create a new segment
    pub fn new(seq: u32, ack: u32, flags: Flags, payload: Bytes) -> Self {
        Segment {
            seq,
            ack,
            flags,
            payload,
        }
    }

    /// Create a data segment (no flags)
    pub fn data(seq: u32, ack: u32, payload: Bytes) -> Self {
        Segment::new(seq, ack, Flags::NONE, payload)
    }

    /// Create a control segment (empty payload)
    pub fn control(flags: Flags, seq: u32, ack: u32) -> Self {
        Segment::new(seq, ack, flags, Bytes::new())
    }

    #[inline]
    pub fn is_syn(&self) -> bool {
        self.flags.contains(Flags::SYN)
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }

    #[inline]
    pub fn is_syn_ack(&self) -> bool {
        self.flags.contains(Flags::SYN_ACK)
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }

    /// Check whether the segment carries data
    #[inline]
    pub fn is_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Classify the segment for logging
    pub fn kind(&self) -> SegmentKind {
        if self.is_syn_ack() {
            SegmentKind::SynAck
        } else if self.is_data() {
            SegmentKind::Data
        } else if self.is_fin() {
            SegmentKind::Fin
        } else if self.is_syn() {
            SegmentKind::Syn
        } else {
            SegmentKind::Ack
        }
    }

    /// Total size of the encoded segment (header + payload)
    pub fn size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialize the segment, computing and embedding the checksum
    pub fn encode(&self) -> Bytes {
        let mut buf = self.encode_unsummed();
        let sum = internet_checksum(&buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        buf.freeze()
    }

    /// Serialize the segment with exactly one bit flipped in the flags byte
    /// while the checksum still covers the clean image, so the receiver's
    /// verification is guaranteed to fail.
    pub fn encode_corrupted(&self) -> Bytes {
        let mut buf = self.encode_unsummed();
        let sum = internet_checksum(&buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        buf[8] ^= 0x01;
        buf.freeze()
    }

    /// Header + payload with a zeroed checksum field (the checksum pre-image)
    fn encode_unsummed(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u8(self.flags.bits());
        buf.put_u16(0);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse and verify a segment from raw datagram bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Truncated { len: bytes.len() });
        }

        let mut buf = &bytes[..HEADER_LEN];
        let seq = buf.get_u32();
        let ack = buf.get_u32();
        let flags = Flags::from_bits(buf.get_u8());
        let carried = buf.get_u16();

        let mut image = bytes.to_vec();
        image[CHECKSUM_OFFSET] = 0;
        image[CHECKSUM_OFFSET + 1] = 0;
        let computed = internet_checksum(&image);
        if computed != carried {
            return Err(FrameError::Corrupt { computed, carried });
        }

        let payload = if bytes.len() > HEADER_LEN {
            Bytes::copy_from_slice(&bytes[HEADER_LEN..])
        } else {
            Bytes::new()
        };

        Ok(Segment {
            seq,
            ack,
            flags,
            payload,
        })
    }
}

/// RFC 1071 Internet checksum: one's-complement sum of 16-bit words with
/// end-around carry, complemented. Odd-length input is padded with a single
/// zero byte for the computation.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }
    if i < data.len() {
        sum += u16::from_be_bytes([data[i], 0]) as u32;
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Segment parsing and verification errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram shorter than the fixed header: structurally unusable
    #[error("truncated segment: {len} bytes, header needs {HEADER_LEN}")]
    Truncated { len: usize },

    /// Header parsed but the checksum did not verify
    #[error("checksum mismatch: computed {computed:#06x}, carried {carried:#06x}")]
    Corrupt { computed: u16, carried: u16 },
}

impl FrameError {
    /// True for frames that parsed far enough to fail verification
    #[inline]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, FrameError::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bits() {
        assert_eq!(Flags::SYN.bits(), 1);
        assert_eq!(Flags::ACK.bits(), 2);
        assert_eq!(Flags::SYN_ACK.bits(), 3);
        assert_eq!(Flags::FIN.bits(), 4);
        assert_eq!((Flags::SYN | Flags::ACK).bits(), Flags::SYN_ACK.bits());
    }

    #[test]
    fn test_kind_precedence() {
        let syn_ack = Segment::control(Flags::SYN_ACK, 0, 1);
        assert_eq!(syn_ack.kind(), SegmentKind::SynAck);

        // a data payload outranks every flag except SYN+ACK
        let data_with_fin = Segment::new(1, 1, Flags::FIN, Bytes::from_static(b"x"));
        assert_eq!(data_with_fin.kind(), SegmentKind::Data);

        assert_eq!(Segment::control(Flags::FIN, 0, 0).kind(), SegmentKind::Fin);
        assert_eq!(Segment::control(Flags::SYN, 0, 0).kind(), SegmentKind::Syn);
        assert_eq!(Segment::control(Flags::ACK, 0, 0).kind(), SegmentKind::Ack);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let segment = Segment::data(1, 1, Bytes::from_static(b"hello stp"));
        let wire = segment.encode();

        assert_eq!(wire.len(), HEADER_LEN + 9);
        let decoded = Segment::decode(&wire).unwrap();
        assert_eq!(decoded, segment);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let segment = Segment::control(Flags::SYN, 42, 0);
        let decoded = Segment::decode(&segment.encode()).unwrap();
        assert_eq!(decoded.seq, 42);
        assert!(decoded.is_syn());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_odd_length_payload() {
        let segment = Segment::data(100, 1, Bytes::from_static(b"abc"));
        let decoded = Segment::decode(&segment.encode()).unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"abc"));
    }

    #[test]
    fn test_truncated_is_failure() {
        let wire = Segment::data(1, 1, Bytes::from_static(b"payload")).encode();
        let err = Segment::decode(&wire[..HEADER_LEN - 1]).unwrap_err();
        assert_eq!(err, FrameError::Truncated { len: HEADER_LEN - 1 });
        assert!(!err.is_corrupt());
    }

    #[test]
    fn test_corrupted_encode_is_detected() {
        let segment = Segment::data(200, 1, Bytes::from_static(b"corrupt me"));
        let wire = segment.encode_corrupted();

        let err = Segment::decode(&wire).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_corrupted_encode_flips_one_flag_bit() {
        let segment = Segment::data(200, 1, Bytes::from_static(b"corrupt me"));
        let clean = segment.encode();
        let dirty = segment.encode_corrupted();

        assert_eq!(clean.len(), dirty.len());
        let differing: Vec<usize> = (0..clean.len()).filter(|&i| clean[i] != dirty[i]).collect();
        assert_eq!(differing, vec![8]);
        assert_eq!(clean[8] ^ dirty[8], 0x01);
    }

    #[test]
    fn test_single_bit_header_corruption_detected() {
        let segment = Segment::data(0xDEAD_BEEF, 0x1234_5678, Bytes::from_static(b"bits"));
        let wire = segment.encode();

        for byte in 0..HEADER_LEN {
            // the checksum field itself is also covered: flipping it must fail too
            for bit in 0..8 {
                let mut flipped = wire.to_vec();
                flipped[byte] ^= 1 << bit;
                assert!(
                    Segment::decode(&flipped).is_err(),
                    "flip of byte {} bit {} went undetected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_checksum_known_padding() {
        // odd length pads with one zero byte: [0x01] -> word 0x0100
        assert_eq!(internet_checksum(&[0x01]), !0x0100u16);
        assert_eq!(internet_checksum(&[]), !0u16);
        assert_eq!(internet_checksum(&[0xFF, 0xFF]), 0);
    }

    #[test]
    fn test_checksum_end_around_carry() {
        // 0xFFFF + 0x0001 overflows to 0x10000, folds back to 0x0001
        assert_eq!(internet_checksum(&[0xFF, 0xFF, 0x00, 0x01]), !0x0001u16);
    }
}
