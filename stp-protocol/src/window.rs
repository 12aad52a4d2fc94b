//! Sender-Side Sliding Window
//!
//! The transfer file is split once into an ordered queue of segments; the
//! window is a pair of inclusive pane indices `[min_pane, max_pane]` sliding
//! along that queue. Acknowledgments are cumulative: an ack value names the
//! next byte the receiver expects, so it acknowledges every pane before the
//! one it maps to. Duplicate acks are counted per pane with an ordinal
//! status, and the third observation of the same ack value triggers a fast
//! retransmission of the first unacknowledged pane.

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// One queued payload with its sequence number and the ack value that
/// acknowledges it (`seq + payload.len()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSegment {
    pub payload: Bytes,
    pub seq: u32,
    pub expected_ack: u32,
}

/// The file broken into maximum-segment-size chunks, fixed for the whole
/// transfer, with a reverse index from ack value to pane position.
#[derive(Debug, Clone)]
pub struct SegmentQueue {
    segments: Vec<QueuedSegment>,
    index: HashMap<u32, usize>,
    total_bytes: u64,
}

impl SegmentQueue {
    /// Chunk `data` into segments of at most `segment_size` bytes, with
    /// sequence numbers starting at `first_seq`.
    pub fn build(data: &[u8], first_seq: u32, segment_size: usize) -> Self {
        let mut segments = Vec::new();
        let mut index = HashMap::new();
        let mut seq = first_seq;

        for chunk in data.chunks(segment_size) {
            let expected_ack = seq.wrapping_add(chunk.len() as u32);
            index.insert(expected_ack, segments.len());
            segments.push(QueuedSegment {
                payload: Bytes::copy_from_slice(chunk),
                seq,
                expected_ack,
            });
            seq = expected_ack;
        }

        SegmentQueue {
            segments,
            index,
            total_bytes: data.len() as u64,
        }
    }

    /// Number of queued segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total payload bytes across the queue
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Segment at a pane position, if the pane exists
    pub fn get(&self, pane: usize) -> Option<&QueuedSegment> {
        self.segments.get(pane)
    }

    /// Pane position acknowledged by an ack value
    pub fn pane_of(&self, ack: u32) -> Option<usize> {
        self.index.get(&ack).copied()
    }
}

/// Per-pane transmission status.
///
/// The three trailing states count observations of one ack value: the
/// cumulative ack that slides the window past a pane is the first, and the
/// bump that lands on `DupAck2` is the third, firing the fast retransmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneStatus {
    Unsent,
    Sent,
    Received,
    DupAck1,
    DupAck2,
}

impl PaneStatus {
    fn bump(self) -> PaneStatus {
        match self {
            PaneStatus::Unsent => PaneStatus::Sent,
            PaneStatus::Sent => PaneStatus::Received,
            PaneStatus::Received => PaneStatus::DupAck1,
            PaneStatus::DupAck1 => PaneStatus::DupAck2,
            PaneStatus::DupAck2 => PaneStatus::DupAck2,
        }
    }
}

/// Result of applying one received ack to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window base moved. `outstanding` is true when panes of the old
    /// window remain unacknowledged, which restarts the retransmission
    /// timer without a new sample.
    Advanced {
        cumulative_ack: u32,
        finished: bool,
        outstanding: bool,
    },
    /// A stale ack. `retransmit` carries the pane to fast-retransmit when
    /// this was the third observation of the value.
    Duplicate { retransmit: Option<usize> },
    /// The value maps to no queued segment
    Unknown,
}

/// Sliding window over a segment queue
#[derive(Debug, Clone)]
pub struct Window {
    queue: SegmentQueue,
    num_panes: usize,
    status: Vec<PaneStatus>,
    min_pane: usize,
    max_pane: usize,
}

impl Window {
    /// Build a window over `queue` sized from the maximum window and
    /// segment sizes. At least one pane is always available, and the
    /// geometry must satisfy `num_panes * segment_size <= window_size`.
    pub fn new(
        queue: SegmentQueue,
        window_size: usize,
        segment_size: usize,
    ) -> Result<Self, WindowError> {
        let num_panes = (window_size / segment_size).max(1);
        if num_panes * segment_size > window_size {
            return Err(WindowError::InvalidGeometry {
                window_size,
                segment_size,
            });
        }

        let status = vec![PaneStatus::Unsent; queue.len()];
        let max_pane = (num_panes - 1).min(queue.len());
        Ok(Window {
            queue,
            num_panes,
            status,
            min_pane: 0,
            max_pane,
        })
    }

    pub fn queue(&self) -> &SegmentQueue {
        &self.queue
    }

    pub fn num_panes(&self) -> usize {
        self.num_panes
    }

    pub fn min_pane(&self) -> usize {
        self.min_pane
    }

    pub fn max_pane(&self) -> usize {
        self.max_pane
    }

    /// Whether every queued segment has been acknowledged
    pub fn is_complete(&self) -> bool {
        self.min_pane >= self.queue.len()
    }

    /// Segment at the window base, the retransmission target on timeout
    pub fn base_segment(&self) -> Option<&QueuedSegment> {
        self.queue.get(self.min_pane)
    }

    /// Panes inside the window that have never been transmitted
    pub fn unsent_panes(&self) -> Vec<usize> {
        (self.min_pane..=self.max_pane)
            .filter(|&pane| pane < self.queue.len())
            .filter(|&pane| self.status[pane] == PaneStatus::Unsent)
            .collect()
    }

    /// Record that a pane has been handed to the network
    pub fn mark_sent(&mut self, pane: usize) {
        if let Some(status) = self.status.get_mut(pane) {
            *status = PaneStatus::Sent;
        }
    }

    /// Apply a received ack value to the window
    pub fn on_ack(&mut self, ack: u32) -> AckOutcome {
        let pane = match self.queue.pane_of(ack) {
            Some(pane) => pane,
            None => return AckOutcome::Unknown,
        };

        if pane >= self.min_pane {
            // cumulative: everything up to the acked pane is covered
            for covered in self.min_pane..=pane {
                self.status[covered] = PaneStatus::Received;
            }
            self.min_pane = pane + 1;

            let finished = self.min_pane == self.queue.len();
            let outstanding = !finished && self.min_pane <= self.max_pane;
            if !finished {
                self.max_pane = (self.min_pane + self.num_panes - 1).min(self.queue.len());
            }
            AckOutcome::Advanced {
                cumulative_ack: ack,
                finished,
                outstanding,
            }
        } else {
            let was = self.status[pane];
            self.status[pane] = was.bump();
            if was == PaneStatus::DupAck1 {
                // third observation of this ack value
                let target = pane + 1;
                if target < self.queue.len() {
                    self.status[pane] = PaneStatus::Sent;
                    return AckOutcome::Duplicate {
                        retransmit: Some(target),
                    };
                }
            }
            AckOutcome::Duplicate { retransmit: None }
        }
    }
}

/// Window construction errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    /// The segment size does not fit the window even once
    #[error("invalid window geometry: segment size {segment_size} exceeds window size {window_size}")]
    InvalidGeometry {
        window_size: usize,
        segment_size: usize,
    },
}
