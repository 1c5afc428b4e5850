//! Reassembly of fragmented handshake messages.
//!
//! According to RFC 6347, Section 4.2.3, "DTLS implementations MUST be able
//! to handle overlapping fragment ranges". Overlapping fragments are handled
//! by an early test whether a fragment contains any new data-range, and by
//! merging adjacent ranges after every insertion. The range list is bounded
//! by the number of gaps still uncovered, not by the number of fragments
//! received.

use std::fmt;
use std::net::SocketAddr;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24};
use nom::IResult;

use crate::types::MessageType;
use crate::Error;

/// One fragment of a handshake message, as delivered by the record layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub msg_type: MessageType,

    /// Total length of the handshake message this fragment belongs to.
    pub length: u32,

    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,

    /// Peer the fragment arrived from.
    pub peer: SocketAddr,

    /// Fragment body, exactly `fragment_length` bytes.
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Parse the 12 byte handshake header followed by the fragment body.
    ///
    /// The peer is not on the wire, it comes from the UDP datagram.
    pub fn parse(input: &'a [u8], peer: SocketAddr) -> IResult<&'a [u8], Fragment<'a>> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;
        let (input, payload) = take(fragment_length as usize)(input)?;

        Ok((
            input,
            Fragment {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
                peer,
                payload,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type.as_u8());
        output.extend_from_slice(&self.length.to_be_bytes()[1..]);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        output.extend_from_slice(&self.fragment_offset.to_be_bytes()[1..]);
        output.extend_from_slice(&self.fragment_length.to_be_bytes()[1..]);
        output.extend_from_slice(self.payload);
    }
}

/// A covered byte range of the message under reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentRange {
    offset: u32,
    end: u32,
}

impl FragmentRange {
    fn new(offset: u32, length: u32) -> Self {
        FragmentRange {
            offset,
            end: offset + length,
        }
    }

    /// Extend to a higher end. Same or lower end is ignored.
    fn amend_end(&mut self, end: u32) {
        if self.end < end {
            self.end = end;
        }
    }
}

impl fmt::Display for FragmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "range[{}:{})", self.offset, self.end)
    }
}

/// Reassembles one fragmented handshake message into a contiguous buffer.
///
/// The ranges are kept sorted by offset and pairwise disjoint. A fragment
/// whose range is already fully covered is dropped before any copying.
pub struct ReassemblingMessage {
    msg_type: MessageType,
    message_seq: u16,
    peer: SocketAddr,
    buffer: Vec<u8>,
    ranges: Vec<FragmentRange>,
}

impl ReassemblingMessage {
    /// Start reassembling from the first received fragment.
    pub fn new(first: &Fragment) -> Result<Self, Error> {
        let mut message = ReassemblingMessage {
            msg_type: first.msg_type,
            message_seq: first.message_seq,
            peer: first.peer,
            buffer: vec![0; first.length as usize],
            ranges: Vec::new(),
        };
        message.add(first)?;
        Ok(message)
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn message_seq(&self) -> u16 {
        self.message_seq
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Total length of the message under reassembly.
    pub fn length(&self) -> u32 {
        self.buffer.len() as u32
    }

    /// Check if reassembling is complete.
    pub fn is_complete(&self) -> bool {
        // The first range must cover 0 to message length.
        self.ranges
            .first()
            .map_or(false, |first| first.offset == 0 && self.length() <= first.end)
    }

    /// Add the data of a fragment to the reassembled message.
    ///
    /// Fails with [`crate::DpskError::InconsistentFragment`] if the type,
    /// sequence number, total length or peer doesn't match the previous
    /// fragments, and with [`crate::DpskError::FragmentExceedsMessage`] if
    /// the fragment runs past the declared message length. Both are fatal
    /// for the flight; the caller must not continue feeding it.
    pub fn add(&mut self, fragment: &Fragment) -> Result<(), Error> {
        if fragment.msg_type != self.msg_type {
            return Err(Error::InconsistentFragment("message type"));
        }
        if fragment.message_seq != self.message_seq {
            return Err(Error::InconsistentFragment("message sequence number"));
        }
        if fragment.length != self.length() {
            return Err(Error::InconsistentFragment("message length"));
        }
        if fragment.peer != self.peer {
            return Err(Error::InconsistentFragment("peer"));
        }
        if fragment.payload.len() != fragment.fragment_length as usize {
            return Err(Error::InconsistentFragment("fragment length"));
        }

        if self.is_complete() {
            // Late duplicate of an already reassembled message.
            return Ok(());
        }

        // Computed in u64 so hand-built metadata can not overflow. Parsed
        // fragments are bounded by the 24 bit header fields anyway.
        let end = u64::from(fragment.fragment_offset) + u64::from(fragment.fragment_length);
        if u64::from(self.length()) < end {
            return Err(Error::FragmentExceedsMessage(end, self.length()));
        }

        let new_range = FragmentRange::new(fragment.fragment_offset, fragment.fragment_length);

        // Find the position in offset order.
        let mut position = self.ranges.len();
        for (index, current) in self.ranges.iter().enumerate() {
            if new_range.offset <= current.offset {
                position = index;
                break;
            } else if new_range.end <= current.end {
                trace!("Fragment {} already assembled", new_range);
                return Ok(());
            }
        }

        // Copy the full payload, including any part overlapping an already
        // covered range. The content is identical, the rewrite is idempotent.
        let offset = new_range.offset as usize;
        self.buffer[offset..offset + fragment.payload.len()].copy_from_slice(fragment.payload);
        self.ranges.insert(position, new_range);

        // Merge adjacent ranges in a single forward pass.
        let mut index = 0;
        while index + 1 < self.ranges.len() {
            let next = self.ranges[index + 1];
            if next.offset <= self.ranges[index].end {
                self.ranges[index].amend_end(next.end);
                self.ranges.remove(index + 1);
            } else {
                index += 1;
            }
        }

        if self.is_complete() {
            debug!(
                "Reassembled {:?} message_seq={} ({} bytes)",
                self.msg_type,
                self.message_seq,
                self.buffer.len()
            );
        }

        Ok(())
    }

    /// The reassembled message body.
    ///
    /// Only meaningful once [`ReassemblingMessage::is_complete`] returns
    /// true. Uncovered parts of the buffer are zero.
    pub fn assembled_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl fmt::Debug for ReassemblingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReassemblingMessage")
            .field("msg_type", &self.msg_type)
            .field("message_seq", &self.message_seq)
            .field("peer", &self.peer)
            .field("length", &self.buffer.len())
            .field("ranges", &self.ranges.len())
            .finish()
    }
}
