//! Transient wire values exchanged with the bus layer: frame identifiers,
//! decoded control frames, and data-segment views. Nothing here is persisted;
//! the per-channel engines retain only what is needed to rebuild a frame.

/// Largest link capacity supported by the extended framing variant (CAN FD).
pub const MAX_LINK_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Bus frame identifier. The 29-bit CAN id space is opaque to the engines;
/// routing only compares identifiers for equality.
pub struct FrameId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Index of a configured channel. Identity stays an index into the static
/// channel table, never an address.
pub struct ChannelId(pub u8);

impl ChannelId {
    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Frame category resolved by the dispatcher for a given identifier.
pub enum FrameCategory {
    /// Handshake and termination frames (RTS, CTS, EOMS, EOMA, BAM, abort).
    Control,
    /// Sequence-numbered payload segments.
    Data,
    /// Unsegmented single-frame messages.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Connection abort reasons with their wire codes (J1939-22 table).
pub enum AbortReason {
    /// Node is already engaged in a session for this group.
    Busy,
    /// A system resource was unavailable.
    ResourcesLacked,
    /// A protocol timer elapsed while waiting for the peer.
    Timeout,
    /// CTS received while a data transmission was in progress.
    CtsWhileSending,
    /// Retransmission limit reached.
    RetransmitLimit,
    /// Data frame received outside an active session.
    UnexpectedDataFrame,
    /// Data frame sequence number out of order.
    BadSequenceNumber,
    /// Data frame sequence number repeated.
    DuplicateSequenceNumber,
    /// Declared message size exceeds local capabilities.
    MessageTooBig,
    /// End-of-message assurance data does not match the request.
    AssuranceDataMismatch,
    /// Control frame parameters are inconsistent.
    InvalidParameter,
    /// Reason code not recognised by this implementation.
    Other(u8),
}

impl AbortReason {
    /// Wire code carried in the abort control frame.
    pub fn code(self) -> u8 {
        match self {
            AbortReason::Busy => 1,
            AbortReason::ResourcesLacked => 2,
            AbortReason::Timeout => 3,
            AbortReason::CtsWhileSending => 4,
            AbortReason::RetransmitLimit => 5,
            AbortReason::UnexpectedDataFrame => 6,
            AbortReason::BadSequenceNumber => 7,
            AbortReason::DuplicateSequenceNumber => 8,
            AbortReason::MessageTooBig => 9,
            AbortReason::AssuranceDataMismatch => 10,
            AbortReason::InvalidParameter => 11,
            AbortReason::Other(code) => code,
        }
    }

    /// Reverse mapping; unknown codes are preserved as [`AbortReason::Other`].
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => AbortReason::Busy,
            2 => AbortReason::ResourcesLacked,
            3 => AbortReason::Timeout,
            4 => AbortReason::CtsWhileSending,
            5 => AbortReason::RetransmitLimit,
            6 => AbortReason::UnexpectedDataFrame,
            7 => AbortReason::BadSequenceNumber,
            8 => AbortReason::DuplicateSequenceNumber,
            9 => AbortReason::MessageTooBig,
            10 => AbortReason::AssuranceDataMismatch,
            11 => AbortReason::InvalidParameter,
            other => AbortReason::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// End-of-message assurance marker (extended framing only). Only `None` is
/// supported; any other type aborts the transfer rather than being silently
/// accepted.
pub enum AssuranceType {
    None,
    Cybersecurity,
    FunctionalSafety,
    Other(u8),
}

impl AssuranceType {
    pub fn code(self) -> u8 {
        match self {
            AssuranceType::None => 0,
            AssuranceType::Cybersecurity => 1,
            AssuranceType::FunctionalSafety => 2,
            AssuranceType::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AssuranceType::None,
            1 => AssuranceType::Cybersecurity,
            2 => AssuranceType::FunctionalSafety,
            other => AssuranceType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Decoded control frame, independent of the framing variant it travelled in.
pub enum ControlFrame {
    /// Request to send: opens a flow-controlled transfer.
    Rts {
        total_size: u32,
        segment_count: u32,
        max_block: u8,
        group_id: u32,
    },
    /// Clear to send: receiver grants the next block of segments.
    Cts {
        granted: u8,
        next_seq: u32,
        group_id: u32,
    },
    /// End-of-message status from the originator (extended framing).
    EndOfMsgStatus {
        total_size: u32,
        segment_count: u32,
        assurance: AssuranceType,
        group_id: u32,
    },
    /// End-of-message acknowledgement from the receiver.
    EndOfMsgAck {
        total_size: u32,
        segment_count: u32,
        group_id: u32,
    },
    /// Broadcast announce: opens a connectionless transfer, no handshake.
    Bam {
        total_size: u32,
        segment_count: u32,
        group_id: u32,
    },
    /// Connection abort, either direction.
    Abort { reason: AbortReason, group_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Borrowed view of a decoded data frame. The chunk still carries trailing
/// padding; the receive engine trims it against the declared total size.
pub struct DataFrame<'a> {
    /// 1-based segment position within the transfer.
    pub seq: u32,
    pub chunk: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Encoded frame ready for the bus, padded to the negotiated link capacity.
pub struct FrameBytes {
    pub data: [u8; MAX_LINK_CAPACITY],
    pub len: usize,
}

impl FrameBytes {
    /// Fresh buffer filled with the channel's pad byte.
    pub(crate) fn padded(pad_byte: u8, len: usize) -> Self {
        Self {
            data: [pad_byte; MAX_LINK_CAPACITY],
            len,
        }
    }

    /// Valid wire bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}
