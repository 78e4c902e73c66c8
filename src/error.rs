//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (channel configuration,
//! transfer requests, wire encoding/decoding).
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while validating or updating the channel table.
pub enum ConfigError {
    /// Link capacity incompatible with the framing variant (legacy frames are
    /// always 8 bytes, extended frames range from 12 to 64).
    #[error("Invalid link capacity for framing variant")]
    InvalidLinkCapacity,
    /// Session values are a 4-bit multiplex field (0-15).
    #[error("Session out of range")]
    InvalidSession,
    /// A block must grant at least one segment.
    #[error("Block size must be at least one segment")]
    InvalidBlockSize,
    /// Every protocol timer must last at least one timing tick.
    #[error("Protocol timer must be at least one tick")]
    InvalidTimer,
    /// Two routes claim the same frame identifier in the same direction.
    #[error("Duplicate frame identifier route")]
    DuplicateRoute,
    /// The static route table is full.
    #[error("Route table capacity exceeded")]
    TooManyRoutes,
    /// Reconfiguration is only permitted while the channel is idle.
    #[error("Channel has an active transfer")]
    ChannelActive,
    /// Channel index outside the configured table.
    #[error("Unknown channel")]
    UnknownChannel,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors returned by a transfer request before any frame is sent.
pub enum TransportError {
    /// At most one transfer is active per channel.
    #[error("Transfer already active on this channel")]
    Busy,
    /// Zero-length messages cannot be transported.
    #[error("Message is empty")]
    EmptyMessage,
    /// The message does not fit the framing variant's counters.
    #[error("Message exceeds the framing counters")]
    MessageTooLarge,
    /// Transmit requested on a receive channel (or vice versa).
    #[error("Channel direction mismatch")]
    DirectionMismatch,
    /// Channel index outside the configured table.
    #[error("Unknown channel")]
    UnknownChannel,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while interpreting a received frame.
pub enum DecodeError {
    /// The frame is shorter than the layout requires.
    #[error("Frame shorter than the layout requires")]
    TruncatedFrame,
    /// The control subtype byte does not name a known frame.
    #[error("Unknown control subtype {subtype}")]
    UnknownSubtype { subtype: u8 },
    /// Extended frames embed the session multiplex value; a mismatch means the
    /// frame belongs to another logical stream.
    #[error("Session {received} does not match configured session {expected}")]
    SessionMismatch { received: u8, expected: u8 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while building a frame for transmission.
pub enum EncodeError {
    /// Output buffer smaller than the negotiated link capacity.
    #[error("Output buffer smaller than the link capacity")]
    BufferTooSmall,
    /// A counter field value exceeds its wire width.
    #[error("Field value exceeds its counter width")]
    CounterOverflow,
    /// Payload chunk does not fit the frame after its header.
    #[error("Payload does not fit the frame")]
    PayloadTooLarge,
    /// The subtype has no layout in the requested framing variant
    /// (end-of-message status only exists in extended framing).
    #[error("Subtype not defined for this framing variant")]
    UnsupportedSubtype,
}
