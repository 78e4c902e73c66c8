//! Static per-channel configuration. Every channel is described once at
//! startup (direction, transfer mode, framing variant, link capacity, timing
//! constants, and frame-identifier bindings) and stays read-only while a
//! transfer is active. A reconfiguration entry point on the stack may swap
//! timing, capacity, mode, and block size while the channel is idle.
use crate::error::ConfigError;
use crate::protocol::frame::{FrameId, MAX_LINK_CAPACITY};

//==================================================================================Constants

/// Default timing-tick period assumed by [`Timing::recommended`].
pub const DEFAULT_TICK_MS: u32 = 10;

/// Handoff-retry / local confirmation bound (Tr), milliseconds.
pub const TR_MS: u32 = 200;
/// Receiver: gap between consecutive data frames (T1), milliseconds.
pub const T1_MS: u32 = 750;
/// Receiver: wait for the first data frame after a grant (T2), milliseconds.
pub const T2_MS: u32 = 1250;
/// Sender: wait for CTS or end-of-message ack (T3), milliseconds.
pub const T3_MS: u32 = 1250;
/// Sender: hold after a zero-segment grant (T4), milliseconds.
pub const T4_MS: u32 = 1050;
/// Minimum spacing between broadcast data frames (STmin), milliseconds.
pub const ST_MIN_MS: u32 = 50;

//==================================================================================Enums and Structs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Whether the channel originates or terminates transfers.
pub enum Direction {
    Tx,
    Rx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Transfer protocol bound to the channel.
pub enum TransferMode {
    /// Connectionless multi-frame send (BAM): no flow control, no ack.
    Broadcast,
    /// Connection-oriented transfer (RTS/CTS): receiver-paced blocks.
    FlowControlled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Wire framing variant.
pub enum FramingVariant {
    /// Classic 8-byte frames, byte-packed counters, one-byte sequence header.
    Legacy,
    /// CAN FD frames with configurable capacity, 24-bit little-endian
    /// counters, and a session-multiplex nibble in the subtype byte.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Protocol timing constants, expressed in timing-tick units.
pub struct Timing {
    /// Bound on a frame handoff: rejection retries and the wait for the local
    /// transmit confirmation (Tr).
    pub retry: u16,
    /// Receiver: gap between consecutive data frames.
    pub t1: u16,
    /// Receiver: wait for the first data frame of a granted block.
    pub t2: u16,
    /// Sender: wait for CTS or end-of-message ack.
    pub t3: u16,
    /// Sender: hold after a zero-segment grant.
    pub t4: u16,
    /// Minimum spacing between broadcast data frames. Zero disables pacing.
    pub min_spacing: u16,
}

impl Timing {
    /// Recommended J1939 values converted to ticks of `tick_ms` milliseconds.
    pub const fn recommended(tick_ms: u32) -> Self {
        Self {
            retry: (TR_MS / tick_ms) as u16,
            t1: (T1_MS / tick_ms) as u16,
            t2: (T2_MS / tick_ms) as u16,
            t3: (T3_MS / tick_ms) as u16,
            t4: (T4_MS / tick_ms) as u16,
            min_spacing: (ST_MIN_MS / tick_ms) as u16,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry == 0 || self.t1 == 0 || self.t2 == 0 || self.t3 == 0 || self.t4 == 0 {
            return Err(ConfigError::InvalidTimer);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Complete static description of one channel.
pub struct ChannelConfig {
    pub direction: Direction,
    pub mode: TransferMode,
    pub framing: FramingVariant,
    /// Negotiated frame length on the link. Fixed at 8 for legacy framing,
    /// 12 to 64 for extended framing.
    pub link_capacity: u8,
    /// 4-bit session-multiplex value embedded in extended subtype bytes.
    pub session: u8,
    /// Fill byte used to pad short frames to the link capacity.
    pub pad_byte: u8,
    /// Locally configured maximum segments per block (flow control).
    pub max_block: u8,
    /// Message-group identifier carried by every control frame.
    pub group_id: u32,
    pub timing: Timing,
    /// Identifier for control frames this channel transmits.
    pub control_tx_id: FrameId,
    /// Identifier for control frames this channel receives.
    pub control_rx_id: FrameId,
    /// Identifier for data-segment frames.
    pub data_id: FrameId,
    /// Identifier for unsegmented direct frames.
    pub direct_id: FrameId,
}

impl ChannelConfig {
    /// Check the static invariants of a single channel entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.framing {
            FramingVariant::Legacy => {
                if self.link_capacity != 8 {
                    return Err(ConfigError::InvalidLinkCapacity);
                }
            }
            FramingVariant::Extended => {
                // Extended headers need room for at least one payload byte
                // after the 11-byte RTS layout.
                if self.link_capacity < 12 || usize::from(self.link_capacity) > MAX_LINK_CAPACITY {
                    return Err(ConfigError::InvalidLinkCapacity);
                }
            }
        }
        if self.session > 0x0F {
            return Err(ConfigError::InvalidSession);
        }
        if self.max_block == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        self.timing.validate()
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Subset of a channel's configuration that may change after startup.
/// Applied by the stack only while the channel is idle.
pub struct Reconfig {
    pub timing: Timing,
    pub link_capacity: u8,
    pub mode: TransferMode,
    pub max_block: u8,
}
