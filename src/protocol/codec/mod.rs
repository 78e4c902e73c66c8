//! Stateless frame codec: bit-exact encode/decode of control and data frame
//! layouts in both framing variants, segment arithmetic, and padding.
//!
//! Legacy layouts are byte-packed into fixed 8-byte frames with single-byte
//! counters. Extended layouts use 24-bit little-endian counters, embed the
//! 4-bit session-multiplex value in the subtype byte, and pad to the
//! channel's configured link capacity.
use crate::config::{ChannelConfig, FramingVariant};
use crate::error::{DecodeError, EncodeError};
use crate::protocol::frame::{
    AbortReason, AssuranceType, ControlFrame, DataFrame, FrameBytes,
};

//==================================================================================Constants

// Legacy control subtype bytes (J1939-21 TP.CM control values).
const LEGACY_RTS: u8 = 0x10;
const LEGACY_CTS: u8 = 0x11;
const LEGACY_EOMA: u8 = 0x13;
const LEGACY_BAM: u8 = 0x20;
const LEGACY_ABORT: u8 = 0xFF;

// Extended subtype nibbles (J1939-22 multi-PG control values).
const EXT_RTS: u8 = 0x0;
const EXT_CTS: u8 = 0x1;
const EXT_EOMS: u8 = 0x2;
const EXT_EOMA: u8 = 0x3;
const EXT_BAM: u8 = 0x4;
const EXT_ABORT: u8 = 0xF;

/// Largest message transportable with legacy counters: 255 segments of
/// 7 bytes.
const LEGACY_MAX_MESSAGE: u32 = 255 * 7;
/// Extended counters are 24 bits wide.
const EXT_MAX_MESSAGE: u32 = 0x00FF_FFFF;

//==================================================================================Segment Arithmetic

/// Payload bytes carried by one data frame: link capacity minus the
/// one-byte legacy header or the four-byte extended header.
pub fn segment_capacity(cfg: &ChannelConfig) -> u32 {
    match cfg.framing {
        FramingVariant::Legacy => u32::from(cfg.link_capacity) - 1,
        FramingVariant::Extended => u32::from(cfg.link_capacity) - 4,
    }
}

/// Number of data frames needed for `total_size` bytes (ceiling division).
pub fn segment_count(cfg: &ChannelConfig, total_size: u32) -> u32 {
    total_size.div_ceil(segment_capacity(cfg))
}

/// Largest message the framing variant's counters can describe.
pub fn max_message_size(cfg: &ChannelConfig) -> u32 {
    match cfg.framing {
        FramingVariant::Legacy => LEGACY_MAX_MESSAGE,
        FramingVariant::Extended => EXT_MAX_MESSAGE,
    }
}

//==================================================================================Byte Helpers

fn get_u24_le(bytes: &[u8]) -> u32 {
    u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
}

fn put_u24_le(bytes: &mut [u8], value: u32) {
    bytes[0] = (value & 0xFF) as u8;
    bytes[1] = ((value >> 8) & 0xFF) as u8;
    bytes[2] = ((value >> 16) & 0xFF) as u8;
}

fn fits_u8(value: u32) -> Result<u8, EncodeError> {
    u8::try_from(value).map_err(|_| EncodeError::CounterOverflow)
}

fn fits_u16(value: u32) -> Result<u16, EncodeError> {
    u16::try_from(value).map_err(|_| EncodeError::CounterOverflow)
}

fn fits_u24(value: u32) -> Result<u32, EncodeError> {
    if value > EXT_MAX_MESSAGE {
        return Err(EncodeError::CounterOverflow);
    }
    Ok(value)
}

//==================================================================================Control Frames

/// Encode a control frame, padded to the channel's link capacity.
pub fn encode_control(cfg: &ChannelConfig, frame: &ControlFrame) -> Result<FrameBytes, EncodeError> {
    match cfg.framing {
        FramingVariant::Legacy => encode_control_legacy(cfg, frame),
        FramingVariant::Extended => encode_control_extended(cfg, frame),
    }
}

fn encode_control_legacy(
    cfg: &ChannelConfig,
    frame: &ControlFrame,
) -> Result<FrameBytes, EncodeError> {
    let mut out = FrameBytes::padded(cfg.pad_byte, usize::from(cfg.link_capacity));
    let buf = &mut out.data;
    match *frame {
        ControlFrame::Rts {
            total_size,
            segment_count,
            max_block,
            group_id,
        } => {
            buf[0] = LEGACY_RTS;
            buf[1..3].copy_from_slice(&fits_u16(total_size)?.to_le_bytes());
            buf[3] = fits_u8(segment_count)?;
            buf[4] = max_block;
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::Cts {
            granted,
            next_seq,
            group_id,
        } => {
            buf[0] = LEGACY_CTS;
            buf[1] = granted;
            buf[2] = fits_u8(next_seq)?;
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::EndOfMsgAck {
            total_size,
            segment_count,
            group_id,
        } => {
            buf[0] = LEGACY_EOMA;
            buf[1..3].copy_from_slice(&fits_u16(total_size)?.to_le_bytes());
            buf[3] = fits_u8(segment_count)?;
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::Bam {
            total_size,
            segment_count,
            group_id,
        } => {
            buf[0] = LEGACY_BAM;
            buf[1..3].copy_from_slice(&fits_u16(total_size)?.to_le_bytes());
            buf[3] = fits_u8(segment_count)?;
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::Abort { reason, group_id } => {
            buf[0] = LEGACY_ABORT;
            buf[1] = reason.code();
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::EndOfMsgStatus { .. } => return Err(EncodeError::UnsupportedSubtype),
    }
    Ok(out)
}

fn encode_control_extended(
    cfg: &ChannelConfig,
    frame: &ControlFrame,
) -> Result<FrameBytes, EncodeError> {
    let mut out = FrameBytes::padded(cfg.pad_byte, usize::from(cfg.link_capacity));
    let buf = &mut out.data;
    let subtype = |sub: u8| (sub << 4) | (cfg.session & 0x0F);
    match *frame {
        ControlFrame::Rts {
            total_size,
            segment_count,
            max_block,
            group_id,
        } => {
            buf[0] = subtype(EXT_RTS);
            put_u24_le(&mut buf[1..4], fits_u24(total_size)?);
            put_u24_le(&mut buf[4..7], fits_u24(segment_count)?);
            buf[7] = max_block;
            put_u24_le(&mut buf[8..11], fits_u24(group_id)?);
        }
        ControlFrame::Cts {
            granted,
            next_seq,
            group_id,
        } => {
            buf[0] = subtype(EXT_CTS);
            buf[1] = granted;
            put_u24_le(&mut buf[2..5], fits_u24(next_seq)?);
            put_u24_le(&mut buf[5..8], fits_u24(group_id)?);
        }
        ControlFrame::EndOfMsgStatus {
            total_size,
            segment_count,
            assurance,
            group_id,
        } => {
            buf[0] = subtype(EXT_EOMS);
            put_u24_le(&mut buf[1..4], fits_u24(total_size)?);
            put_u24_le(&mut buf[4..7], fits_u24(segment_count)?);
            buf[7] = assurance.code();
            put_u24_le(&mut buf[8..11], fits_u24(group_id)?);
        }
        ControlFrame::EndOfMsgAck {
            total_size,
            segment_count,
            group_id,
        } => {
            buf[0] = subtype(EXT_EOMA);
            put_u24_le(&mut buf[1..4], fits_u24(total_size)?);
            put_u24_le(&mut buf[4..7], fits_u24(segment_count)?);
            put_u24_le(&mut buf[7..10], fits_u24(group_id)?);
        }
        ControlFrame::Bam {
            total_size,
            segment_count,
            group_id,
        } => {
            buf[0] = subtype(EXT_BAM);
            put_u24_le(&mut buf[1..4], fits_u24(total_size)?);
            put_u24_le(&mut buf[4..7], fits_u24(segment_count)?);
            put_u24_le(&mut buf[8..11], fits_u24(group_id)?);
        }
        ControlFrame::Abort { reason, group_id } => {
            buf[0] = subtype(EXT_ABORT);
            buf[1] = reason.code();
            put_u24_le(&mut buf[2..5], fits_u24(group_id)?);
        }
    }
    Ok(out)
}

/// Decode a received control frame according to the channel's variant.
pub fn decode_control(cfg: &ChannelConfig, bytes: &[u8]) -> Result<ControlFrame, DecodeError> {
    match cfg.framing {
        FramingVariant::Legacy => decode_control_legacy(bytes),
        FramingVariant::Extended => decode_control_extended(cfg, bytes),
    }
}

fn decode_control_legacy(bytes: &[u8]) -> Result<ControlFrame, DecodeError> {
    if bytes.len() < 8 {
        return Err(DecodeError::TruncatedFrame);
    }
    let group_id = get_u24_le(&bytes[5..8]);
    match bytes[0] {
        LEGACY_RTS => Ok(ControlFrame::Rts {
            total_size: u32::from(u16::from_le_bytes([bytes[1], bytes[2]])),
            segment_count: u32::from(bytes[3]),
            max_block: bytes[4],
            group_id,
        }),
        LEGACY_CTS => Ok(ControlFrame::Cts {
            granted: bytes[1],
            next_seq: u32::from(bytes[2]),
            group_id,
        }),
        LEGACY_EOMA => Ok(ControlFrame::EndOfMsgAck {
            total_size: u32::from(u16::from_le_bytes([bytes[1], bytes[2]])),
            segment_count: u32::from(bytes[3]),
            group_id,
        }),
        LEGACY_BAM => Ok(ControlFrame::Bam {
            total_size: u32::from(u16::from_le_bytes([bytes[1], bytes[2]])),
            segment_count: u32::from(bytes[3]),
            group_id,
        }),
        LEGACY_ABORT => Ok(ControlFrame::Abort {
            reason: AbortReason::from_code(bytes[1]),
            group_id,
        }),
        subtype => Err(DecodeError::UnknownSubtype { subtype }),
    }
}

fn decode_control_extended(
    cfg: &ChannelConfig,
    bytes: &[u8],
) -> Result<ControlFrame, DecodeError> {
    if bytes.len() < usize::from(cfg.link_capacity) {
        return Err(DecodeError::TruncatedFrame);
    }
    let received = bytes[0] & 0x0F;
    if received != cfg.session {
        return Err(DecodeError::SessionMismatch {
            received,
            expected: cfg.session,
        });
    }
    match bytes[0] >> 4 {
        EXT_RTS => Ok(ControlFrame::Rts {
            total_size: get_u24_le(&bytes[1..4]),
            segment_count: get_u24_le(&bytes[4..7]),
            max_block: bytes[7],
            group_id: get_u24_le(&bytes[8..11]),
        }),
        EXT_CTS => Ok(ControlFrame::Cts {
            granted: bytes[1],
            next_seq: get_u24_le(&bytes[2..5]),
            group_id: get_u24_le(&bytes[5..8]),
        }),
        EXT_EOMS => Ok(ControlFrame::EndOfMsgStatus {
            total_size: get_u24_le(&bytes[1..4]),
            segment_count: get_u24_le(&bytes[4..7]),
            assurance: AssuranceType::from_code(bytes[7]),
            group_id: get_u24_le(&bytes[8..11]),
        }),
        EXT_EOMA => Ok(ControlFrame::EndOfMsgAck {
            total_size: get_u24_le(&bytes[1..4]),
            segment_count: get_u24_le(&bytes[4..7]),
            group_id: get_u24_le(&bytes[7..10]),
        }),
        EXT_BAM => Ok(ControlFrame::Bam {
            total_size: get_u24_le(&bytes[1..4]),
            segment_count: get_u24_le(&bytes[4..7]),
            group_id: get_u24_le(&bytes[8..11]),
        }),
        EXT_ABORT => Ok(ControlFrame::Abort {
            reason: AbortReason::from_code(bytes[1]),
            group_id: get_u24_le(&bytes[2..5]),
        }),
        subtype => Err(DecodeError::UnknownSubtype { subtype }),
    }
}

//==================================================================================Data Frames

/// Encode one sequence-numbered payload segment, padded to link capacity.
pub fn encode_data(cfg: &ChannelConfig, seq: u32, chunk: &[u8]) -> Result<FrameBytes, EncodeError> {
    if chunk.len() > segment_capacity(cfg) as usize {
        return Err(EncodeError::PayloadTooLarge);
    }
    let mut out = FrameBytes::padded(cfg.pad_byte, usize::from(cfg.link_capacity));
    match cfg.framing {
        FramingVariant::Legacy => {
            if seq == 0 {
                return Err(EncodeError::CounterOverflow);
            }
            out.data[0] = fits_u8(seq)?;
            out.data[1..1 + chunk.len()].copy_from_slice(chunk);
        }
        FramingVariant::Extended => {
            if seq == 0 {
                return Err(EncodeError::CounterOverflow);
            }
            out.data[0] = cfg.session & 0x0F;
            put_u24_le(&mut out.data[1..4], fits_u24(seq)?);
            out.data[4..4 + chunk.len()].copy_from_slice(chunk);
        }
    }
    Ok(out)
}

/// Decode a data frame into its sequence number and (still padded) chunk.
pub fn decode_data<'a>(cfg: &ChannelConfig, bytes: &'a [u8]) -> Result<DataFrame<'a>, DecodeError> {
    match cfg.framing {
        FramingVariant::Legacy => {
            if bytes.len() < 2 {
                return Err(DecodeError::TruncatedFrame);
            }
            Ok(DataFrame {
                seq: u32::from(bytes[0]),
                chunk: &bytes[1..],
            })
        }
        FramingVariant::Extended => {
            if bytes.len() < 5 {
                return Err(DecodeError::TruncatedFrame);
            }
            let received = bytes[0] & 0x0F;
            if received != cfg.session {
                return Err(DecodeError::SessionMismatch {
                    received,
                    expected: cfg.session,
                });
            }
            Ok(DataFrame {
                seq: get_u24_le(&bytes[1..4]),
                chunk: &bytes[4..],
            })
        }
    }
}

//==================================================================================Direct Frames

/// Encode an unsegmented message, padded to link capacity.
pub fn encode_direct(cfg: &ChannelConfig, payload: &[u8]) -> Result<FrameBytes, EncodeError> {
    if payload.len() > usize::from(cfg.link_capacity) {
        return Err(EncodeError::PayloadTooLarge);
    }
    let mut out = FrameBytes::padded(cfg.pad_byte, usize::from(cfg.link_capacity));
    out.data[..payload.len()].copy_from_slice(payload);
    Ok(out)
}
