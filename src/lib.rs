//! `korri-j1939tp` library: SAE J1939 / J1939-22 style multi-packet transport
//! protocol engine for `no_std` environments. Application messages larger than
//! one CAN frame are segmented on the transmit side and reassembled on the
//! receive side, either as a connectionless broadcast (BAM) or as a
//! flow-controlled connection (RTS/CTS) paced by the receiver in blocks.
//! The engines are synchronous and tick-driven; an optional embassy-based
//! runner adapts them to an async firmware.
#![no_std]
//==================================================================================
/// Static per-channel configuration: timing constants, framing variant,
/// link capacity, transfer mode, and frame-identifier bindings.
pub mod config;
/// Domain errors (configuration, transfer requests, wire encode/decode).
pub mod error;
/// Transport protocol implementation: frame codec, per-channel transmit and
/// receive state machines, routing, and the tick scheduler.
pub mod protocol;
//==================================================================================
