//! Routing table tests: per-direction identifier registration, duplicate
//! detection, and capacity exhaustion.
use super::*;
use crate::config::{ChannelConfig, Direction, FramingVariant, Timing, TransferMode};

fn cfg(direction: Direction, base: u32) -> ChannelConfig {
    ChannelConfig {
        direction,
        mode: TransferMode::FlowControlled,
        framing: FramingVariant::Legacy,
        link_capacity: 8,
        session: 0,
        pad_byte: 0xFF,
        max_block: 8,
        group_id: 0x1234,
        timing: Timing::recommended(10),
        control_tx_id: FrameId(base),
        control_rx_id: FrameId(base + 1),
        data_id: FrameId(base + 2),
        direct_id: FrameId(base + 3),
    }
}

#[test]
/// A receiving channel resolves inbound control, data, and direct frames and
/// claims only its own control identifier outbound.
fn test_rx_channel_routes() {
    let mut table = RouteTable::new();
    let config = cfg(Direction::Rx, 0x100);
    table.insert_channel(ChannelId(0), &config).unwrap();

    let control = table.resolve_rx(config.control_rx_id).unwrap();
    assert_eq!(control.channel, ChannelId(0));
    assert_eq!(control.category, FrameCategory::Control);
    assert_eq!(
        table.resolve_rx(config.data_id).unwrap().category,
        FrameCategory::Data
    );
    assert_eq!(
        table.resolve_rx(config.direct_id).unwrap().category,
        FrameCategory::Direct
    );
    // The confirmation path knows only the control frames this side sends.
    assert!(table.resolve_tx(config.control_tx_id).is_some());
    assert!(table.resolve_tx(config.data_id).is_none());
}

#[test]
/// A transmitting channel claims data and direct identifiers outbound and
/// listens only for peer control frames.
fn test_tx_channel_routes() {
    let mut table = RouteTable::new();
    let config = cfg(Direction::Tx, 0x200);
    table.insert_channel(ChannelId(3), &config).unwrap();

    assert_eq!(
        table.resolve_tx(config.data_id).unwrap().channel,
        ChannelId(3)
    );
    assert!(table.resolve_tx(config.direct_id).is_some());
    assert!(table.resolve_rx(config.control_rx_id).is_some());
    assert!(table.resolve_rx(config.data_id).is_none());
}

#[test]
/// An identifier not known to the table resolves to nothing.
fn test_unknown_identifier() {
    let mut table = RouteTable::new();
    table
        .insert_channel(ChannelId(0), &cfg(Direction::Tx, 0x100))
        .unwrap();
    assert!(table.resolve_rx(FrameId(0xDEAD)).is_none());
    assert!(table.resolve_tx(FrameId(0xDEAD)).is_none());
}

#[test]
/// Two channels claiming the same identifier in the same direction is a
/// configuration error.
fn test_duplicate_identifier_rejected() {
    let mut table = RouteTable::new();
    table
        .insert_channel(ChannelId(0), &cfg(Direction::Tx, 0x100))
        .unwrap();
    assert_eq!(
        table.insert_channel(ChannelId(1), &cfg(Direction::Tx, 0x100)),
        Err(ConfigError::DuplicateRoute)
    );
}

#[test]
/// Table capacity is bounded; registration past it is refused.
fn test_route_capacity_exhaustion() {
    let mut table = RouteTable::new();
    // Each channel claims three outbound identifiers.
    for index in 0..16u32 {
        table
            .insert_channel(ChannelId(index as u8), &cfg(Direction::Tx, 0x1000 + index * 16))
            .unwrap();
    }
    assert_eq!(
        table.insert_channel(ChannelId(16), &cfg(Direction::Tx, 0x2000)),
        Err(ConfigError::TooManyRoutes)
    );
}
