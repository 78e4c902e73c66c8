//! Identifier routing: maps bus frame identifiers to the channel and frame
//! category they belong to. Two tables, one per traffic direction, so an
//! inbound frame and a confirmation for an outbound frame resolve
//! independently.
use crate::config::{ChannelConfig, Direction};
use crate::error::ConfigError;
use crate::protocol::frame::{ChannelId, FrameCategory, FrameId};

//==================================================================================Constants

pub const MAX_CHANNELS: usize = 16;
/// Up to three identifiers per channel per direction, shared across a
/// moderate channel count.
pub const MAX_ROUTES: usize = 48;

//==================================================================================Enums and Structs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One resolved identifier: which channel it belongs to and what kind of
/// frame travels under it.
pub struct Route {
    pub id: FrameId,
    pub channel: ChannelId,
    pub category: FrameCategory,
}

#[derive(Debug)]
/// Fixed-capacity routing tables, built once from the channel configurations
/// and consulted with a linear scan per frame.
pub struct RouteTable {
    rx: [Option<Route>; MAX_ROUTES],
    tx: [Option<Route>; MAX_ROUTES],
}

//==================================================================================Routing

impl RouteTable {
    pub const fn new() -> Self {
        Self {
            rx: [None; MAX_ROUTES],
            tx: [None; MAX_ROUTES],
        }
    }

    /// Register a channel's identifiers. A receiving channel listens for peer
    /// control frames, data, and direct frames; a transmitting channel
    /// listens only for peer control frames and claims the outbound
    /// identifiers for its own productions.
    pub fn insert_channel(
        &mut self,
        channel: ChannelId,
        cfg: &ChannelConfig,
    ) -> Result<(), ConfigError> {
        match cfg.direction {
            Direction::Rx => {
                Self::insert(&mut self.rx, cfg.control_rx_id, channel, FrameCategory::Control)?;
                Self::insert(&mut self.rx, cfg.data_id, channel, FrameCategory::Data)?;
                Self::insert(&mut self.rx, cfg.direct_id, channel, FrameCategory::Direct)?;
                Self::insert(&mut self.tx, cfg.control_tx_id, channel, FrameCategory::Control)?;
            }
            Direction::Tx => {
                Self::insert(&mut self.rx, cfg.control_rx_id, channel, FrameCategory::Control)?;
                Self::insert(&mut self.tx, cfg.control_tx_id, channel, FrameCategory::Control)?;
                Self::insert(&mut self.tx, cfg.data_id, channel, FrameCategory::Data)?;
                Self::insert(&mut self.tx, cfg.direct_id, channel, FrameCategory::Direct)?;
            }
        }
        Ok(())
    }

    fn insert(
        table: &mut [Option<Route>; MAX_ROUTES],
        id: FrameId,
        channel: ChannelId,
        category: FrameCategory,
    ) -> Result<(), ConfigError> {
        let mut free = None;
        for (index, slot) in table.iter().enumerate() {
            match slot {
                Some(route) if route.id == id => return Err(ConfigError::DuplicateRoute),
                None if free.is_none() => free = Some(index),
                _ => {}
            }
        }
        let index = free.ok_or(ConfigError::TooManyRoutes)?;
        table[index] = Some(Route {
            id,
            channel,
            category,
        });
        Ok(())
    }

    /// Resolve an inbound frame identifier.
    pub fn resolve_rx(&self, id: FrameId) -> Option<Route> {
        Self::lookup(&self.rx, id)
    }

    /// Resolve the identifier of a frame this stack transmitted, for
    /// confirmation delivery.
    pub fn resolve_tx(&self, id: FrameId) -> Option<Route> {
        Self::lookup(&self.tx, id)
    }

    fn lookup(table: &[Option<Route>; MAX_ROUTES], id: FrameId) -> Option<Route> {
        table.iter().flatten().find(|route| route.id == id).copied()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
