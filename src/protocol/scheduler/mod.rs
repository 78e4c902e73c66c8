//! The transport stack: a fixed set of configured channels behind one
//! synchronous surface. Frames, confirmations, requests, and the two ticks
//! come in; the stack routes each to the owning channel's engine and lets it
//! speak to the shared bus driver and payload collaborator.
use crate::config::{ChannelConfig, Direction, Reconfig};
use crate::error::{ConfigError, TransportError};
use crate::protocol::codec;
use crate::protocol::dispatch::RouteTable;
use crate::protocol::frame::{ChannelId, FrameCategory, FrameId};
use crate::protocol::rx::RxEngine;
use crate::protocol::traits::bus_driver::BusDriver;
use crate::protocol::traits::payload_buffer::PayloadBuffer;
use crate::protocol::tx::TxEngine;

//==================================================================================Enums and Structs

#[derive(Debug)]
/// Per-direction engine; a channel owns exactly one.
enum Engine {
    Tx(TxEngine),
    Rx(RxEngine),
}

#[derive(Debug)]
struct Channel {
    cfg: ChannelConfig,
    engine: Engine,
}

/// `N`-channel transport stack over a bus driver `B` and a payload
/// collaborator `P`. All methods are synchronous and non-blocking; time
/// enters only through the two tick entry points.
pub struct TransportStack<B: BusDriver, P: PayloadBuffer, const N: usize> {
    bus: B,
    buffers: P,
    channels: [Channel; N],
    routes: RouteTable,
}

//==================================================================================Stack

impl<B: BusDriver, P: PayloadBuffer, const N: usize> TransportStack<B, P, N> {
    /// Validate every channel entry, build the routing tables, and bring all
    /// engines up idle.
    pub fn new(bus: B, buffers: P, configs: [ChannelConfig; N]) -> Result<Self, ConfigError> {
        let mut routes = RouteTable::new();
        for (index, cfg) in configs.iter().enumerate() {
            cfg.validate()?;
            routes.insert_channel(ChannelId(index as u8), cfg)?;
        }
        let channels = core::array::from_fn(|index| {
            let cfg = configs[index].clone();
            let id = ChannelId(index as u8);
            let engine = match cfg.direction {
                Direction::Tx => Engine::Tx(TxEngine::new(id)),
                Direction::Rx => Engine::Rx(RxEngine::new(id)),
            };
            Channel { cfg, engine }
        });
        Ok(Self {
            bus,
            buffers,
            channels,
            routes,
        })
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut Channel, TransportError> {
        self.channels
            .get_mut(channel.index())
            .ok_or(TransportError::UnknownChannel)
    }

    //==================================================================================Requests

    /// Start an outbound transfer on a transmitting channel. The payload
    /// collaborator must already hold `total_len` bytes for the channel.
    pub fn transmit(&mut self, channel: ChannelId, total_len: u32) -> Result<(), TransportError> {
        let bus = &mut self.bus;
        let buffers = &mut self.buffers;
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(TransportError::UnknownChannel)?;
        match &mut ch.engine {
            Engine::Tx(tx) => tx.transmit(&ch.cfg, bus, buffers, total_len),
            Engine::Rx(_) => Err(TransportError::DirectionMismatch),
        }
    }

    /// True while the channel has no transfer in progress.
    pub fn is_idle(&self, channel: ChannelId) -> Result<bool, TransportError> {
        let ch = self
            .channels
            .get(channel.index())
            .ok_or(TransportError::UnknownChannel)?;
        Ok(match &ch.engine {
            Engine::Tx(tx) => tx.is_idle(),
            Engine::Rx(rx) => rx.is_idle(),
        })
    }

    /// Swap the adjustable part of an idle channel's configuration. Refused
    /// while a transfer is running.
    pub fn reconfigure(
        &mut self,
        channel: ChannelId,
        update: Reconfig,
    ) -> Result<(), ConfigError> {
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(ConfigError::UnknownChannel)?;
        let idle = match &ch.engine {
            Engine::Tx(tx) => tx.is_idle(),
            Engine::Rx(rx) => rx.is_idle(),
        };
        if !idle {
            return Err(ConfigError::ChannelActive);
        }
        let mut cfg = ch.cfg.clone();
        cfg.timing = update.timing;
        cfg.link_capacity = update.link_capacity;
        cfg.mode = update.mode;
        cfg.max_block = update.max_block;
        cfg.validate()?;
        ch.cfg = cfg;
        Ok(())
    }

    //==================================================================================Bus Events

    /// Inbound frame from the bus. Frames with unknown identifiers are not
    /// ours and are dropped; malformed frames on a routed identifier count as
    /// protocol violations against the owning channel.
    pub fn on_frame_received(&mut self, id: FrameId, bytes: &[u8]) {
        let Some(route) = self.routes.resolve_rx(id) else {
            return;
        };
        let bus = &mut self.bus;
        let buffers = &mut self.buffers;
        let Some(ch) = self.channels.get_mut(route.channel.index()) else {
            return;
        };
        let cfg = &ch.cfg;
        match route.category {
            FrameCategory::Control => match codec::decode_control(cfg, bytes) {
                Ok(frame) => match &mut ch.engine {
                    Engine::Tx(tx) => tx.on_control(cfg, bus, buffers, &frame),
                    Engine::Rx(rx) => rx.on_control(cfg, bus, buffers, &frame),
                },
                Err(_) => match &mut ch.engine {
                    Engine::Tx(tx) => tx.on_malformed(cfg, bus, buffers),
                    Engine::Rx(rx) => rx.on_malformed(cfg, bus, buffers),
                },
            },
            FrameCategory::Data => match codec::decode_data(cfg, bytes) {
                Ok(frame) => {
                    if let Engine::Rx(rx) = &mut ch.engine {
                        rx.on_data(cfg, bus, buffers, frame.seq, frame.chunk);
                    }
                }
                Err(_) => {
                    if let Engine::Rx(rx) = &mut ch.engine {
                        rx.on_malformed(cfg, bus, buffers);
                    }
                }
            },
            FrameCategory::Direct => {
                if let Engine::Rx(rx) = &mut ch.engine {
                    rx.on_direct(buffers, bytes);
                }
            }
        }
    }

    /// Transmit confirmation for a frame this stack handed to the bus,
    /// matched by its identifier.
    pub fn on_transmit_confirmation(&mut self, id: FrameId, ok: bool) {
        let Some(route) = self.routes.resolve_tx(id) else {
            return;
        };
        let bus = &mut self.bus;
        let buffers = &mut self.buffers;
        let Some(ch) = self.channels.get_mut(route.channel.index()) else {
            return;
        };
        match &mut ch.engine {
            Engine::Tx(tx) => tx.on_confirm(&ch.cfg, bus, buffers, ok),
            Engine::Rx(rx) => rx.on_confirm(&ch.cfg, bus, buffers, ok),
        }
    }

    //==================================================================================Ticks

    /// Timing tick for every channel: protocol timers and broadcast pacing.
    pub fn tick_timing(&mut self) {
        let bus = &mut self.bus;
        let buffers = &mut self.buffers;
        for ch in self.channels.iter_mut() {
            match &mut ch.engine {
                Engine::Tx(tx) => tx.tick_timing(&ch.cfg, bus, buffers),
                Engine::Rx(rx) => rx.tick_timing(&ch.cfg, bus, buffers),
            }
        }
    }

    /// Fast tick for every channel: rejected-handoff retries only.
    pub fn tick_fast(&mut self) {
        let bus = &mut self.bus;
        let buffers = &mut self.buffers;
        for ch in self.channels.iter_mut() {
            match &mut ch.engine {
                Engine::Tx(tx) => tx.tick_fast(&ch.cfg, bus, buffers),
                Engine::Rx(rx) => rx.tick_fast(&ch.cfg, bus, buffers),
            }
        }
    }

    //==================================================================================Accessors

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn buffers(&self) -> &P {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut P {
        &mut self.buffers
    }
}
