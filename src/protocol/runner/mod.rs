//! Async runner for firmwares that drive the stack from an executor.
//!
//! The stack itself is synchronous; this module supplies the event loop
//! around it: one pre-allocated [`embassy_sync::channel::Channel`] acts as
//! the mailbox for bus frames, transmit confirmations, and application
//! requests, and an [`embassy_time::Ticker`] provides the two tick cadences.
//! Firmware allocates the mailbox statically and keeps a [`TransportHandle`]
//! for the producing side. No allocation is performed by the library and
//! there is no dependency on a particular BSP.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Sender},
};
use embassy_time::{Duration, Ticker};
use futures_util::{future::select, future::Either, pin_mut};

use crate::protocol::frame::{ChannelId, FrameId, MAX_LINK_CAPACITY};
use crate::protocol::scheduler::TransportStack;
use crate::protocol::traits::bus_driver::BusDriver;
use crate::protocol::traits::payload_buffer::PayloadBuffer;

//==================================================================================Enums and Structs

#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One mailbox entry for the runner loop.
pub enum TransportEvent {
    /// Frame received from the bus.
    Frame {
        id: FrameId,
        data: [u8; MAX_LINK_CAPACITY],
        len: usize,
    },
    /// Transmit confirmation from the bus driver.
    Confirmation { id: FrameId, ok: bool },
    /// Application request to start an outbound transfer.
    Transmit { channel: ChannelId, total_len: u32 },
}

/// Service assembling the runner components around a built stack.
pub struct TransportService<'a, B, P, const N: usize, const CAP: usize>
where
    B: BusDriver,
    P: PayloadBuffer,
{
    stack: TransportStack<B, P, N>,
    events: &'a Channel<CriticalSectionRawMutex, TransportEvent, CAP>,
}

/// Bundle returned by [`TransportService::into_parts`].
pub struct TransportServiceParts<'a, B, P, const N: usize, const CAP: usize>
where
    B: BusDriver,
    P: PayloadBuffer,
{
    pub handle: TransportHandle<'a, CAP>,
    pub runner: TransportRunner<'a, B, P, N, CAP>,
}

/// Producing side of the mailbox, for bus interrupt handlers and
/// application tasks.
#[derive(Clone)]
pub struct TransportHandle<'a, const CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, TransportEvent, CAP>,
}

/// Runner that owns the stack and drives it from the mailbox and the ticker.
pub struct TransportRunner<'a, B, P, const N: usize, const CAP: usize>
where
    B: BusDriver,
    P: PayloadBuffer,
{
    stack: TransportStack<B, P, N>,
    events: &'a Channel<CriticalSectionRawMutex, TransportEvent, CAP>,
    /// Fast-tick period; the timing tick fires every `timing_divisor`
    /// fast ticks.
    fast_period: Duration,
    timing_divisor: u32,
}

//==================================================================================Service

impl<'a, B, P, const N: usize, const CAP: usize> TransportService<'a, B, P, N, CAP>
where
    B: BusDriver,
    P: PayloadBuffer,
{
    /// Wrap an already-built [`TransportStack`].
    pub fn new(
        stack: TransportStack<B, P, N>,
        events: &'a Channel<CriticalSectionRawMutex, TransportEvent, CAP>,
    ) -> Self {
        Self { stack, events }
    }

    /// Split into handle/runner components. `fast_period` is the rejected-
    /// handoff retry cadence; the protocol timing tick runs every
    /// `timing_divisor` fast periods.
    pub fn into_parts(
        self,
        fast_period: Duration,
        timing_divisor: u32,
    ) -> TransportServiceParts<'a, B, P, N, CAP> {
        TransportServiceParts {
            handle: TransportHandle {
                sender: self.events.sender(),
            },
            runner: TransportRunner {
                stack: self.stack,
                events: self.events,
                fast_period,
                timing_divisor: timing_divisor.max(1),
            },
        }
    }
}

//==================================================================================Handle

impl<'a, const CAP: usize> TransportHandle<'a, CAP> {
    /// Queue an inbound bus frame. Oversized frames are dropped at the edge.
    pub async fn frame_received(&self, id: FrameId, bytes: &[u8]) {
        if bytes.len() > MAX_LINK_CAPACITY {
            return;
        }
        let mut data = [0u8; MAX_LINK_CAPACITY];
        data[..bytes.len()].copy_from_slice(bytes);
        self.sender
            .send(TransportEvent::Frame {
                id,
                data,
                len: bytes.len(),
            })
            .await;
    }

    /// Queue a transmit confirmation from the bus driver.
    pub async fn confirmation(&self, id: FrameId, ok: bool) {
        self.sender.send(TransportEvent::Confirmation { id, ok }).await;
    }

    /// Queue an outbound transfer request. Validation happens in the runner;
    /// a refused request surfaces through the payload collaborator, not here.
    pub async fn transmit(&self, channel: ChannelId, total_len: u32) {
        self.sender
            .send(TransportEvent::Transmit { channel, total_len })
            .await;
    }
}

//==================================================================================Runner

impl<'a, B, P, const N: usize, const CAP: usize> TransportRunner<'a, B, P, N, CAP>
where
    B: BusDriver,
    P: PayloadBuffer,
{
    /// Drive the stack forever: mailbox events as they arrive, ticks on the
    /// configured cadence.
    pub async fn drive(mut self) -> ! {
        let mut ticker = Ticker::every(self.fast_period);
        let mut fast_count = 0u32;

        loop {
            let event = {
                let event_future = self.events.receive();
                let tick_future = ticker.next();
                pin_mut!(event_future);
                pin_mut!(tick_future);

                match select(event_future, tick_future).await {
                    Either::Left((event, pending_tick)) => {
                        drop(pending_tick);
                        Some(event)
                    }
                    Either::Right(((), pending_event)) => {
                        drop(pending_event);
                        None
                    }
                }
            };

            match event {
                Some(event) => self.handle_event(event),
                None => {
                    self.stack.tick_fast();
                    fast_count += 1;
                    if fast_count >= self.timing_divisor {
                        fast_count = 0;
                        self.stack.tick_timing();
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame { id, data, len } => {
                self.stack.on_frame_received(id, &data[..len]);
            }
            TransportEvent::Confirmation { id, ok } => {
                self.stack.on_transmit_confirmation(id, ok);
            }
            TransportEvent::Transmit { channel, total_len } => {
                if let Err(_err) = self.stack.transmit(channel, total_len) {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("transmit request refused on ch{}: {}", channel.0, _err);
                }
            }
        }
    }
}
