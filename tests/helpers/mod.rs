//! Shared harness for integration scenarios: two transport stacks wired as
//! nodes on a simulated bus, with Vec-backed bus and payload collaborators
//! built on the public traits only.

use korri_j1939tp::config::{ChannelConfig, Direction, FramingVariant, Timing, TransferMode};
use korri_j1939tp::protocol::frame::{ChannelId, FrameId};
use korri_j1939tp::protocol::scheduler::TransportStack;
use korri_j1939tp::protocol::traits::bus_driver::{BusDriver, SendVerdict};
use korri_j1939tp::protocol::traits::payload_buffer::{BufferRejected, PayloadBuffer, TxChunk};

pub const GROUP: u32 = 0x00_77_01;

/// Recording bus: every accepted frame stays visible for the pump.
#[derive(Default)]
pub struct SimBus {
    pub sent: Vec<(FrameId, Vec<u8>)>,
}

impl BusDriver for SimBus {
    fn transmit(&mut self, id: FrameId, bytes: &[u8]) -> SendVerdict {
        self.sent.push((id, bytes.to_vec()));
        SendVerdict::Accepted
    }
}

/// Vec-backed payload collaborator for one channel.
#[derive(Default)]
pub struct SimBuffer {
    tx: Vec<u8>,
    rx: Vec<u8>,
    pub tx_result: Option<bool>,
    pub rx_result: Option<bool>,
}

impl SimBuffer {
    pub fn with_message(message: &[u8]) -> Self {
        Self {
            tx: message.to_vec(),
            ..Self::default()
        }
    }

    pub fn received(&self) -> &[u8] {
        &self.rx
    }
}

impl PayloadBuffer for SimBuffer {
    fn reserve_rx(&mut self, _channel: ChannelId, total_len: usize) -> Result<usize, BufferRejected> {
        self.rx.clear();
        self.rx.resize(total_len, 0);
        Ok(total_len)
    }

    fn copy_rx(
        &mut self,
        _channel: ChannelId,
        offset: usize,
        chunk: &[u8],
    ) -> Result<(), BufferRejected> {
        let end = offset + chunk.len();
        if end > self.rx.len() {
            return Err(BufferRejected);
        }
        self.rx[offset..end].copy_from_slice(chunk);
        Ok(())
    }

    fn rx_complete(&mut self, _channel: ChannelId, ok: bool) {
        self.rx_result = Some(ok);
        if !ok {
            self.rx.clear();
        }
    }

    fn copy_tx(&mut self, _channel: ChannelId, offset: usize, dest: &mut [u8]) -> TxChunk {
        let available = self.tx.len().saturating_sub(offset);
        let copied = dest.len().min(available);
        dest[..copied].copy_from_slice(&self.tx[offset..offset + copied]);
        TxChunk {
            copied,
            remaining: available - copied,
        }
    }

    fn tx_complete(&mut self, _channel: ChannelId, ok: bool) {
        self.tx_result = Some(ok);
    }
}

/// One simulated node: a single-channel stack plus the pump cursor tracking
/// which of its frames already left the wire.
pub struct Node {
    pub stack: TransportStack<SimBus, SimBuffer, 1>,
    cursor: usize,
}

impl Node {
    pub fn new(cfg: ChannelConfig, message: &[u8]) -> Self {
        let buffer = if message.is_empty() {
            SimBuffer::default()
        } else {
            SimBuffer::with_message(message)
        };
        Self {
            stack: TransportStack::new(SimBus::default(), buffer, [cfg]).unwrap(),
            cursor: 0,
        }
    }
}

/// Timing chosen so scenario timeouts stay affordable to step through.
pub fn timing() -> Timing {
    Timing {
        retry: 4,
        t1: 15,
        t2: 25,
        t3: 25,
        t4: 21,
        min_spacing: 2,
    }
}

pub fn sender_cfg(mode: TransferMode, framing: FramingVariant) -> ChannelConfig {
    let link_capacity = match framing {
        FramingVariant::Legacy => 8,
        FramingVariant::Extended => 64,
    };
    ChannelConfig {
        direction: Direction::Tx,
        mode,
        framing,
        link_capacity,
        session: 2,
        pad_byte: 0xFF,
        max_block: 8,
        group_id: GROUP,
        timing: timing(),
        control_tx_id: FrameId(0xEC00),
        control_rx_id: FrameId(0xEC01),
        data_id: FrameId(0xEB00),
        direct_id: FrameId(0xFE00),
    }
}

pub fn receiver_cfg(mode: TransferMode, framing: FramingVariant) -> ChannelConfig {
    let mut cfg = sender_cfg(mode, framing);
    cfg.direction = Direction::Rx;
    cfg.control_tx_id = FrameId(0xEC01);
    cfg.control_rx_id = FrameId(0xEC00);
    cfg
}

/// Move one node's pending frames onto the wire: confirm locally, deliver
/// remotely. Returns how many frames moved.
pub fn pump_one(from: &mut Node, to: &mut Node) -> usize {
    let mut moved = 0;
    while from.cursor < from.stack.bus().sent.len() {
        let (id, bytes) = from.stack.bus().sent[from.cursor].clone();
        from.cursor += 1;
        from.stack.on_transmit_confirmation(id, true);
        to.stack.on_frame_received(id, &bytes);
        moved += 1;
    }
    moved
}

/// Like [`pump_one`], but frames matching `drop` are confirmed locally and
/// lost on the wire.
pub fn pump_one_lossy(from: &mut Node, to: &mut Node, drop: impl Fn(FrameId) -> bool) -> usize {
    let mut moved = 0;
    while from.cursor < from.stack.bus().sent.len() {
        let (id, bytes) = from.stack.bus().sent[from.cursor].clone();
        from.cursor += 1;
        from.stack.on_transmit_confirmation(id, true);
        if !drop(id) {
            to.stack.on_frame_received(id, &bytes);
        }
        moved += 1;
    }
    moved
}

/// Exchange frames in both directions until the wire is quiet.
pub fn exchange(a: &mut Node, b: &mut Node) {
    loop {
        if pump_one(a, b) + pump_one(b, a) == 0 {
            break;
        }
    }
}

/// One timing tick on both nodes.
pub fn tick(a: &mut Node, b: &mut Node) {
    a.stack.tick_timing();
    b.stack.tick_timing();
}
