//! Scripted collaborators for state-machine unit tests: a recording bus
//! driver with programmable rejections and a fixed-buffer payload
//! collaborator that counts completion callbacks.
use crate::protocol::frame::{ChannelId, FrameId, MAX_LINK_CAPACITY};
use crate::protocol::traits::bus_driver::{BusDriver, SendVerdict};
use crate::protocol::traits::payload_buffer::{BufferRejected, PayloadBuffer, TxChunk};

pub const MAX_RECORDED: usize = 64;
pub const MOCK_BUFFER_LEN: usize = 2048;

#[derive(Debug, Clone, Copy)]
pub struct SentFrame {
    pub id: FrameId,
    pub data: [u8; MAX_LINK_CAPACITY],
    pub len: usize,
}

impl SentFrame {
    const EMPTY: Self = Self {
        id: FrameId(0),
        data: [0; MAX_LINK_CAPACITY],
        len: 0,
    };

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Recording bus driver. Rejects the next `reject_next` offers, then accepts
/// and records everything.
pub struct MockBus {
    frames: [SentFrame; MAX_RECORDED],
    pub count: usize,
    pub reject_next: usize,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            frames: [SentFrame::EMPTY; MAX_RECORDED],
            count: 0,
            reject_next: 0,
        }
    }

    pub fn sent(&self, index: usize) -> &SentFrame {
        assert!(index < self.count, "no frame recorded at index {index}");
        &self.frames[index]
    }

    pub fn last(&self) -> &SentFrame {
        assert!(self.count > 0, "no frame recorded");
        &self.frames[self.count - 1]
    }
}

impl BusDriver for MockBus {
    fn transmit(&mut self, id: FrameId, bytes: &[u8]) -> SendVerdict {
        if self.reject_next > 0 {
            self.reject_next -= 1;
            return SendVerdict::Rejected;
        }
        let mut frame = SentFrame::EMPTY;
        frame.id = id;
        frame.len = bytes.len();
        frame.data[..bytes.len()].copy_from_slice(bytes);
        self.frames[self.count] = frame;
        self.count += 1;
        SendVerdict::Accepted
    }
}

/// Payload collaborator backed by fixed buffers. Counts terminal callbacks so
/// tests can assert the exactly-once property.
pub struct MockBuffer {
    tx_data: [u8; MOCK_BUFFER_LEN],
    tx_len: usize,
    rx_data: [u8; MOCK_BUFFER_LEN],
    rx_high_water: usize,
    /// Capacity answered by `reserve_rx`.
    pub rx_capacity: usize,
    pub reject_reserve: bool,
    pub reserved_total: Option<usize>,
    pub tx_result: Option<bool>,
    pub rx_result: Option<bool>,
    pub tx_completions: usize,
    pub rx_completions: usize,
}

impl MockBuffer {
    pub fn new() -> Self {
        Self {
            tx_data: [0; MOCK_BUFFER_LEN],
            tx_len: 0,
            rx_data: [0; MOCK_BUFFER_LEN],
            rx_high_water: 0,
            rx_capacity: MOCK_BUFFER_LEN,
            reject_reserve: false,
            reserved_total: None,
            tx_result: None,
            rx_result: None,
            tx_completions: 0,
            rx_completions: 0,
        }
    }

    /// Collaborator loaded with an outbound message.
    pub fn with_message(message: &[u8]) -> Self {
        let mut mock = Self::new();
        mock.load_message(message);
        mock
    }

    /// Stage an outbound message after construction.
    pub fn load_message(&mut self, message: &[u8]) {
        self.tx_data[..message.len()].copy_from_slice(message);
        self.tx_len = message.len();
    }

    /// Bytes delivered so far on the receive side.
    pub fn received(&self) -> &[u8] {
        &self.rx_data[..self.rx_high_water]
    }
}

impl PayloadBuffer for MockBuffer {
    fn reserve_rx(
        &mut self,
        _channel: ChannelId,
        total_len: usize,
    ) -> Result<usize, BufferRejected> {
        if self.reject_reserve {
            return Err(BufferRejected);
        }
        self.reserved_total = Some(total_len);
        Ok(self.rx_capacity)
    }

    fn copy_rx(
        &mut self,
        _channel: ChannelId,
        offset: usize,
        chunk: &[u8],
    ) -> Result<(), BufferRejected> {
        let end = offset + chunk.len();
        if end > self.rx_data.len() {
            return Err(BufferRejected);
        }
        self.rx_data[offset..end].copy_from_slice(chunk);
        self.rx_high_water = self.rx_high_water.max(end);
        Ok(())
    }

    fn rx_complete(&mut self, _channel: ChannelId, ok: bool) {
        self.rx_result = Some(ok);
        self.rx_completions += 1;
    }

    fn copy_tx(&mut self, _channel: ChannelId, offset: usize, dest: &mut [u8]) -> TxChunk {
        let available = self.tx_len.saturating_sub(offset);
        let copied = dest.len().min(available);
        dest[..copied].copy_from_slice(&self.tx_data[offset..offset + copied]);
        TxChunk {
            copied,
            remaining: available - copied,
        }
    }

    fn tx_complete(&mut self, _channel: ChannelId, ok: bool) {
        self.tx_result = Some(ok);
        self.tx_completions += 1;
    }
}
