//! Upper-layer buffer collaborator: the component owning message payloads.
//! The engines never store application bytes themselves; they pull transmit
//! chunks and push receive chunks through this trait, and signal exactly one
//! completion per transfer.
use crate::protocol::frame::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The collaborator declined a reservation or a chunk copy.
pub struct BufferRejected;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a transmit-side chunk request.
pub struct TxChunk {
    /// Bytes actually written into the destination slice.
    pub copied: usize,
    /// Bytes still available after this chunk.
    pub remaining: usize,
}

/// Contract with the component that owns message payloads.
pub trait PayloadBuffer {
    /// Reserve reassembly space for an announced message. Returns the
    /// capacity actually available; a capacity below the declared total is a
    /// rejection on the caller's side.
    fn reserve_rx(&mut self, channel: ChannelId, total_len: usize)
        -> Result<usize, BufferRejected>;

    /// Deliver one received chunk at the given message offset.
    fn copy_rx(&mut self, channel: ChannelId, offset: usize, chunk: &[u8])
        -> Result<(), BufferRejected>;

    /// Terminal receive notification, exactly once per reserved transfer.
    fn rx_complete(&mut self, channel: ChannelId, ok: bool);

    /// Fill `dest` with message bytes starting at `offset`.
    fn copy_tx(&mut self, channel: ChannelId, offset: usize, dest: &mut [u8]) -> TxChunk;

    /// Terminal transmit notification, exactly once per accepted request.
    fn tx_complete(&mut self, channel: ChannelId, ok: bool);
}
