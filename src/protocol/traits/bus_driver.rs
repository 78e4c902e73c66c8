//! Minimal abstraction for the lower-layer frame driver. The handoff is
//! required to be non-blocking: the driver answers accept/reject immediately
//! and reports the transmission outcome later through the stack's
//! confirmation entry point.
use crate::protocol::frame::FrameId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Immediate answer to a frame handoff.
pub enum SendVerdict {
    /// Frame queued; a confirmation will follow.
    Accepted,
    /// Driver momentarily busy. The engines retry on the next fast tick;
    /// a single rejection never aborts a transfer.
    Rejected,
}

/// Contract to hand frames to the bus scheduler.
pub trait BusDriver {
    /// Offer one frame for transmission. Must not block.
    fn transmit(&mut self, id: FrameId, bytes: &[u8]) -> SendVerdict;
}
