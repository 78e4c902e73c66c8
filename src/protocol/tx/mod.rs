//! Per-channel transmit engine: segments one outbound message into data
//! frames, driven by ticks, lower-layer confirmations, and peer control
//! frames. Broadcast transfers announce and stream at the configured minimum
//! spacing; flow-controlled transfers negotiate blocks with the receiver's
//! clear-to-send grants.
use crate::config::{ChannelConfig, FramingVariant, TransferMode};
use crate::error::TransportError;
use crate::protocol::codec;
use crate::protocol::frame::{
    AbortReason, AssuranceType, ChannelId, ControlFrame, FrameBytes, FrameId, MAX_LINK_CAPACITY,
};
use crate::protocol::traits::bus_driver::{BusDriver, SendVerdict};
use crate::protocol::traits::payload_buffer::PayloadBuffer;

//==================================================================================Enums and Structs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Closed set of transmit states. `Send*` states hold a frame the lower layer
/// rejected (or that failed transmission); the fast tick retries them.
/// `Wait*Confirm` states hold a frame the lower layer accepted but has not
/// confirmed yet.
enum TxState {
    Idle,
    SendDirect,
    WaitDirectConfirm,
    SendRts,
    WaitRtsConfirm,
    SendBam,
    WaitBamConfirm,
    WaitCts,
    /// Next data segment is due. `paced` means the broadcast minimum-spacing
    /// countdown is still running; otherwise the segment is ready to offer.
    SendData { paced: bool },
    WaitDataConfirm,
    WaitNextBlock,
    SendEndStatus,
    WaitEndStatusConfirm,
    WaitEndAck,
    SendAbort,
    WaitAbortConfirm,
}

#[derive(Debug)]
/// Transmit half of a channel: state plus the retained transfer context
/// needed to rebuild any in-flight frame on a retry.
pub struct TxEngine {
    channel: ChannelId,
    state: TxState,
    total_size: u32,
    total_segments: u32,
    /// 1-based sequence number of the next segment to send.
    next_seq: u32,
    /// Segments still granted in the current block (flow-controlled).
    block_remaining: u32,
    /// Active protocol timer, in timing ticks. Exactly one purpose per state.
    timer: u16,
    /// Broadcast minimum-spacing countdown.
    spacing: u16,
    group_id: u32,
    abort_reason: AbortReason,
}

//==================================================================================Engine

impl TxEngine {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            state: TxState::Idle,
            total_size: 0,
            total_segments: 0,
            next_seq: 0,
            block_remaining: 0,
            timer: 0,
            spacing: 0,
            group_id: 0,
            abort_reason: AbortReason::Other(0),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, TxState::Idle)
    }

    /// Active transfer that has not yet entered the abort handshake.
    fn is_running(&self) -> bool {
        !matches!(
            self.state,
            TxState::Idle | TxState::SendAbort | TxState::WaitAbortConfirm
        )
    }

    fn reset(&mut self) {
        self.state = TxState::Idle;
        self.total_size = 0;
        self.total_segments = 0;
        self.next_seq = 0;
        self.block_remaining = 0;
        self.timer = 0;
        self.spacing = 0;
        self.group_id = 0;
    }

    /// Terminal notification and return to idle. Called at most once per
    /// transfer; abort paths report before entering the abort handshake.
    fn complete<P: PayloadBuffer>(&mut self, buf: &mut P, ok: bool) {
        buf.tx_complete(self.channel, ok);
        self.reset();
    }

    //==================================================================================Requests

    /// Start a transfer. Only valid from idle; exactly one completion
    /// callback follows per accepted request. Messages that fit one frame go
    /// out as a direct frame; larger messages open a broadcast announce or a
    /// request-to-send handshake depending on the channel's mode.
    pub fn transmit<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        total_len: u32,
    ) -> Result<(), TransportError> {
        if !self.is_idle() {
            return Err(TransportError::Busy);
        }
        if total_len == 0 {
            return Err(TransportError::EmptyMessage);
        }
        #[cfg(feature = "defmt")]
        defmt::debug!("tx ch{}: transmit {} bytes", self.channel.0, total_len);
        if total_len <= u32::from(cfg.link_capacity) {
            self.total_size = total_len;
            self.timer = cfg.timing.retry;
            self.send_direct_frame(cfg, bus, buf);
            return Ok(());
        }
        if total_len > codec::max_message_size(cfg) {
            return Err(TransportError::MessageTooLarge);
        }
        self.total_size = total_len;
        self.total_segments = codec::segment_count(cfg, total_len);
        self.next_seq = 1;
        self.group_id = cfg.group_id;
        self.timer = cfg.timing.retry;
        match cfg.mode {
            TransferMode::FlowControlled => self.send_rts(cfg, bus, buf),
            TransferMode::Broadcast => self.send_bam(cfg, bus, buf),
        }
        Ok(())
    }

    //==================================================================================Lower-Layer Events

    /// Transmit confirmation for the frame this engine last handed off.
    /// A failed transmission behaves like a rejected handoff: the frame is
    /// rebuilt and retried on the next fast tick.
    pub fn on_confirm<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        ok: bool,
    ) {
        if !ok {
            self.state = match self.state {
                TxState::WaitDirectConfirm => TxState::SendDirect,
                TxState::WaitRtsConfirm => TxState::SendRts,
                TxState::WaitBamConfirm => TxState::SendBam,
                TxState::WaitDataConfirm => TxState::SendData { paced: false },
                TxState::WaitEndStatusConfirm => TxState::SendEndStatus,
                TxState::WaitAbortConfirm => TxState::SendAbort,
                other => other,
            };
            return;
        }
        match self.state {
            TxState::WaitDirectConfirm => self.complete(buf, true),
            TxState::WaitRtsConfirm => {
                self.state = TxState::WaitCts;
                self.timer = cfg.timing.t3;
            }
            TxState::WaitBamConfirm => self.schedule_next_data(cfg, bus, buf),
            TxState::WaitDataConfirm => {
                self.next_seq += 1;
                if self.next_seq > self.total_segments {
                    self.finish_data_phase(cfg, bus, buf);
                } else {
                    match cfg.mode {
                        TransferMode::FlowControlled => {
                            self.block_remaining = self.block_remaining.saturating_sub(1);
                            if self.block_remaining == 0 {
                                self.state = TxState::WaitNextBlock;
                                self.timer = cfg.timing.t3;
                            } else {
                                self.begin_data_attempt(cfg, bus, buf);
                            }
                        }
                        TransferMode::Broadcast => self.schedule_next_data(cfg, bus, buf),
                    }
                }
            }
            TxState::WaitEndStatusConfirm => {
                self.state = TxState::WaitEndAck;
                self.timer = cfg.timing.t3;
            }
            TxState::WaitAbortConfirm => self.reset(),
            // Stale confirmation; nothing in flight.
            _ => {}
        }
    }

    /// All data segments are confirmed; close the transfer according to the
    /// mode and framing variant.
    fn finish_data_phase<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        match (cfg.mode, cfg.framing) {
            (TransferMode::FlowControlled, FramingVariant::Extended) => {
                self.timer = cfg.timing.retry;
                self.send_end_status(cfg, bus, buf);
            }
            (TransferMode::FlowControlled, FramingVariant::Legacy) => {
                self.state = TxState::WaitEndAck;
                self.timer = cfg.timing.t3;
            }
            (TransferMode::Broadcast, _) => self.complete(buf, true),
        }
    }

    //==================================================================================Peer Control Frames

    /// Control frame routed to this channel. Only CTS, end-of-message ack,
    /// and abort are meaningful on the transmit side.
    pub fn on_control<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        frame: &ControlFrame,
    ) {
        match *frame {
            ControlFrame::Cts {
                granted,
                next_seq,
                group_id,
            } => self.on_cts(cfg, bus, buf, granted, next_seq, group_id),
            ControlFrame::EndOfMsgAck { group_id, .. } => {
                if matches!(self.state, TxState::WaitEndAck) && group_id == self.group_id {
                    self.complete(buf, true);
                }
            }
            ControlFrame::Abort { reason, group_id } => {
                if self.is_running() && group_id == self.group_id {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "tx ch{}: peer abort, reason {}",
                        self.channel.0,
                        reason.code()
                    );
                    let _ = reason;
                    self.complete(buf, false);
                }
            }
            // RTS/BAM/EOMS belong to the receive side of an identifier space.
            _ => {}
        }
    }

    fn on_cts<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        granted: u8,
        next_seq: u32,
        group_id: u32,
    ) {
        match self.state {
            TxState::WaitCts | TxState::WaitNextBlock => {
                // A grant for another group is not ours: state and timer stay
                // untouched so the real grant can still arrive.
                if group_id != self.group_id {
                    return;
                }
                if granted == 0 {
                    // Hold: the receiver is not ready, keep waiting on T4.
                    self.timer = cfg.timing.t4;
                    return;
                }
                if next_seq == self.next_seq {
                    self.block_remaining = u32::from(granted);
                    self.begin_data_attempt(cfg, bus, buf);
                } else {
                    self.start_abort(cfg, bus, buf, AbortReason::BadSequenceNumber);
                }
            }
            TxState::WaitEndAck => {
                if group_id != self.group_id {
                    return;
                }
                if cfg.framing == FramingVariant::Extended {
                    // Receiver asks for a re-delivery of the end-of-message
                    // status.
                    self.timer = cfg.timing.retry;
                    self.send_end_status(cfg, bus, buf);
                } else {
                    self.start_abort(cfg, bus, buf, AbortReason::BadSequenceNumber);
                }
            }
            _ => {}
        }
    }

    /// Malformed frame routed to this channel while a transfer is running.
    pub fn on_malformed<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        if !self.is_running() {
            return;
        }
        match cfg.mode {
            TransferMode::FlowControlled => {
                self.start_abort(cfg, bus, buf, AbortReason::InvalidParameter)
            }
            TransferMode::Broadcast => self.fail(buf),
        }
    }

    //==================================================================================Ticks

    /// Timing tick: advances the minimum-spacing countdown and the active
    /// protocol timer. Peer-response timeouts send a best-effort abort frame;
    /// local confirmation timeouts reset directly, since the bus itself is
    /// the suspected fault.
    pub fn tick_timing<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        if let TxState::SendData { paced: true } = self.state {
            if self.spacing > 0 {
                self.spacing -= 1;
            }
            if self.spacing == 0 {
                self.begin_data_attempt(cfg, bus, buf);
            }
            return;
        }
        if self.is_idle() {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer > 0 {
            return;
        }
        match self.state {
            TxState::WaitCts | TxState::WaitNextBlock | TxState::WaitEndAck => {
                #[cfg(feature = "defmt")]
                defmt::warn!("tx ch{}: peer response timeout", self.channel.0);
                self.start_abort(cfg, bus, buf, AbortReason::Timeout);
            }
            TxState::SendAbort | TxState::WaitAbortConfirm => self.reset(),
            _ => {
                #[cfg(feature = "defmt")]
                defmt::warn!("tx ch{}: local confirmation timeout", self.channel.0);
                self.fail(buf);
            }
        }
    }

    /// Fast tick: retries a frame handoff the lower layer just rejected.
    /// Touches no other state.
    pub fn tick_fast<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        match self.state {
            TxState::SendDirect => self.send_direct_frame(cfg, bus, buf),
            TxState::SendRts => self.send_rts(cfg, bus, buf),
            TxState::SendBam => self.send_bam(cfg, bus, buf),
            TxState::SendData { paced: false } => self.send_data_segment(cfg, bus, buf),
            TxState::SendEndStatus => self.send_end_status(cfg, bus, buf),
            TxState::SendAbort => self.send_abort_frame(cfg, bus),
            _ => {}
        }
    }

    //==================================================================================Frame Production

    /// Offer an encoded frame to the lower layer. Acceptance arms the local
    /// confirmation bound; rejection parks the engine in `rejected` for the
    /// fast tick, with the already-running retry timer as the overall bound.
    fn offer<B: BusDriver>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        id: FrameId,
        frame: &FrameBytes,
        accepted: TxState,
        rejected: TxState,
    ) {
        match bus.transmit(id, frame.bytes()) {
            SendVerdict::Accepted => {
                self.state = accepted;
                self.timer = cfg.timing.retry;
            }
            SendVerdict::Rejected => self.state = rejected,
        }
    }

    fn send_direct_frame<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        let len = self.total_size as usize;
        let mut payload = [0u8; MAX_LINK_CAPACITY];
        let chunk = buf.copy_tx(self.channel, 0, &mut payload[..len]);
        if chunk.copied != len {
            self.fail(buf);
            return;
        }
        match codec::encode_direct(cfg, &payload[..len]) {
            Ok(frame) => self.offer(
                cfg,
                bus,
                cfg.direct_id,
                &frame,
                TxState::WaitDirectConfirm,
                TxState::SendDirect,
            ),
            Err(_) => self.fail(buf),
        }
    }

    fn send_rts<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        let frame = ControlFrame::Rts {
            total_size: self.total_size,
            segment_count: self.total_segments,
            max_block: cfg.max_block,
            group_id: self.group_id,
        };
        match codec::encode_control(cfg, &frame) {
            Ok(f) => self.offer(
                cfg,
                bus,
                cfg.control_tx_id,
                &f,
                TxState::WaitRtsConfirm,
                TxState::SendRts,
            ),
            Err(_) => self.fail(buf),
        }
    }

    fn send_bam<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        let frame = ControlFrame::Bam {
            total_size: self.total_size,
            segment_count: self.total_segments,
            group_id: self.group_id,
        };
        match codec::encode_control(cfg, &frame) {
            Ok(f) => self.offer(
                cfg,
                bus,
                cfg.control_tx_id,
                &f,
                TxState::WaitBamConfirm,
                TxState::SendBam,
            ),
            Err(_) => self.fail(buf),
        }
    }

    fn send_end_status<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        let frame = ControlFrame::EndOfMsgStatus {
            total_size: self.total_size,
            segment_count: self.total_segments,
            assurance: AssuranceType::None,
            group_id: self.group_id,
        };
        match codec::encode_control(cfg, &frame) {
            Ok(f) => self.offer(
                cfg,
                bus,
                cfg.control_tx_id,
                &f,
                TxState::WaitEndStatusConfirm,
                TxState::SendEndStatus,
            ),
            Err(_) => self.fail(buf),
        }
    }

    fn send_abort_frame<B: BusDriver>(&mut self, cfg: &ChannelConfig, bus: &mut B) {
        let frame = ControlFrame::Abort {
            reason: self.abort_reason,
            group_id: self.group_id,
        };
        match codec::encode_control(cfg, &frame) {
            Ok(f) => self.offer(
                cfg,
                bus,
                cfg.control_tx_id,
                &f,
                TxState::WaitAbortConfirm,
                TxState::SendAbort,
            ),
            // The failure was already reported; nothing left to salvage.
            Err(_) => self.reset(),
        }
    }

    /// Arm the retry bound and offer the next data segment.
    fn begin_data_attempt<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        self.timer = cfg.timing.retry;
        self.send_data_segment(cfg, bus, buf);
    }

    /// Broadcast pacing: wait out the minimum spacing before the next
    /// segment. Flow-controlled channels are paced by grants instead.
    fn schedule_next_data<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        if cfg.mode == TransferMode::Broadcast && cfg.timing.min_spacing > 0 {
            self.state = TxState::SendData { paced: true };
            self.spacing = cfg.timing.min_spacing;
            self.timer = 0;
        } else {
            self.begin_data_attempt(cfg, bus, buf);
        }
    }

    fn send_data_segment<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        let seg_cap = codec::segment_capacity(cfg);
        let offset = (self.next_seq - 1) * seg_cap;
        let want = core::cmp::min(seg_cap, self.total_size - offset) as usize;
        let mut chunk = [0u8; MAX_LINK_CAPACITY];
        let pulled = buf.copy_tx(self.channel, offset as usize, &mut chunk[..want]);
        if pulled.copied != want {
            self.fail(buf);
            return;
        }
        match codec::encode_data(cfg, self.next_seq, &chunk[..want]) {
            Ok(frame) => self.offer(
                cfg,
                bus,
                cfg.data_id,
                &frame,
                TxState::WaitDataConfirm,
                TxState::SendData { paced: false },
            ),
            Err(_) => self.fail(buf),
        }
    }

    //==================================================================================Failure Paths

    /// Report the failure once, then push a best-effort abort frame to the
    /// peer. The abort handshake itself no longer reports.
    fn start_abort<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        reason: AbortReason,
    ) {
        #[cfg(feature = "defmt")]
        defmt::warn!("tx ch{}: abort, reason {}", self.channel.0, reason.code());
        buf.tx_complete(self.channel, false);
        self.abort_reason = reason;
        self.timer = cfg.timing.retry;
        self.send_abort_frame(cfg, bus);
    }

    /// Local failure: report and reset without emitting anything.
    fn fail<P: PayloadBuffer>(&mut self, buf: &mut P) {
        buf.tx_complete(self.channel, false);
        self.reset();
    }
}
