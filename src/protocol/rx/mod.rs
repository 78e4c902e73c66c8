//! Per-channel receive engine: reassembles inbound segmented transfers. On
//! flow-controlled channels it produces the clear-to-send grants that pace
//! the sender in blocks and closes the transfer with an end-of-message ack;
//! broadcast channels accept data at bus rate with no handshake at all.
use crate::config::{ChannelConfig, FramingVariant, TransferMode};
use crate::protocol::codec;
use crate::protocol::frame::{
    AbortReason, AssuranceType, ChannelId, ControlFrame, FrameBytes, FrameId,
};
use crate::protocol::traits::bus_driver::{BusDriver, SendVerdict};
use crate::protocol::traits::payload_buffer::PayloadBuffer;

//==================================================================================Enums and Structs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Closed set of receive states. `Send*` states mirror the transmit side:
/// they hold a frame of our own production (grant, ack, abort) that the
/// lower layer rejected, retried on the fast tick.
enum RxState {
    Idle,
    SendCts,
    WaitCtsConfirm,
    WaitData,
    SendEndAck,
    WaitEndAckConfirm,
    WaitEndStatus,
    SendAbort,
    WaitAbortConfirm,
}

#[derive(Debug)]
/// Receive half of a channel: reassembly progress plus what is needed to
/// rebuild the last grant or ack on a retry.
pub struct RxEngine {
    channel: ChannelId,
    state: RxState,
    total_size: u32,
    total_segments: u32,
    /// 1-based sequence number the next data frame must carry.
    expected_seq: u32,
    /// Segments left in the granted block. Broadcast reception has no block
    /// concept and leaves this saturated.
    block_remaining: u32,
    /// Sender's declared maximum segments per grant.
    peer_max_block: u8,
    /// Grant carried by the last clear-to-send, retained for resends.
    last_grant: u8,
    timer: u16,
    group_id: u32,
    /// Buffer space was reserved; exactly one `rx_complete` is owed.
    reserved: bool,
    abort_reason: AbortReason,
}

//==================================================================================Engine

impl RxEngine {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            state: RxState::Idle,
            total_size: 0,
            total_segments: 0,
            expected_seq: 0,
            block_remaining: 0,
            peer_max_block: 0,
            last_grant: 0,
            timer: 0,
            group_id: 0,
            reserved: false,
            abort_reason: AbortReason::Other(0),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, RxState::Idle)
    }

    fn is_running(&self) -> bool {
        !matches!(
            self.state,
            RxState::Idle | RxState::SendAbort | RxState::WaitAbortConfirm
        )
    }

    fn reset(&mut self) {
        self.state = RxState::Idle;
        self.total_size = 0;
        self.total_segments = 0;
        self.expected_seq = 0;
        self.block_remaining = 0;
        self.peer_max_block = 0;
        self.last_grant = 0;
        self.timer = 0;
        self.group_id = 0;
        self.reserved = false;
    }

    /// Next grant: bounded by the local block configuration, the sender's
    /// declared maximum, and the segments still missing.
    fn next_block_size(&self, cfg: &ChannelConfig) -> u8 {
        let remaining = self.total_segments - (self.expected_seq - 1);
        let bound = u32::from(cfg.max_block).min(u32::from(self.peer_max_block));
        bound.min(remaining) as u8
    }

    //==================================================================================Peer Control Frames

    /// Control frame routed to this channel. RTS and BAM open transfers from
    /// idle; EOMS closes an extended flow-controlled transfer; abort tears
    /// down whatever is running.
    pub fn on_control<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        frame: &ControlFrame,
    ) {
        match *frame {
            ControlFrame::Rts {
                total_size,
                segment_count,
                max_block,
                group_id,
            } => self.on_rts(cfg, bus, buf, total_size, segment_count, max_block, group_id),
            ControlFrame::Bam {
                total_size,
                segment_count,
                group_id,
            } => self.on_bam(cfg, buf, total_size, segment_count, group_id),
            ControlFrame::EndOfMsgStatus {
                total_size,
                segment_count,
                assurance,
                group_id,
            } => self.on_end_status(cfg, bus, buf, total_size, segment_count, assurance, group_id),
            ControlFrame::Abort { reason, group_id } => {
                if self.is_running() && group_id == self.group_id {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "rx ch{}: peer abort, reason {}",
                        self.channel.0,
                        reason.code()
                    );
                    let _ = reason;
                    self.fail_silent(buf);
                }
            }
            // CTS and end-of-message ack are frames this side produces.
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_rts<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        total_size: u32,
        segment_count: u32,
        max_block: u8,
        group_id: u32,
    ) {
        if cfg.mode != TransferMode::FlowControlled || !self.is_idle() {
            return;
        }
        if group_id != cfg.group_id {
            return;
        }
        // Cross-check the declared counts before the buffer collaborator is
        // ever consulted.
        if total_size == 0
            || max_block == 0
            || segment_count != codec::segment_count(cfg, total_size)
        {
            self.group_id = group_id;
            self.start_abort(cfg, bus, buf, AbortReason::InvalidParameter);
            return;
        }
        self.group_id = group_id;
        match buf.reserve_rx(self.channel, total_size as usize) {
            Err(_) => self.start_abort(cfg, bus, buf, AbortReason::MessageTooBig),
            Ok(capacity) if capacity < total_size as usize => {
                self.reserved = true;
                self.start_abort(cfg, bus, buf, AbortReason::MessageTooBig);
            }
            Ok(_) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("rx ch{}: rts, {} bytes", self.channel.0, total_size);
                self.reserved = true;
                self.total_size = total_size;
                self.total_segments = segment_count;
                self.expected_seq = 1;
                self.peer_max_block = max_block;
                self.begin_cts(cfg, bus);
            }
        }
    }

    fn on_bam<P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        buf: &mut P,
        total_size: u32,
        segment_count: u32,
        group_id: u32,
    ) {
        if cfg.mode != TransferMode::Broadcast || !self.is_idle() {
            return;
        }
        if group_id != cfg.group_id {
            return;
        }
        // Broadcast has no abort channel: every rejection is a silent drop.
        if total_size == 0 || segment_count != codec::segment_count(cfg, total_size) {
            return;
        }
        match buf.reserve_rx(self.channel, total_size as usize) {
            Err(_) => {}
            Ok(capacity) if capacity < total_size as usize => {
                // The reservation happened, so the completion is owed.
                buf.rx_complete(self.channel, false);
            }
            Ok(_) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("rx ch{}: bam, {} bytes", self.channel.0, total_size);
                self.reserved = true;
                self.group_id = group_id;
                self.total_size = total_size;
                self.total_segments = segment_count;
                self.expected_seq = 1;
                // No flow-control concept in broadcast mode: accept segments
                // at bus rate.
                self.block_remaining = u32::MAX;
                self.state = RxState::WaitData;
                self.timer = cfg.timing.t1;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_end_status<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        total_size: u32,
        segment_count: u32,
        assurance: AssuranceType,
        group_id: u32,
    ) {
        if !matches!(self.state, RxState::WaitEndStatus) || group_id != self.group_id {
            return;
        }
        if assurance != AssuranceType::None {
            // Unsupported assurance data is refused, not silently accepted.
            self.start_abort(cfg, bus, buf, AbortReason::AssuranceDataMismatch);
            return;
        }
        if total_size != self.total_size || segment_count != self.total_segments {
            self.start_abort(cfg, bus, buf, AbortReason::InvalidParameter);
            return;
        }
        buf.rx_complete(self.channel, true);
        self.reserved = false;
        self.begin_end_ack(cfg, bus);
    }

    //==================================================================================Data Frames

    /// Sequence-checked segment delivery. Accepted sequence numbers increase
    /// by exactly one; everything else tears the transfer down.
    pub fn on_data<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        seq: u32,
        chunk: &[u8],
    ) {
        if !matches!(self.state, RxState::WaitData) {
            return;
        }
        if seq != self.expected_seq {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "rx ch{}: sequence {} where {} expected",
                self.channel.0,
                seq,
                self.expected_seq
            );
            self.violation(cfg, bus, buf, AbortReason::BadSequenceNumber);
            return;
        }
        let seg_cap = codec::segment_capacity(cfg);
        let offset = (seq - 1) * seg_cap;
        let want = core::cmp::min(seg_cap, self.total_size - offset) as usize;
        if chunk.len() < want {
            self.violation(cfg, bus, buf, AbortReason::InvalidParameter);
            return;
        }
        if buf
            .copy_rx(self.channel, offset as usize, &chunk[..want])
            .is_err()
        {
            self.violation(cfg, bus, buf, AbortReason::ResourcesLacked);
            return;
        }
        self.expected_seq += 1;
        if self.expected_seq > self.total_segments {
            self.finalize(cfg, bus, buf);
            return;
        }
        match cfg.mode {
            TransferMode::FlowControlled => {
                self.block_remaining -= 1;
                if self.block_remaining == 0 {
                    self.begin_cts(cfg, bus);
                } else {
                    self.timer = cfg.timing.t1;
                }
            }
            TransferMode::Broadcast => self.timer = cfg.timing.t1,
        }
    }

    /// All declared segments arrived; the reconstructed byte count equals the
    /// declared total by construction of the per-segment arithmetic.
    fn finalize<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
        match (cfg.mode, cfg.framing) {
            (TransferMode::FlowControlled, FramingVariant::Extended) => {
                // Completion waits for the sender's end-of-message status.
                self.state = RxState::WaitEndStatus;
                self.timer = cfg.timing.t1;
            }
            (TransferMode::FlowControlled, FramingVariant::Legacy) => {
                buf.rx_complete(self.channel, true);
                self.reserved = false;
                self.begin_end_ack(cfg, bus);
            }
            (TransferMode::Broadcast, _) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("rx ch{}: broadcast complete", self.channel.0);
                buf.rx_complete(self.channel, true);
                self.reserved = false;
                self.reset();
            }
        }
    }

    //==================================================================================Direct Frames

    /// Unsegmented reception: reserve, copy, complete in one step. There is
    /// no session to abort, so every rejection is a silent drop.
    pub fn on_direct<P: PayloadBuffer>(&mut self, buf: &mut P, bytes: &[u8]) {
        if !self.is_idle() {
            return;
        }
        match buf.reserve_rx(self.channel, bytes.len()) {
            Err(_) => {}
            Ok(capacity) if capacity < bytes.len() => buf.rx_complete(self.channel, false),
            Ok(_) => {
                let ok = buf.copy_rx(self.channel, 0, bytes).is_ok();
                buf.rx_complete(self.channel, ok);
            }
        }
    }

    //==================================================================================Lower-Layer Events

    /// Confirmation for a grant, ack, or abort frame this side handed off.
    pub fn on_confirm<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        _bus: &mut B,
        _buf: &mut P,
        ok: bool,
    ) {
        if !ok {
            self.state = match self.state {
                RxState::WaitCtsConfirm => RxState::SendCts,
                RxState::WaitEndAckConfirm => RxState::SendEndAck,
                RxState::WaitAbortConfirm => RxState::SendAbort,
                other => other,
            };
            return;
        }
        match self.state {
            RxState::WaitCtsConfirm => {
                self.state = RxState::WaitData;
                self.timer = cfg.timing.t2;
            }
            RxState::WaitEndAckConfirm => self.reset(),
            RxState::WaitAbortConfirm => self.reset(),
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
        if self.is_running() {
            self.violation(cfg, bus, buf, AbortReason::InvalidParameter);
        }
    }

    //==================================================================================Ticks

    /// Timing tick. Flow-controlled waits that expire send a best-effort
    /// abort frame; broadcast and handoff waits reset silently, mirroring a
    /// sender that already gave up.
    pub fn tick_timing<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
    ) {
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
            RxState::WaitData | RxState::WaitEndStatus => {
                #[cfg(feature = "defmt")]
                defmt::warn!("rx ch{}: peer timeout", self.channel.0);
                if cfg.mode == TransferMode::FlowControlled {
                    self.start_abort(cfg, bus, buf, AbortReason::Timeout);
                } else {
                    self.fail_silent(buf);
                }
            }
            RxState::SendAbort | RxState::WaitAbortConfirm => self.reset(),
            _ => self.fail_silent(buf),
        }
    }

    /// Fast tick: retries a just-rejected frame handoff, nothing else.
    pub fn tick_fast<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        _buf: &mut P,
    ) {
        match self.state {
            RxState::SendCts => self.send_cts(cfg, bus),
            RxState::SendEndAck => self.send_end_ack(cfg, bus),
            RxState::SendAbort => self.send_abort_frame(cfg, bus),
            _ => {}
        }
    }

    //==================================================================================Frame Production

    fn offer<B: BusDriver>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        id: FrameId,
        frame: &FrameBytes,
        accepted: RxState,
        rejected: RxState,
    ) {
        match bus.transmit(id, frame.bytes()) {
            SendVerdict::Accepted => {
                self.state = accepted;
                self.timer = cfg.timing.retry;
            }
            SendVerdict::Rejected => self.state = rejected,
        }
    }

    /// Compute and offer the next grant.
    fn begin_cts<B: BusDriver>(&mut self, cfg: &ChannelConfig, bus: &mut B) {
        self.last_grant = self.next_block_size(cfg);
        self.block_remaining = u32::from(self.last_grant);
        self.timer = cfg.timing.retry;
        self.send_cts(cfg, bus);
    }

    fn send_cts<B: BusDriver>(&mut self, cfg: &ChannelConfig, bus: &mut B) {
        let frame = ControlFrame::Cts {
            granted: self.last_grant,
            next_seq: self.expected_seq,
            group_id: self.group_id,
        };
        match codec::encode_control(cfg, &frame) {
            Ok(f) => self.offer(
                cfg,
                bus,
                cfg.control_tx_id,
                &f,
                RxState::WaitCtsConfirm,
                RxState::SendCts,
            ),
            Err(_) => self.reset(),
        }
    }

    fn begin_end_ack<B: BusDriver>(&mut self, cfg: &ChannelConfig, bus: &mut B) {
        self.timer = cfg.timing.retry;
        self.send_end_ack(cfg, bus);
    }

    fn send_end_ack<B: BusDriver>(&mut self, cfg: &ChannelConfig, bus: &mut B) {
        let frame = ControlFrame::EndOfMsgAck {
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
                RxState::WaitEndAckConfirm,
                RxState::SendEndAck,
            ),
            Err(_) => self.reset(),
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
                RxState::WaitAbortConfirm,
                RxState::SendAbort,
            ),
            Err(_) => self.reset(),
        }
    }

    //==================================================================================Failure Paths

    /// Protocol violation during reception: report, and emit an abort frame
    /// on channels that have an abort channel to speak on.
    fn violation<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        reason: AbortReason,
    ) {
        match cfg.mode {
            TransferMode::FlowControlled => self.start_abort(cfg, bus, buf, reason),
            TransferMode::Broadcast => self.fail_silent(buf),
        }
    }

    /// Report the owed completion once, then push a best-effort abort frame.
    fn start_abort<B: BusDriver, P: PayloadBuffer>(
        &mut self,
        cfg: &ChannelConfig,
        bus: &mut B,
        buf: &mut P,
        reason: AbortReason,
    ) {
        #[cfg(feature = "defmt")]
        defmt::warn!("rx ch{}: abort, reason {}", self.channel.0, reason.code());
        if self.reserved {
            buf.rx_complete(self.channel, false);
            self.reserved = false;
        }
        self.abort_reason = reason;
        self.timer = cfg.timing.retry;
        self.send_abort_frame(cfg, bus);
    }

    /// Report the owed completion (if any) and reset without emitting
    /// anything.
    fn fail_silent<P: PayloadBuffer>(&mut self, buf: &mut P) {
        if self.reserved {
            buf.rx_complete(self.channel, false);
        }
        self.reset();
    }
}
