//! Message reassembler and channel table: binds packets to per-channel
//! in-flight messages, enforces ordering, and serializes outbound messages
//! back into packet streams.
//!
//! The channel table is owned and mutated only by the engine's single
//! synchronous task — no locking, per the concurrency design.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, ByteOrder};
use rand::RngExt;

use super::constants::{
    CID_BROADCAST, CID_RESERVED, CONT_DATA_CAP, INIT_DATA_CAP, REPORT_LEN, TRANSACTION_TIMEOUT_MS,
};
use super::message::{self, Message};
use super::packet::{self, Packet};
use crate::error::HidErrorCode;

const U2FHID_INIT_CMD: u8 = super::constants::HidCommand::Init as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Receiving,
    Processing,
}

struct InFlight {
    cmd: u8,
    bcnt: usize,
    buffer: Vec<u8>,
    next_seq: u8,
}

struct Channel {
    state: ChannelState,
    in_flight: Option<InFlight>,
    last_activity: Instant,
}

impl Channel {
    fn idle(now: Instant) -> Self {
        Channel {
            state: ChannelState::Idle,
            in_flight: None,
            last_activity: now,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum IngestResult {
    /// More continuation packets are expected; nothing to dispatch yet.
    Pending,
    /// A full message has been reassembled and is ready for dispatch.
    Complete(Message),
    /// A HID-level protocol error must be reported on the given CID.
    Error(u32, HidErrorCode),
}

pub struct ChannelTable {
    channels: HashMap<u32, Channel>,
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTable {
    pub fn new() -> Self {
        ChannelTable {
            channels: HashMap::new(),
        }
    }

    /// Allocates a fresh, non-reserved, currently-unused CID and registers
    /// an idle channel entry for it.
    pub fn allocate_channel(&mut self) -> u32 {
        loop {
            let mut buf = [0u8; 4];
            rand::rng().fill(&mut buf);
            let cid = BigEndian::read_u32(&buf);
            if cid == CID_BROADCAST || cid == CID_RESERVED || self.channels.contains_key(&cid) {
                continue;
            }
            self.channels.insert(cid, Channel::idle(Instant::now()));
            return cid;
        }
    }

    fn any_other_channel_busy(&self, cid: u32) -> bool {
        self.channels
            .iter()
            .any(|(&c, ch)| c != cid && ch.state != ChannelState::Idle)
    }

    /// Decodes one raw report and drives the per-channel state machine.
    /// Transport-level decode failures (wrong report length) propagate as
    /// an `Err` — everything else is folded into [`IngestResult`].
    pub fn ingest(&mut self, report: &[u8; REPORT_LEN]) -> crate::error::Result<IngestResult> {
        let packet = packet::decode(report)?;
        let now = Instant::now();
        Ok(match packet {
            Packet::Init { cid, cmd, bcnt, data } => self.handle_init(cid, cmd, bcnt, data, now),
            Packet::Cont { cid, seq, data } => self.handle_cont(cid, seq, data, now),
        })
    }

    fn handle_init(&mut self, cid: u32, cmd: u8, bcnt: u16, data: Vec<u8>, now: Instant) -> IngestResult {
        if cmd == U2FHID_INIT_CMD {
            // INIT is always accepted and always resynchronizes its channel,
            // aborting whatever transaction was in flight.
            if cid != CID_BROADCAST {
                let entry = self
                    .channels
                    .entry(cid)
                    .or_insert_with(|| Channel::idle(now));
                entry.state = ChannelState::Processing;
                entry.in_flight = None;
                entry.last_activity = now;
            }
            let bcnt = bcnt as usize;
            let payload = data.into_iter().take(bcnt).collect();
            return IngestResult::Complete(Message::new(cid, cmd, payload));
        }

        if cid == CID_BROADCAST || cid == CID_RESERVED {
            return IngestResult::Error(cid, HidErrorCode::InvalidCid);
        }

        if self.any_other_channel_busy(cid) {
            return IngestResult::Error(cid, HidErrorCode::ChannelBusy);
        }

        let existing_busy = self
            .channels
            .get(&cid)
            .map(|c| c.state != ChannelState::Idle)
            .unwrap_or(false);
        if existing_busy {
            // A new transaction start while this very channel already has
            // one outstanding: protocol violation, reset and report it.
            self.channels.insert(cid, Channel::idle(now));
            return IngestResult::Error(cid, HidErrorCode::InvalidSeq);
        }

        let bcnt_usize = bcnt as usize;
        let mut buffer = data;
        buffer.truncate(bcnt_usize.min(INIT_DATA_CAP));

        if message::nb_packets(bcnt_usize) == 1 {
            self.channels.insert(
                cid,
                Channel {
                    state: ChannelState::Processing,
                    in_flight: None,
                    last_activity: now,
                },
            );
            IngestResult::Complete(Message::new(cid, cmd, buffer))
        } else {
            self.channels.insert(
                cid,
                Channel {
                    state: ChannelState::Receiving,
                    in_flight: Some(InFlight {
                        cmd,
                        bcnt: bcnt_usize,
                        buffer,
                        next_seq: 0,
                    }),
                    last_activity: now,
                },
            );
            IngestResult::Pending
        }
    }

    fn handle_cont(&mut self, cid: u32, seq: u8, data: Vec<u8>, now: Instant) -> IngestResult {
        let Some(channel) = self.channels.get_mut(&cid) else {
            return IngestResult::Error(cid, HidErrorCode::InvalidSeq);
        };

        match channel.state {
            ChannelState::Idle => IngestResult::Error(cid, HidErrorCode::InvalidSeq),
            ChannelState::Processing => IngestResult::Error(cid, HidErrorCode::ChannelBusy),
            ChannelState::Receiving => {
                let in_flight = channel.in_flight.as_mut().expect("Receiving implies in_flight");
                if seq != in_flight.next_seq {
                    channel.state = ChannelState::Idle;
                    channel.in_flight = None;
                    return IngestResult::Error(cid, HidErrorCode::InvalidSeq);
                }

                let remaining = in_flight.bcnt - in_flight.buffer.len();
                let take = remaining.min(CONT_DATA_CAP).min(data.len());
                in_flight.buffer.extend_from_slice(&data[..take]);
                in_flight.next_seq += 1;
                channel.last_activity = now;

                if in_flight.buffer.len() >= in_flight.bcnt {
                    let cmd = in_flight.cmd;
                    let payload = std::mem::take(&mut in_flight.buffer);
                    channel.state = ChannelState::Processing;
                    channel.in_flight = None;
                    IngestResult::Complete(Message::new(cid, cmd, payload))
                } else {
                    IngestResult::Pending
                }
            }
        }
    }

    /// Signals that the message dispatched from `cid` has been fully
    /// handled and the channel may accept a new transaction.
    pub fn finish(&mut self, cid: u32) {
        if let Some(channel) = self.channels.get_mut(&cid) {
            channel.state = ChannelState::Idle;
            channel.in_flight = None;
            channel.last_activity = Instant::now();
        }
    }

    /// Reaps channels idle too long while mid-reception, returning the CIDs
    /// and the error to report on each.
    pub fn tick(&mut self, now: Instant) -> Vec<(u32, HidErrorCode)> {
        let timeout = Duration::from_millis(TRANSACTION_TIMEOUT_MS);
        let mut timed_out = Vec::new();
        for (&cid, channel) in self.channels.iter_mut() {
            if channel.state == ChannelState::Receiving && now.duration_since(channel.last_activity) > timeout
            {
                channel.state = ChannelState::Idle;
                channel.in_flight = None;
                timed_out.push((cid, HidErrorCode::MsgTimeout));
            }
        }
        timed_out
    }

    /// Serializes a message into an ordered report sequence: init packet
    /// first, continuations with `SEQ=0,1,2,...`.
    pub fn serialize(message: &Message) -> Vec<[u8; REPORT_LEN]> {
        let mut reports = Vec::with_capacity(message::nb_packets(message.payload.len()));
        let bcnt = message.payload.len() as u16;
        let init_len = message.payload.len().min(INIT_DATA_CAP);
        reports.push(packet::encode_init(
            message.cid,
            message.cmd,
            bcnt,
            &message.payload[..init_len],
        ));

        let mut offset = init_len;
        let mut seq = 0u8;
        while offset < message.payload.len() {
            let end = (offset + CONT_DATA_CAP).min(message.payload.len());
            reports.push(packet::encode_cont(message.cid, seq, &message.payload[offset..end]));
            offset = end;
            seq += 1;
        }
        debug_assert_eq!(reports.len(), message::nb_packets(message.payload.len()));
        debug_assert!(message.payload.len() <= message::max_payload(reports.len()));
        reports
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_from(p: &[u8]) -> [u8; REPORT_LEN] {
        let mut r = [0u8; REPORT_LEN];
        r[..p.len()].copy_from_slice(p);
        r
    }

    #[test]
    fn init_on_broadcast_completes_without_allocating_a_channel() {
        let mut table = ChannelTable::new();
        let report = packet::encode_init(CID_BROADCAST, 0x86, 8, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let result = table.ingest(&report).unwrap();
        match result {
            IngestResult::Complete(msg) => {
                assert_eq!(msg.cid, CID_BROADCAST);
                assert_eq!(msg.payload, vec![0, 1, 2, 3, 4, 5, 6, 7]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(table.channel_count(), 0);
    }

    #[test]
    fn reassembles_a_multi_packet_message() {
        let mut table = ChannelTable::new();
        let cid = table.allocate_channel();
        let payload: Vec<u8> = (0..120u16).map(|b| (b % 256) as u8).collect();
        let reports = ChannelTable::serialize(&Message::new(cid, 0x81, payload.clone()));
        assert!(reports.len() >= 2);

        let mut last = None;
        for r in &reports {
            last = Some(table.ingest(r).unwrap());
        }
        match last.unwrap() {
            IngestResult::Complete(msg) => {
                assert_eq!(msg.cid, cid);
                assert_eq!(msg.payload, payload);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn wrong_sequence_aborts_and_reports_invalid_seq() {
        let mut table = ChannelTable::new();
        let cid = table.allocate_channel();
        let payload = vec![0xAA; 120];
        let reports = ChannelTable::serialize(&Message::new(cid, 0x81, payload));
        assert!(table.ingest(&reports[0]).unwrap() == IngestResult::Pending);

        // replay the first continuation twice: second attempt has seq 0 again
        // instead of the expected seq 1.
        table.ingest(&reports[1]).unwrap();
        let result = table.ingest(&reports[1]).unwrap();
        assert_eq!(result, IngestResult::Error(cid, HidErrorCode::InvalidSeq));
    }

    #[test]
    fn continuation_with_no_init_is_invalid_seq() {
        let mut table = ChannelTable::new();
        let report = report_from(&[0, 0, 0, 1, 0x00]);
        let result = table.ingest(&report).unwrap();
        assert_eq!(result, IngestResult::Error(1, HidErrorCode::InvalidSeq));
    }

    #[test]
    fn busy_channel_rejects_unrelated_channel_start() {
        let mut table = ChannelTable::new();
        let cid_a = table.allocate_channel();
        let cid_b = table.allocate_channel();

        let payload = vec![0xBB; 120];
        let reports_a = ChannelTable::serialize(&Message::new(cid_a, 0x81, payload));
        assert_eq!(table.ingest(&reports_a[0]).unwrap(), IngestResult::Pending);

        let start_b = packet::encode_init(cid_b, 0x83, 4, &[1, 2, 3, 4]);
        let result = table.ingest(&start_b).unwrap();
        assert_eq!(result, IngestResult::Error(cid_b, HidErrorCode::ChannelBusy));

        let last = table.ingest(&reports_a[1]).unwrap();
        match last {
            IngestResult::Complete(msg) => assert_eq!(msg.cid, cid_a),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn init_mid_transaction_aborts_and_resyncs() {
        let mut table = ChannelTable::new();
        let cid = table.allocate_channel();
        let payload = vec![0xCC; 120];
        let reports = ChannelTable::serialize(&Message::new(cid, 0x81, payload));
        assert_eq!(table.ingest(&reports[0]).unwrap(), IngestResult::Pending);

        let resync = packet::encode_init(cid, 0x86, 8, &[9, 9, 9, 9, 9, 9, 9, 9]);
        let result = table.ingest(&resync).unwrap();
        match result {
            IngestResult::Complete(msg) => assert_eq!(msg.cmd, 0x86),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn tick_reaps_stale_receiving_channel() {
        let mut table = ChannelTable::new();
        let cid = table.allocate_channel();
        let payload = vec![0xDD; 120];
        let reports = ChannelTable::serialize(&Message::new(cid, 0x81, payload));
        table.ingest(&reports[0]).unwrap();

        let future = Instant::now() + Duration::from_secs(1);
        let reaped = table.tick(future);
        assert_eq!(reaped, vec![(cid, HidErrorCode::MsgTimeout)]);
    }
}
