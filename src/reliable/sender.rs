//! Reliable Sender (§4.2): Selective-Repeat with a fixed send window,
//! RTO-driven retransmission, and a bounded pending queue for payloads
//! submitted while the window is full.
//!
//! The send buffer is a `HashMap` rather than the `BTreeMap` a non-wrapping
//! sequence space would allow (as in an ordinary ordered-stream sender):
//! `SeqNum` wraps at 2^16 so raw integer ordering of keys is unsound once
//! the window crosses the wrap point. Walking forward from `base` with
//! `SeqNum` arithmetic instead keeps every comparison modular-aware, at the
//! cost of an O(window) scan on each cumulative ack -- fine since `window`
//! is small (tens to low hundreds).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::Config;
use crate::error::{GameNetError, Result};
use crate::rtt::RttEstimator;
use crate::clock::TimerWheel;
use crate::seq::SeqNum;

/// A reliable-channel packet ready to hand to the transport for emission.
#[derive(Debug, Clone)]
pub struct OutgoingData {
    pub seq: u16,
    pub ts_ms: u32,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
struct SendEntry {
    payload: Bytes,
    sent_at: Instant,
    /// Karn's rule: an RTT sample is only valid for an entry that has never
    /// been retransmitted, since an ack for a retransmitted packet cannot
    /// be attributed to a specific transmission.
    retransmitted: bool,
}

pub struct ReliableSender {
    window: usize,
    max_retries: u32,
    rto_max_ms: u32,
    base: SeqNum,
    next_seq: SeqNum,
    send_buffer: HashMap<u16, SendEntry>,
    pending: VecDeque<Bytes>,
    pending_cap: usize,
    timers: TimerWheel<u16>,
    retries: HashMap<u16, u32>,
    rtt: RttEstimator,
}

impl ReliableSender {
    pub fn new(config: &Config) -> Self {
        Self {
            window: config.window,
            max_retries: config.max_retries,
            rto_max_ms: config.rto_max_ms,
            base: SeqNum(0),
            next_seq: SeqNum(0),
            send_buffer: HashMap::new(),
            pending: VecDeque::new(),
            pending_cap: config.pending_queue_cap,
            timers: TimerWheel::new(),
            retries: HashMap::new(),
            rtt: RttEstimator::new(config.rto_min_ms, config.rto_max_ms),
        }
    }

    /// Submit a payload for reliable delivery. Returns the packet to emit
    /// immediately if the window had room, or `None` if it was queued
    /// behind the window (emitted later as acks free up space).
    pub fn submit(&mut self, payload: Bytes, now: Instant, now_ms: u32) -> Result<Option<OutgoingData>> {
        if self.send_buffer.len() < self.window {
            let seq = self.next_seq;
            self.next_seq = seq.next();
            Ok(Some(self.admit(seq, payload, now, now_ms)))
        } else {
            if self.pending.len() >= self.pending_cap {
                return Err(GameNetError::PendingQueueFull(self.pending_cap));
            }
            self.pending.push_back(payload);
            Ok(None)
        }
    }

    fn admit(&mut self, seq: SeqNum, payload: Bytes, now: Instant, now_ms: u32) -> OutgoingData {
        self.send_buffer.insert(
            seq.0,
            SendEntry {
                payload: payload.clone(),
                sent_at: now,
                retransmitted: false,
            },
        );
        self.timers.schedule(seq.0, self.rtt.rto());
        OutgoingData {
            seq: seq.0,
            ts_ms: now_ms,
            payload,
        }
    }

    /// Apply a SACK: `cum_ack` acknowledges every sequence up to and
    /// including it cumulatively; `sacked` additionally acknowledges
    /// out-of-order-received sequences beyond `cum_ack`. Returns any
    /// pending payloads newly admitted into the window that opened up.
    pub fn on_sack(&mut self, cum_ack: SeqNum, sacked: &[SeqNum], now: Instant, now_ms: u32) -> Vec<OutgoingData> {
        let steps = self.base.distance_to(cum_ack);
        if steps >= 0 {
            for i in 0..=(steps as u32) {
                let s = self.base.wrapping_add(i as u16);
                self.acknowledge(s, now);
            }
            self.base = cum_ack.next();
        }

        for &s in sacked {
            self.acknowledge(s, now);
        }

        let mut admitted = Vec::new();
        while self.send_buffer.len() < self.window {
            match self.pending.pop_front() {
                Some(payload) => {
                    let seq = self.next_seq;
                    self.next_seq = seq.next();
                    admitted.push(self.admit(seq, payload, now, now_ms));
                }
                None => break,
            }
        }
        admitted
    }

    fn acknowledge(&mut self, seq: SeqNum, now: Instant) {
        if let Some(entry) = self.send_buffer.remove(&seq.0) {
            self.timers.cancel(&seq.0);
            self.retries.remove(&seq.0);
            if !entry.retransmitted {
                self.rtt.update(now.duration_since(entry.sent_at));
            }
        }
    }

    /// Process any retransmit timers that have fired. Returns packets to
    /// re-emit and sequences abandoned after exhausting `max_retries`.
    pub fn poll_timers(&mut self, now: Instant, now_ms: u32) -> (Vec<OutgoingData>, Vec<SeqNum>) {
        let fired = self.timers.poll_expired(now);
        let mut retransmits = Vec::new();
        let mut given_up = Vec::new();

        for key in fired {
            let Some(entry) = self.send_buffer.get_mut(&key) else {
                continue;
            };
            let attempts = self.retries.entry(key).or_insert(0);
            *attempts += 1;
            if *attempts > self.max_retries {
                self.send_buffer.remove(&key);
                self.retries.remove(&key);
                given_up.push(SeqNum(key));
                continue;
            }

            entry.retransmitted = true;
            entry.sent_at = now;
            let payload = entry.payload.clone();
            let attempt = *attempts;

            let base_rto_ms = self.rtt.rto().as_millis() as u64;
            let factor = 1u64 << attempt.min(10);
            let backoff_ms = (base_rto_ms * factor).min(self.rto_max_ms as u64);
            self.timers.schedule(key, Duration::from_millis(backoff_ms));

            retransmits.push(OutgoingData {
                seq: key,
                ts_ms: now_ms,
                payload,
            });
        }

        (retransmits, given_up)
    }

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn inflight_count(&self) -> usize {
        self.send_buffer.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_unfinished_work(&self) -> bool {
        !self.send_buffer.is_empty() || !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            window: 4,
            pending_queue_cap: 8,
            max_retries: 3,
            ..Config::default()
        }
    }

    #[test]
    fn submit_within_window_sends_immediately() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        let out = sender.submit(Bytes::from_static(b"a"), now, 0).unwrap();
        assert!(out.is_some());
        assert_eq!(sender.inflight_count(), 1);
    }

    #[test]
    fn submit_beyond_window_queues() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        for _ in 0..4 {
            sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();
        }
        let out = sender.submit(Bytes::from_static(b"y"), now, 0).unwrap();
        assert!(out.is_none());
        assert_eq!(sender.pending_count(), 1);
    }

    #[test]
    fn pending_queue_full_errors() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        for _ in 0..4 {
            sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();
        }
        for _ in 0..8 {
            sender.submit(Bytes::from_static(b"y"), now, 0).unwrap();
        }
        let err = sender.submit(Bytes::from_static(b"z"), now, 0).unwrap_err();
        assert!(matches!(err, GameNetError::PendingQueueFull(8)));
    }

    #[test]
    fn cumulative_sack_frees_window_and_admits_pending() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        for _ in 0..4 {
            sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();
        }
        sender.submit(Bytes::from_static(b"y"), now, 0).unwrap();
        let admitted = sender.on_sack(SeqNum(1), &[], now, 0);
        assert_eq!(admitted.len(), 1); // freed 2 slots (seq 0 and 1), pending only had 1
        assert_eq!(sender.inflight_count(), 3);
        assert_eq!(sender.pending_count(), 0);
    }

    #[test]
    fn selective_ack_beyond_cum_ack_frees_only_that_slot() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        for _ in 0..4 {
            sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();
        }
        sender.on_sack(SeqNum(u16::MAX), &[SeqNum(2)], now, 0); // cum_ack stale, only selective applies
        assert_eq!(sender.inflight_count(), 3);
    }

    #[test]
    fn timer_expiry_retransmits_then_gives_up() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();

        let mut t = now;
        for attempt in 1..=3 {
            t += Duration::from_secs(10);
            let (retransmits, given_up) = sender.poll_timers(t, 0);
            assert_eq!(retransmits.len(), 1, "attempt {attempt}");
            assert!(given_up.is_empty());
        }
        t += Duration::from_secs(10);
        let (retransmits, given_up) = sender.poll_timers(t, 0);
        assert!(retransmits.is_empty());
        assert_eq!(given_up, vec![SeqNum(0)]);
        assert_eq!(sender.inflight_count(), 0);
    }

    #[test]
    fn ack_before_timer_fires_cancels_it() {
        let mut sender = ReliableSender::new(&cfg());
        let now = Instant::now();
        sender.submit(Bytes::from_static(b"x"), now, 0).unwrap();
        sender.on_sack(SeqNum(0), &[], now, 0);
        let (retransmits, given_up) = sender.poll_timers(now + Duration::from_secs(10), 0);
        assert!(retransmits.is_empty());
        assert!(given_up.is_empty());
    }
}
