//! Reliable Receiver (§4.2): reorder buffer with a bounded, bitmap-backed
//! SACK report and a skip-deadline policy that bounds how long a single
//! missing packet can block everything behind it in the delivery queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::Config;
use crate::delivery::DeliveryRecord;
use crate::seq::SeqNum;

/// Cumulative-ack-plus-bitmap view handed to the caller so it can build
/// and emit the wire `Packet::Sack`.
#[derive(Debug, Clone)]
pub struct SackInfo {
    pub cum_ack: SeqNum,
    pub held: Vec<SeqNum>,
}

pub struct ReliableReceiver {
    next_expected: SeqNum,
    window: usize,
    sack_width: u16,
    skip_timeout: Duration,
    reorder: HashMap<u16, (u32, Bytes)>,
    skip_deadline: Option<Instant>,
    /// Sequences skipped past by the skip-deadline policy, retained for
    /// observability (the application can inspect how often holes are
    /// being abandoned rather than filled).
    skip_events: Vec<SeqNum>,
}

impl ReliableReceiver {
    pub fn new(config: &Config) -> Self {
        Self {
            next_expected: SeqNum(0),
            window: config.window,
            sack_width: config.sack_width,
            skip_timeout: Duration::from_millis(config.skip_timeout_ms as u64),
            reorder: HashMap::new(),
            skip_deadline: None,
            skip_events: Vec::new(),
        }
    }

    /// Handle an incoming reliable-channel data packet. Always returns a
    /// [`SackInfo`] to acknowledge (even for duplicates), and any records
    /// newly ready for the application.
    pub fn on_data(&mut self, seq: SeqNum, ts_ms: u32, payload: Bytes, now: Instant) -> (Vec<DeliveryRecord>, SackInfo) {
        let mut delivered = Vec::new();

        let dist = self.next_expected.distance_to(seq);
        if dist < 0 {
            // Already delivered (duplicate of a past in-order packet). Ack only.
        } else if dist == 0 {
            delivered.push(DeliveryRecord {
                seq: Some(seq.0),
                ts_ms,
                payload,
            });
            self.next_expected = self.next_expected.next();
            delivered.extend(self.drain_contiguous());
            self.rearm_skip_deadline(now);
        } else if (dist as usize) < self.window {
            self.reorder.entry(seq.0).or_insert((ts_ms, payload));
            self.rearm_skip_deadline(now);
        }
        // dist >= window: out of range for this window, dropped (sender
        // would never legitimately have that many packets in flight).

        (delivered, self.sack_info())
    }

    fn drain_contiguous(&mut self) -> Vec<DeliveryRecord> {
        let mut out = Vec::new();
        while let Some((ts_ms, payload)) = self.reorder.remove(&self.next_expected.0) {
            out.push(DeliveryRecord {
                seq: Some(self.next_expected.0),
                ts_ms,
                payload,
            });
            self.next_expected = self.next_expected.next();
        }
        out
    }

    fn rearm_skip_deadline(&mut self, now: Instant) {
        if self.reorder.is_empty() {
            self.skip_deadline = None;
        } else if self.skip_deadline.is_none() {
            self.skip_deadline = Some(now + self.skip_timeout);
        }
    }

    /// Check whether the head-of-line gap has outlived `skip_timeout`; if
    /// so, abandon the missing sequence and deliver whatever contiguous
    /// run follows it. Returns the (possibly empty) run of newly-ready
    /// records.
    pub fn check_skip_deadline(&mut self, now: Instant) -> Vec<DeliveryRecord> {
        let Some(deadline) = self.skip_deadline else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }

        self.skip_events.push(self.next_expected);
        self.next_expected = self.next_expected.next();
        let mut delivered = self.drain_contiguous();

        if self.reorder.is_empty() {
            self.skip_deadline = None;
        } else {
            self.skip_deadline = Some(now + self.skip_timeout);
        }

        delivered.shrink_to_fit();
        delivered
    }

    fn sack_info(&self) -> SackInfo {
        let cum_ack = self.next_expected.wrapping_add(u16::MAX); // next_expected - 1
        let held: Vec<SeqNum> = self.reorder.keys().map(|&s| SeqNum(s)).collect();
        SackInfo { cum_ack, held }
    }

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.skip_deadline
    }

    pub fn skip_events(&self) -> &[SeqNum] {
        &self.skip_events
    }

    pub fn reorder_len(&self) -> usize {
        self.reorder.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            window: 8,
            skip_timeout_ms: 50,
            ..Config::default()
        }
    }

    #[test]
    fn in_order_delivery() {
        let mut recv = ReliableReceiver::new(&cfg());
        let now = Instant::now();
        let (delivered, sack) = recv.on_data(SeqNum(0), 0, Bytes::from_static(b"a"), now);
        assert_eq!(delivered.len(), 1);
        assert_eq!(sack.cum_ack, SeqNum(0));
        assert!(sack.held.is_empty());
    }

    #[test]
    fn out_of_order_buffers_then_drains_on_fill() {
        let mut recv = ReliableReceiver::new(&cfg());
        let now = Instant::now();
        let (delivered, sack) = recv.on_data(SeqNum(1), 0, Bytes::from_static(b"b"), now);
        assert!(delivered.is_empty());
        assert_eq!(sack.cum_ack, SeqNum(u16::MAX));
        assert_eq!(sack.held, vec![SeqNum(1)]);

        let (delivered, _) = recv.on_data(SeqNum(0), 0, Bytes::from_static(b"a"), now);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].seq, Some(0));
        assert_eq!(delivered[1].seq, Some(1));
    }

    #[test]
    fn duplicate_is_acked_but_not_redelivered() {
        let mut recv = ReliableReceiver::new(&cfg());
        let now = Instant::now();
        recv.on_data(SeqNum(0), 0, Bytes::from_static(b"a"), now);
        let (delivered, sack) = recv.on_data(SeqNum(0), 0, Bytes::from_static(b"a"), now);
        assert!(delivered.is_empty());
        assert_eq!(sack.cum_ack, SeqNum(0));
    }

    #[test]
    fn skip_deadline_unblocks_after_timeout() {
        let mut recv = ReliableReceiver::new(&cfg());
        let now = Instant::now();
        recv.on_data(SeqNum(1), 0, Bytes::from_static(b"b"), now);
        assert!(recv.check_skip_deadline(now).is_empty());

        let later = now + Duration::from_millis(60);
        let delivered = recv.check_skip_deadline(later);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].seq, Some(1));
        assert_eq!(recv.skip_events(), &[SeqNum(0)]);
    }

    #[test]
    fn seq_beyond_window_is_dropped() {
        let mut recv = ReliableReceiver::new(&cfg());
        let now = Instant::now();
        let (delivered, sack) = recv.on_data(SeqNum(100), 0, Bytes::from_static(b"x"), now);
        assert!(delivered.is_empty());
        assert!(sack.held.is_empty());
        assert_eq!(recv.reorder_len(), 0);
    }
}
