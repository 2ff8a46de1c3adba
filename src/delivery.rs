//! Delivery Queue (§4.5): the single hand-off point between network
//! workers and the application's `receive()` calls, backed by a
//! lock-free MPSC-ish queue so producers (recv worker, reliable receiver
//! draining in-order runs) never block on a consumer still holding a
//! payload.

use crossbeam_queue::SegQueue;

use bytes::Bytes;

/// One payload ready for the application, tagged with the channel it
/// arrived on and the timestamp it carried.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    /// `Some(seq)` for reliable deliveries (in-order), `None` for unreliable.
    pub seq: Option<u16>,
    pub ts_ms: u32,
    pub payload: Bytes,
}

/// Unbounded, lock-free hand-off queue from network workers to the
/// application. Unbounded because both producers already enforce their
/// own bounds upstream (the reliable receiver's reorder buffer is capped
/// at `WINDOW`, the unreliable channel never buffers at all), so nothing
/// here needs a second admission check.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    queue: SegQueue<DeliveryRecord>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    pub fn push(&self, record: DeliveryRecord) {
        self.queue.push(record);
    }

    pub fn pop(&self) -> Option<DeliveryRecord> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
