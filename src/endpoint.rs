//! Endpoint Controller (§4.6): owns the socket, both channel state
//! machines, and the two background tasks (receive dispatch, timer
//! service) that drive them. This is the only type applications touch
//! directly; everything else in the crate is plumbing behind `send`,
//! `receive`, and `close`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock;
use crate::config::Config;
use crate::delivery::{DeliveryQueue, DeliveryRecord};
use crate::error::{GameNetError, Result};
use crate::packet::Packet;
use crate::reliable::{ReliableReceiver, ReliableSender};
use crate::sack;
use crate::seq::SeqNum;
use crate::transport::Transport;
use crate::unreliable::UnreliableChannel;

/// Upper bound on how long the timer task sleeps between polls when no
/// timer is armed, so it still notices shutdown promptly.
const TIMER_IDLE_POLL_MS: u64 = 100;

struct Shared {
    transport: Transport,
    sender: Mutex<ReliableSender>,
    receiver: Mutex<ReliableReceiver>,
    unreliable: Mutex<UnreliableChannel>,
    delivery: DeliveryQueue,
    delivery_notify: Notify,
    epoch: Instant,
    closed: AtomicBool,
    shutdown: Notify,
    config: Config,
}

impl Shared {
    fn now_ms(&self) -> u32 {
        clock::now_ms(self.epoch)
    }
}

/// A bound gameNet endpoint: one UDP socket, one reliable channel, one
/// unreliable channel.
pub struct Endpoint {
    shared: Arc<Shared>,
    recv_task: Option<JoinHandle<()>>,
    timer_task: Option<JoinHandle<()>>,
}

impl Endpoint {
    /// Bind a local socket and, optionally, fix a remote peer. Without a
    /// remote, `send` always fails with [`GameNetError::NoRemote`] but the
    /// endpoint can still receive from any peer that sends to it.
    pub async fn open(local_addr: SocketAddr, remote: Option<SocketAddr>, config: Config) -> Result<Self> {
        let transport = Transport::bind(local_addr, remote).await?;
        let shared = Arc::new(Shared {
            sender: Mutex::new(ReliableSender::new(&config)),
            receiver: Mutex::new(ReliableReceiver::new(&config)),
            unreliable: Mutex::new(UnreliableChannel::new()),
            delivery: DeliveryQueue::new(),
            delivery_notify: Notify::new(),
            epoch: Instant::now(),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            transport,
            config,
        });

        let recv_task = tokio::spawn(recv_loop(shared.clone()));
        let timer_task = tokio::spawn(timer_loop(shared.clone()));

        Ok(Self {
            shared,
            recv_task: Some(recv_task),
            timer_task: Some(timer_task),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.shared.transport.local_addr()
    }

    /// Send a payload on the reliable channel (in-order, retransmitted
    /// until acknowledged or abandoned) or the unreliable channel
    /// (fire-and-forget), per `reliable`.
    pub async fn send(&self, payload: Bytes, reliable: bool) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(GameNetError::EndpointClosed);
        }

        if reliable {
            let now = Instant::now();
            let now_ms = self.shared.now_ms();
            let admitted = {
                let mut sender = self.shared.sender.lock();
                sender.submit(payload, now, now_ms)?
            };
            if let Some(out) = admitted {
                let packet = Packet::Data {
                    seq: out.seq,
                    ts_ms: out.ts_ms,
                    payload: out.payload,
                };
                self.shared.transport.emit(&packet).await?;
            }
        } else {
            let now_ms = self.shared.now_ms();
            let out = {
                let mut unreliable = self.shared.unreliable.lock();
                unreliable.stamp(payload, now_ms)
            };
            let packet = Packet::Unreliable {
                seq: out.seq,
                ts_ms: out.ts_ms,
                payload: out.payload,
            };
            self.shared.transport.emit(&packet).await?;
        }

        Ok(())
    }

    /// Pop the next delivered payload without waiting (§4.5: `receive()` is
    /// non-blocking, returning the head record or a null marker if empty).
    pub fn receive(&self) -> Option<DeliveryRecord> {
        self.shared.delivery.pop()
    }

    /// Wait for the next delivered payload. Not part of the spec's `receive`
    /// contract (which never blocks); a convenience for callers that want to
    /// await delivery instead of polling `receive()`. Returns `None` once
    /// the endpoint is closed and the delivery queue has drained.
    pub async fn recv_async(&self) -> Option<DeliveryRecord> {
        loop {
            if let Some(record) = self.shared.delivery.pop() {
                return Some(record);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            let notified = self.shared.delivery_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().await;
        }
    }

    /// Stop background work. Idempotent; the socket is dropped once all
    /// clones of the endpoint go out of scope.
    pub async fn close(&mut self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("endpoint closing");
        self.shared.shutdown.notify_waiters();
        self.shared.delivery_notify.notify_one();

        if let Some(task) = self.recv_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.timer_task.take() {
            let _ = task.await;
        }
        Ok(())
    }

    pub fn malformed_drop_count(&self) -> u64 {
        self.shared.transport.malformed_drop_count()
    }
}

async fn recv_loop(shared: Arc<Shared>) {
    let timeout = Duration::from_millis(shared.config.sock_recv_timeout_ms);
    loop {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        let Some((from, packet)) = shared.transport.recv_tick(timeout).await else {
            continue;
        };

        match packet {
            Packet::Data { seq, ts_ms, payload } => {
                let now = Instant::now();
                let (delivered, sack_info) = {
                    let mut receiver = shared.receiver.lock();
                    receiver.on_data(SeqNum(seq), ts_ms, payload, now)
                };
                for record in delivered {
                    shared.delivery.push(record);
                }
                shared.delivery_notify.notify_one();

                let bitmap = sack::build_bitmap(sack_info.cum_ack, sack_info.held, shared.config.sack_width);
                let sack_packet = Packet::Sack {
                    cum_ack: sack_info.cum_ack.0,
                    ts_ms: shared.now_ms(),
                    bitmap,
                };
                if let Err(err) = shared.transport.emit_to(from, &sack_packet).await {
                    warn!(%err, "failed to send sack");
                }
            }
            Packet::Unreliable { ts_ms, payload, .. } => {
                shared.delivery.push(DeliveryRecord {
                    seq: None,
                    ts_ms,
                    payload,
                });
                shared.delivery_notify.notify_one();
            }
            Packet::Sack { cum_ack, bitmap, .. } => {
                let held = sack::decode_bitmap(SeqNum(cum_ack), &bitmap);
                let now = Instant::now();
                let now_ms = shared.now_ms();
                let admitted = {
                    let mut sender = shared.sender.lock();
                    sender.on_sack(SeqNum(cum_ack), &held, now, now_ms)
                };
                for out in admitted {
                    let packet = Packet::Data {
                        seq: out.seq,
                        ts_ms: out.ts_ms,
                        payload: out.payload,
                    };
                    if let Err(err) = shared.transport.emit_to(from, &packet).await {
                        warn!(%err, "failed to emit admitted packet");
                    }
                }
            }
        }
    }
}

async fn timer_loop(shared: Arc<Shared>) {
    loop {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        let now_ms = shared.now_ms();

        let (retransmits, given_up) = {
            let mut sender = shared.sender.lock();
            sender.poll_timers(now, now_ms)
        };
        for out in retransmits {
            let packet = Packet::Data {
                seq: out.seq,
                ts_ms: out.ts_ms,
                payload: out.payload,
            };
            if let Err(err) = shared.transport.emit(&packet).await {
                warn!(%err, "failed to retransmit");
            }
        }
        for seq in given_up {
            warn!(seq = %seq, "reliable packet abandoned after exhausting retries");
        }

        let skipped = {
            let mut receiver = shared.receiver.lock();
            receiver.check_skip_deadline(now)
        };
        if !skipped.is_empty() {
            for record in skipped {
                shared.delivery.push(record);
            }
            shared.delivery_notify.notify_one();
        }

        let next_deadline = {
            let sender_deadline = shared.sender.lock().next_timer_deadline();
            let receiver_deadline = shared.receiver.lock().next_timer_deadline();
            [sender_deadline, receiver_deadline].into_iter().flatten().min()
        };

        let sleep_for = match next_deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(TIMER_IDLE_POLL_MS)),
            None => Duration::from_millis(TIMER_IDLE_POLL_MS),
        };

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shared.shutdown.notified() => break,
        }
    }
}
