//! End-to-end scenarios driven over real loopback UDP sockets: the clean
//! path, a permanently lost reliable packet forcing the skip-deadline to
//! kick in, and closing an endpoint with sends still outstanding.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gamenet::{Config, Endpoint};
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn reserve_addr() -> SocketAddr {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.local_addr().unwrap()
}

#[tokio::test]
async fn clean_path_delivers_everything_in_order() {
    let config = Config {
        sock_recv_timeout_ms: 10,
        ..Config::default()
    };
    let addr_a = reserve_addr().await;
    let addr_b = reserve_addr().await;
    let a = Endpoint::open(addr_a, Some(addr_b), config).await.unwrap();
    let b = Endpoint::open(addr_b, Some(addr_a), config).await.unwrap();

    for i in 0..20u8 {
        a.send(Bytes::copy_from_slice(&[i]), true).await.unwrap();
    }

    for expected in 0..20u8 {
        let record = timeout(Duration::from_secs(2), b.recv_async()).await.unwrap().unwrap();
        assert_eq!(record.payload[0], expected);
    }
}

/// A UDP relay sitting between two endpoints that can be told to drop a
/// specific reliable sequence forever, simulating a permanent hole in an
/// otherwise-healthy link.
async fn spawn_lossy_relay(listen_on: SocketAddr, forward_to: SocketAddr, drop_seq: Arc<AtomicU16>) -> SocketAddr {
    let sock = UdpSocket::bind(listen_on).await.unwrap();
    let relay_addr = sock.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, _from) = match sock.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            if buf.first() == Some(&0x01) && len >= 3 {
                let seq = u16::from_be_bytes([buf[1], buf[2]]);
                if seq == drop_seq.load(Ordering::Relaxed) {
                    continue; // drop this reliable-channel seq forever
                }
            }
            let _ = sock.send_to(&buf[..len], forward_to).await;
        }
    });
    relay_addr
}

#[tokio::test]
async fn permanent_hole_is_skipped_after_deadline() {
    let config = Config {
        sock_recv_timeout_ms: 10,
        skip_timeout_ms: 80,
        ..Config::default()
    };

    let addr_a = reserve_addr().await;
    let addr_b = reserve_addr().await;
    let drop_seq = Arc::new(AtomicU16::new(1)); // drop the 2nd reliable packet (seq 1)
    let relay_for_a_to_b = spawn_lossy_relay(reserve_addr().await, addr_b, drop_seq.clone()).await;

    let a = Endpoint::open(addr_a, Some(relay_for_a_to_b), config).await.unwrap();
    let b = Endpoint::open(addr_b, Some(addr_a), config).await.unwrap();

    a.send(Bytes::from_static(b"zero"), true).await.unwrap();
    a.send(Bytes::from_static(b"one"), true).await.unwrap(); // this one never arrives
    a.send(Bytes::from_static(b"two"), true).await.unwrap();

    let first = timeout(Duration::from_secs(2), b.recv_async()).await.unwrap().unwrap();
    assert_eq!(&first.payload[..], b"zero");

    // "two" is held behind the hole left by "one" until the skip deadline fires.
    let second = timeout(Duration::from_secs(2), b.recv_async()).await.unwrap().unwrap();
    assert_eq!(&second.payload[..], b"two");
}

#[tokio::test]
async fn close_mid_flight_does_not_panic_and_stops_delivery() {
    let config = Config {
        sock_recv_timeout_ms: 10,
        ..Config::default()
    };
    let addr_a = reserve_addr().await;
    let addr_b = reserve_addr().await;
    let mut a = Endpoint::open(addr_a, Some(addr_b), config).await.unwrap();
    let mut b = Endpoint::open(addr_b, Some(addr_a), config).await.unwrap();

    for i in 0..5u8 {
        a.send(Bytes::copy_from_slice(&[i]), true).await.unwrap();
    }

    a.close().await.unwrap();
    b.close().await.unwrap();

    // Idempotent.
    a.close().await.unwrap();

    assert!(a.send(Bytes::from_static(b"late"), true).await.is_err());
}
