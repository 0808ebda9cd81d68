//! End-to-end transfers between two in-process connections.
//!
//! Both endpoints run in the same task and are driven concurrently with
//! `tokio::join!`; each side makes progress whenever the other is waiting on
//! its channel.  Faults are injected with [`Simulator`].

use std::collections::BTreeSet;
use std::time::Duration;

use udp_stream::{
    channel::MemoryChannel,
    simulator::{Simulator, SimulatorConfig},
    Channel, Config, Connection,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small(mss: usize, window_size: usize) -> Config {
    Config {
        mss,
        window_size,
        ..Config::default()
    }
}

/// A deterministic payload that makes misplaced bytes easy to spot.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Push `data` from `tx` to `rx`, returning both connections once `rx` has
/// read everything and `tx` has seen it acknowledged.
async fn transfer<A: Channel, B: Channel>(
    mut tx: Connection<A>,
    mut rx: Connection<B>,
    data: &[u8],
    linger: Duration,
) -> (Connection<A>, Connection<B>, Vec<u8>) {
    let sender = async {
        assert_eq!(tx.send(data).await.expect("send"), data.len());
        tx.flush().await.expect("flush");
        tx
    };
    let receiver = async {
        let got = rx.recv(data.len()).await.expect("recv");
        rx.linger(linger).await.expect("linger");
        (rx, got)
    };

    let (tx, (rx, got)) = tokio::join!(sender, receiver);
    (tx, rx, got)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple_transfer() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let tx = Connection::new(a, Config::default()).unwrap();
    let rx = Connection::new(b, Config::default()).unwrap();

    let (tx, rx, got) = transfer(tx, rx, b"hello world", Duration::ZERO).await;

    assert_eq!(got, b"hello world");
    assert_eq!(tx.stats().segments_sent, 1);
    assert_eq!(tx.confirmed_bytes(), 11);
    assert_eq!(rx.received_bytes(), 11);
}

#[tokio::test]
async fn window_limited_multi_segment_transfer() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let tx = Connection::new(a, small(4, 8)).unwrap();
    let rx = Connection::new(b, small(4, 8)).unwrap();
    let data = pattern(20);

    let (tx, rx, got) = transfer(tx, rx, &data, Duration::ZERO).await;

    assert_eq!(got, data);
    assert_eq!(tx.stats().segments_sent, 5);
    assert_eq!(tx.stats().peak_in_flight, 8);
    assert_eq!(tx.confirmed_bytes(), 20);
    assert!(rx.stats().acks_sent >= 5);
}

#[tokio::test]
async fn flow_control_cap_holds_across_many_sends() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let mut tx = Connection::new(a, small(7, 21)).unwrap();
    let mut rx = Connection::new(b, small(7, 21)).unwrap();
    let data = pattern(500);

    let sender = async {
        for chunk in data.chunks(33) {
            tx.send(chunk).await.unwrap();
            assert!(tx.in_flight_bytes() <= 21);
        }
        tx.flush().await.unwrap();
        tx
    };
    let receiver = async { rx.recv(500).await.unwrap() };

    let (tx, got) = tokio::join!(sender, receiver);
    assert_eq!(got, data);
    assert!(tx.stats().peak_in_flight <= 21);
}

#[tokio::test]
async fn single_packet_loss_is_recovered() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let lossy = Simulator::new(
        a,
        SimulatorConfig {
            drop_sends: BTreeSet::from([1]),
            ..SimulatorConfig::default()
        },
    );
    let tx = Connection::new(lossy, small(4, 8)).unwrap();
    let rx = Connection::new(b, small(4, 8)).unwrap();
    let data = pattern(20);

    let (tx, _rx, got) = transfer(tx, rx, &data, Duration::ZERO).await;

    assert_eq!(got, data);
    assert_eq!(tx.channel().stats().dropped, 1);
    assert!(tx.stats().retransmits() >= 1);
    assert_eq!(tx.confirmed_bytes(), 20);
}

#[tokio::test]
async fn receiver_with_smaller_window_buffers_a_larger_burst() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let lossy = Simulator::new(
        a,
        SimulatorConfig {
            drop_sends: BTreeSet::from([0]),
            ..SimulatorConfig::default()
        },
    );
    // The sender may have 16 segments in flight; the receiver's own window
    // only covers two of them.
    let tx = Connection::new(lossy, small(4, 64)).unwrap();
    let rx = Connection::new(b, small(4, 8)).unwrap();
    let data = pattern(200);

    let (tx, rx, got) = transfer(tx, rx, &data, Duration::ZERO).await;

    assert_eq!(got, data);
    assert_eq!(rx.stats().segments_discarded, 0);
    assert!(
        tx.stats().retransmits() <= 2,
        "gap closed one resend at a time: {:?}",
        tx.stats()
    );
    assert_eq!(tx.into_channel().stats().dropped, 1);
}

#[tokio::test]
async fn reordered_arrival_is_reassembled() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let reordering = Simulator::new(
        a,
        SimulatorConfig {
            hold_sends: BTreeSet::from([0]),
            ..SimulatorConfig::default()
        },
    );
    let tx = Connection::new(reordering, small(5, 64)).unwrap();
    let rx = Connection::new(b, small(5, 64)).unwrap();

    let (tx, rx, got) = transfer(tx, rx, b"0123456789", Duration::ZERO).await;

    assert_eq!(got, b"0123456789");
    assert_eq!(tx.channel().stats().reordered, 1);
    assert_eq!(rx.received_bytes(), 10);
}

#[tokio::test]
async fn duplicated_segments_are_delivered_once() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let doubling = Simulator::new(
        a,
        SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        },
    );
    let tx = Connection::new(doubling, small(10, 40)).unwrap();
    let rx = Connection::new(b, small(10, 40)).unwrap();
    let data = pattern(95);

    let (_tx, rx, got) = transfer(tx, rx, &data, Duration::from_millis(50)).await;

    assert_eq!(got, data);
    assert_eq!(rx.received_bytes(), 95);
    assert_eq!(rx.buffered(), 0);
    assert!(rx.stats().segments_discarded >= 1);
}

#[tokio::test]
async fn bidirectional_exchange() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let mut client = Connection::new(a, small(3, 12)).unwrap();
    let mut server = Connection::new(b, small(3, 12)).unwrap();

    let client_side = async {
        client.send(b"ping!").await.unwrap();
        let reply = client.recv(5).await.unwrap();
        client.flush().await.unwrap();
        reply
    };
    let server_side = async {
        let request = server.recv(5).await.unwrap();
        server.send(b"pong!").await.unwrap();
        server.flush().await.unwrap();
        request
    };

    let (reply, request) = tokio::join!(client_side, server_side);
    assert_eq!(request, b"ping!");
    assert_eq!(reply, b"pong!");
}

#[tokio::test]
async fn lossy_duplicating_network_in_both_directions() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let faults = |seed| SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.05,
        reorder_rate: 0.05,
        seed,
        ..SimulatorConfig::default()
    };
    let tx = Connection::new(Simulator::new(a, faults(1)), small(100, 400)).unwrap();
    let rx = Connection::new(Simulator::new(b, faults(2)), small(100, 400)).unwrap();
    let data = pattern(5_000);

    let (tx, _rx, got) = transfer(tx, rx, &data, Duration::from_secs(1)).await;

    assert_eq!(got, data);
    assert_eq!(tx.confirmed_bytes(), 5_000);
    assert!(tx.channel().stats().dropped > 0);
}

#[tokio::test]
async fn stream_spans_several_recv_calls() {
    init_logging();
    let (a, b) = MemoryChannel::pair();
    let mut tx = Connection::new(a, small(6, 24)).unwrap();
    let mut rx = Connection::new(b, small(6, 24)).unwrap();
    let data = pattern(60);

    let sender = async {
        tx.send(&data).await.unwrap();
        tx.flush().await.unwrap();
    };
    let receiver = async {
        let mut got = Vec::new();
        for want in [1, 9, 20, 30] {
            let part = rx.recv(want).await.unwrap();
            assert_eq!(part.len(), want);
            got.extend(part);
        }
        got
    };

    let ((), got) = tokio::join!(sender, receiver);
    assert_eq!(got, data);
}
