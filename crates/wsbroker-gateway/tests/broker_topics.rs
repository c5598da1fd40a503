#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, DuplexStream};

use wsbroker_core::protocol::frame::Opcode;
use wsbroker_core::WsBrokerError;
use wsbroker_gateway::broker::{Broker, PublishReport};
use wsbroker_gateway::config::Backpressure;
use wsbroker_gateway::transport::codec;
use wsbroker_gateway::transport::session::{Session, SessionId, SessionOptions};

/// A registered session plus the peer end of its stream.
struct Peer {
    id: SessionId,
    session: Session<DuplexStream>,
    remote: DuplexStream,
}

fn attach(broker: &Broker, opts: &SessionOptions) -> Peer {
    let (local, remote) = duplex(64 * 1024);
    let id = broker.next_session_id();
    let session = Session::new(id, local, opts);
    broker.register(session.handle().clone());
    Peer { id, session, remote }
}

async fn next_text(remote: &mut DuplexStream) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), codec::read_frame(remote, u64::MAX))
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(frame.opcode(), Opcode::Text);
    String::from_utf8(frame.payload.to_vec()).unwrap()
}

#[tokio::test]
async fn subscribe_then_publish_delivers_one_text_frame() {
    let broker = Broker::new(true);
    let mut a = attach(&broker, &SessionOptions::default());

    assert!(broker.subscribe("t", a.id));
    let report = broker.publish("t", "m").await.unwrap();
    assert_eq!(
        report,
        PublishReport {
            targeted: 1,
            delivered: 1,
            failed: 0,
            evicted: 0
        }
    );
    assert_eq!(next_text(&mut a.remote).await, "m");
}

#[tokio::test]
async fn publish_preserves_subscription_order_per_subscriber() {
    let broker = Broker::new(true);
    let mut a = attach(&broker, &SessionOptions::default());
    let mut b = attach(&broker, &SessionOptions::default());
    broker.subscribe("t", a.id);
    broker.subscribe("t", b.id);
    assert_eq!(broker.subscribers("t"), vec![a.id, b.id]);

    for i in 0..20 {
        broker.publish("t", &format!("m{i}")).await.unwrap();
    }
    for i in 0..20 {
        assert_eq!(next_text(&mut a.remote).await, format!("m{i}"));
        assert_eq!(next_text(&mut b.remote).await, format!("m{i}"));
    }
}

#[tokio::test]
async fn unknown_topic_is_not_found() {
    let broker = Broker::default();
    let err = broker.publish("missing", "m").await.unwrap_err();
    assert!(matches!(err, WsBrokerError::NotFound(_)));

    let err = broker.unsubscribe("missing", 1).unwrap_err();
    assert_eq!(err.client_code().as_str(), "NOT_FOUND");
}

#[tokio::test]
async fn unsubscribe_of_absent_session_is_not_found() {
    let broker = Broker::default();
    broker.subscribe("t", 1);
    let err = broker.unsubscribe("t", 2).unwrap_err();
    assert!(matches!(err, WsBrokerError::NotFound(_)));
    assert_eq!(broker.subscriber_count("t"), 1);
}

#[tokio::test]
async fn dedup_can_be_disabled_and_unsubscribe_removes_one_entry() {
    let dedup = Broker::new(true);
    assert!(dedup.subscribe("t", 7));
    assert!(!dedup.subscribe("t", 7));
    assert_eq!(dedup.subscriber_count("t"), 1);

    let dupes = Broker::new(false);
    assert!(dupes.subscribe("t", 7));
    assert!(dupes.subscribe("t", 7));
    assert_eq!(dupes.subscriber_count("t"), 2);

    dupes.unsubscribe("t", 7).unwrap();
    assert_eq!(dupes.subscribers("t"), vec![7]);
    dupes.unsubscribe("t", 7).unwrap();
    assert!(dupes.subscribers("t").is_empty());
    // The topic itself outlives its last subscriber.
    assert_eq!(dupes.topic_count(), 1);
    assert!(dupes.publish("t", "m").await.unwrap() == PublishReport::default());
}

#[tokio::test]
async fn unregistered_subscribers_are_evicted_on_publish() {
    let broker = Broker::default();
    let mut a = attach(&broker, &SessionOptions::default());
    broker.subscribe("t", a.id);
    broker.subscribe("t", 999);

    let report = broker.publish("t", "m").await.unwrap();
    assert_eq!(report.targeted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.evicted, 1);
    assert_eq!(broker.subscribers("t"), vec![a.id]);
    assert_eq!(next_text(&mut a.remote).await, "m");
}

#[tokio::test]
async fn closed_subscribers_are_evicted_without_stopping_the_fan_out() {
    let broker = Broker::default();
    let dead = attach(&broker, &SessionOptions::default());
    let mut live = attach(&broker, &SessionOptions::default());
    broker.subscribe("t", dead.id);
    broker.subscribe("other", dead.id);
    broker.subscribe("t", live.id);

    dead.session.force_close();
    let report = broker.publish("t", "m").await.unwrap();
    assert_eq!(
        report,
        PublishReport {
            targeted: 2,
            delivered: 1,
            failed: 0,
            evicted: 1
        }
    );
    assert_eq!(next_text(&mut live.remote).await, "m");

    // Eviction clears every topic of the dead session, not just this one.
    assert_eq!(broker.subscriber_count("other"), 0);
    assert_eq!(broker.session_count(), 1);
}

#[tokio::test]
async fn a_closed_session_listed_twice_is_evicted_once() {
    let broker = Broker::new(false);
    let dead = attach(&broker, &SessionOptions::default());
    let mut live = attach(&broker, &SessionOptions::default());
    broker.subscribe("t", dead.id);
    broker.subscribe("t", live.id);
    broker.subscribe("t", dead.id);

    dead.session.force_close();
    let report = broker.publish("t", "m").await.unwrap();
    assert_eq!(report.targeted, 3);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.evicted, 1);
    assert_eq!(broker.subscribers("t"), vec![live.id]);
    assert_eq!(next_text(&mut live.remote).await, "m");

    // Same for a session that was never registered.
    broker.subscribe("t", 999);
    broker.subscribe("t", 999);
    let report = broker.publish("t", "m").await.unwrap();
    assert_eq!((report.targeted, report.delivered, report.evicted), (3, 1, 1));
}

#[tokio::test]
async fn remove_session_clears_every_topic() {
    let broker = Broker::default();
    let a = attach(&broker, &SessionOptions::default());
    broker.subscribe("x", a.id);
    broker.subscribe("y", a.id);
    broker.subscribe("y", 42);

    assert_eq!(broker.remove_session(a.id), 2);
    assert_eq!(broker.subscriber_count("x"), 0);
    assert_eq!(broker.subscribers("y"), vec![42]);
    assert_eq!(broker.session_count(), 0);
    assert_eq!(broker.remove_session(a.id), 0);
}

#[tokio::test]
async fn drop_backpressure_counts_full_queues_as_failures() {
    let broker = Broker::default();
    let opts = SessionOptions {
        queue_capacity: 1,
        backpressure: Backpressure::Drop,
        ..SessionOptions::default()
    };
    // Tiny pipe that nobody reads: the writer stalls on its first frame.
    let (local, _remote) = duplex(8);
    let id = broker.next_session_id();
    let session = Session::new(id, local, &opts);
    broker.register(session.handle().clone());
    broker.subscribe("t", id);

    let mut failed = 0;
    for _ in 0..10 {
        failed += broker.publish("t", "payload").await.unwrap().failed;
    }
    assert!(failed >= 8, "failed={failed}");
    // A full queue is not a dead session.
    assert_eq!(broker.subscribers("t"), vec![id]);
}

#[tokio::test]
async fn closing_a_subscriber_releases_a_blocked_publish() {
    let broker = Arc::new(Broker::default());
    let opts = SessionOptions {
        queue_capacity: 1,
        backpressure: Backpressure::Block,
        enqueue_timeout: None,
        write_timeout: None,
        ..SessionOptions::default()
    };
    // Nobody reads the pipe, so the queue fills and publish waits for space.
    let (local, _remote) = duplex(8);
    let id = broker.next_session_id();
    let session = Session::new(id, local, &opts);
    let handle = session.handle().clone();
    broker.register(handle.clone());
    broker.subscribe("t", id);

    let publisher = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            let mut evicted = 0;
            for _ in 0..4 {
                evicted += broker.publish("t", "payload").await.unwrap().evicted;
            }
            evicted
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!publisher.is_finished());

    handle.force_close();
    let evicted = tokio::time::timeout(Duration::from_secs(2), publisher)
        .await
        .expect("publish stayed blocked on a closed subscriber")
        .unwrap();
    assert_eq!(evicted, 1);
    assert!(broker.subscribers("t").is_empty());
    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publish_and_subscription_changes() {
    let broker = Arc::new(Broker::default());
    let received = Arc::new(AtomicUsize::new(0));
    let mut peers = Vec::new();
    for _ in 0..8 {
        let Peer { id, session, mut remote } = attach(&broker, &SessionOptions::default());
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok(frame) = codec::read_frame(&mut remote, u64::MAX).await {
                assert_eq!(frame.opcode(), Opcode::Text);
                received.fetch_add(1, Ordering::SeqCst);
            }
        });
        peers.push((id, session));
    }

    let mut tasks = Vec::new();
    for (id, _) in &peers {
        let broker = Arc::clone(&broker);
        let id = *id;
        tasks.push(tokio::spawn(async move {
            let mut delivered = 0;
            for i in 0..50 {
                broker.subscribe("hot", id);
                let report = broker.publish("hot", &format!("{id}:{i}")).await.unwrap();
                // The publisher is subscribed for the whole call, and no
                // session closes during the run.
                assert!((1..=8).contains(&report.targeted), "{report:?}");
                assert_eq!(
                    report.delivered + report.failed + report.evicted,
                    report.targeted,
                    "{report:?}"
                );
                assert!(report.delivered >= 1, "{report:?}");
                assert_eq!((report.failed, report.evicted), (0, 0), "{report:?}");
                delivered += report.delivered;
                broker.unsubscribe("hot", id).unwrap();
            }
            broker.subscribe("hot", id);
            delivered
        }));
    }
    let mut delivered = 0;
    for task in tasks {
        delivered += task.await.unwrap();
    }

    // Every accepted frame reaches its peer exactly once.
    tokio::time::timeout(Duration::from_secs(5), async {
        while received.load(Ordering::SeqCst) < delivered {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("frames went missing");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.load(Ordering::SeqCst), delivered);

    let mut subs = broker.subscribers("hot");
    subs.sort_unstable();
    let mut expected: Vec<_> = peers.iter().map(|(id, _)| *id).collect();
    expected.sort_unstable();
    assert_eq!(subs, expected);
}
