use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flow_core::event::{Admission, AllowAll, Memoized, Streamer, TopicFilter};

#[tokio::test]
async fn snapshot_comes_first_and_pre_cutover_events_are_suppressed() {
    let bus: Arc<Streamer<u32, &'static str>> = Arc::new(Streamer::new("flow", 16));
    // evento anterior a la suscripción: nunca debe llegar
    bus.publish(1, "before").await;

    let publisher = bus.clone();
    let mut sub = bus.subscribe_with_snapshot(Arc::new(AllowAll), move || async move {
                         // un evento publicado mientras se arma el snapshot queda después del corte
                         publisher.publish(1, "during").await;
                         Ok::<_, ()>(vec!["snap-a", "snap-b"])
                     })
                     .await
                     .unwrap();
    bus.publish(1, "after").await;

    let mut seen = Vec::new();
    while let Some(delivery) = sub.try_recv() {
        seen.push(delivery.event);
    }
    assert_eq!(seen, vec!["snap-a", "snap-b", "during", "after"]);
}

#[tokio::test]
async fn snapshot_failure_is_returned_to_caller() {
    let bus: Streamer<u32, u32> = Streamer::new("flow", 4);
    let result = bus.subscribe_with_snapshot(Arc::new(AllowAll), || async { Err::<Vec<u32>, _>("boom") })
                    .await;
    assert!(matches!(result, Err("boom")));
}

struct Counting(Arc<AtomicUsize>);

#[async_trait::async_trait]
impl TopicFilter<u32> for Counting {
    async fn admits(&self, _topic: &u32) -> Admission {
        self.0.fetch_add(1, Ordering::SeqCst);
        Admission::Admit
    }
}

#[tokio::test]
async fn memoized_filter_asks_once_per_topic() {
    let calls = Arc::new(AtomicUsize::new(0));
    let memo: Memoized<u32, Counting> = Memoized::new(Counting(calls.clone()));
    assert_eq!(memo.admits(&7).await, Admission::Admit);
    assert_eq!(memo.admits(&7).await, Admission::Admit);
    assert_eq!(memo.admits(&8).await, Admission::Admit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn publish_order_is_preserved_per_subscriber() {
    let bus: Streamer<u32, u32> = Streamer::new("edge", 64);
    let mut a = bus.subscribe(Arc::new(AllowAll)).await;
    let mut b = bus.subscribe(Arc::new(AllowAll)).await;
    for i in 0..20 {
        bus.publish(0, i).await;
    }
    for sub in [&mut a, &mut b] {
        let got: Vec<u32> = std::iter::from_fn(|| sub.try_recv().map(|d| d.event)).collect();
        assert_eq!(got, (0..20).collect::<Vec<_>>());
    }
}
