//! Bus de eventos tipado por tópico (`Streamer<T, E>`).
//!
//! Cada suscriptor tiene su propia cola acotada (`broadcast` de tokio con un
//! único receptor). Cuando la cola se llena se descarta el evento más antiguo
//! y el conteo de descartes se entrega junto al siguiente evento.
//!
//! Publicar resuelve primero los filtros sin retener el lock y después toma
//! el lock de la lista para numerar y entregar: así el
//! orden de publicación se conserva por suscriptor y el punto de corte de un
//! snapshot queda bien definido.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use log::{debug, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, Mutex};

/// Decisión de un filtro sobre un tópico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Deny,
    /// El filtro no pudo decidir (p. ej. store caído). El evento se cuenta
    /// como descartado para ese suscriptor.
    Unknown,
}

/// Decide si un suscriptor ve los eventos de un tópico.
#[async_trait]
pub trait TopicFilter<T>: Send + Sync {
    async fn admits(&self, topic: &T) -> Admission;
}

/// Filtro que admite todo.
pub struct AllowAll;

#[async_trait]
impl<T: Sync> TopicFilter<T> for AllowAll {
    async fn admits(&self, _topic: &T) -> Admission {
        Admission::Admit
    }
}

/// Envoltorio que memoiza las decisiones positivas del filtro interno.
///
/// La autorización se asume monótona durante la vida de una suscripción: las
/// revocaciones no se detectan aquí.
pub struct Memoized<T, F> {
    inner: F,
    admitted: DashSet<T>,
}

impl<T: Eq + Hash, F> Memoized<T, F> {
    pub fn new(inner: F) -> Self {
        Self { inner,
               admitted: DashSet::new() }
    }
}

#[async_trait]
impl<T, F> TopicFilter<T> for Memoized<T, F>
    where T: Eq + Hash + Clone + Send + Sync,
          F: TopicFilter<T>
{
    async fn admits(&self, topic: &T) -> Admission {
        if self.admitted.contains(topic) {
            return Admission::Admit;
        }
        let admission = self.inner.admits(topic).await;
        if admission == Admission::Admit {
            self.admitted.insert(topic.clone());
        }
        admission
    }
}

#[derive(Clone)]
struct Envelope<E> {
    seq: u64,
    event: E,
}

struct Subscriber<T, E> {
    filter: Arc<dyn TopicFilter<T>>,
    sender: broadcast::Sender<Envelope<E>>,
    /// Eventos que el filtro no pudo decidir.
    missed: Arc<AtomicU64>,
}

struct StreamerState<T, E> {
    next_seq: u64,
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber<T, E>>,
}

/// Instancia de bus para un par (tópico, evento).
pub struct Streamer<T, E> {
    name: &'static str,
    capacity: usize,
    state: Mutex<StreamerState<T, E>>,
}

impl<T, E> Streamer<T, E>
    where T: Send + Sync + 'static,
          E: Clone + Send + Sync + 'static
{
    /// `capacity` es la cota de la cola de cada suscriptor (mínimo 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self { name,
               capacity: capacity.max(1),
               state: Mutex::new(StreamerState { next_seq: 0,
                                                 next_id: 0,
                                                 subscribers: BTreeMap::new() }) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ofrece `event` a cada suscriptor cuyo filtro admite `topic`. Nunca
    /// bloquea por un suscriptor lento ni falla.
    pub async fn publish(&self, topic: T, event: E) {
        // los filtros pueden leer el store: se resuelven sin el lock y se
        // repite si alguien se suscribió mientras tanto
        let mut decided: HashMap<u64, Admission> = HashMap::new();
        let mut state = loop {
            let state = self.state.lock().await;
            let undecided: Vec<(u64, Arc<dyn TopicFilter<T>>)> =
                state.subscribers
                     .iter()
                     .filter(|(id, s)| s.sender.receiver_count() > 0 && !decided.contains_key(*id))
                     .map(|(id, s)| (*id, s.filter.clone()))
                     .collect();
            if undecided.is_empty() {
                break state;
            }
            drop(state);
            for (id, filter) in undecided {
                decided.insert(id, filter.admits(&topic).await);
            }
        };
        let seq = state.next_seq;
        state.next_seq += 1;

        let mut gone = Vec::new();
        let mut offered = 0usize;
        for (id, subscriber) in state.subscribers.iter() {
            if subscriber.sender.receiver_count() == 0 {
                gone.push(*id);
                continue;
            }
            match decided.get(id).copied().unwrap_or(Admission::Deny) {
                Admission::Admit => {}
                Admission::Deny => continue,
                Admission::Unknown => {
                    subscriber.missed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            match subscriber.sender.send(Envelope { seq,
                                                    event: event.clone() })
            {
                Ok(_) => offered += 1,
                Err(_) => gone.push(*id),
            }
        }
        for id in gone {
            state.subscribers.remove(&id);
            debug!("bus={} unsubscribed id={id}", self.name);
        }
        debug!("bus={} publish seq={seq} offered={offered}", self.name);
    }

    /// Suscripción sólo en vivo.
    pub async fn subscribe(&self, filter: Arc<dyn TopicFilter<T>>) -> Subscription<E> {
        self.register(filter).await
    }

    /// Suscripción con snapshot inicial. El punto de corte se fija antes de
    /// invocar al productor; los eventos del snapshot se entregan primero y
    /// los eventos en vivo anteriores al corte se suprimen.
    pub async fn subscribe_with_snapshot<F, Fut, X>(&self, filter: Arc<dyn TopicFilter<T>>, snapshot: F) -> Result<Subscription<E>, X>
        where F: FnOnce() -> Fut,
              Fut: Future<Output = Result<Vec<E>, X>>
    {
        let mut subscription = self.register(filter).await;
        let events = snapshot().await?;
        debug!("bus={} snapshot events={}", self.name, events.len());
        subscription.snapshot.extend(events);
        Ok(subscription)
    }

    /// Cantidad de suscriptores vivos.
    pub async fn subscriber_count(&self) -> usize {
        let state = self.state.lock().await;
        state.subscribers
             .values()
             .filter(|s| s.sender.receiver_count() > 0)
             .count()
    }

    async fn register(&self, filter: Arc<dyn TopicFilter<T>>) -> Subscription<E> {
        let mut state = self.state.lock().await;
        let (sender, receiver) = broadcast::channel(self.capacity);
        let id = state.next_id;
        state.next_id += 1;
        let cutover = state.next_seq;
        let missed = Arc::new(AtomicU64::new(0));
        state.subscribers.insert(id,
                                 Subscriber { filter,
                                              sender,
                                              missed: missed.clone() });
        debug!("bus={} subscribed id={id} cutover={cutover}", self.name);
        Subscription { bus: self.name,
                       snapshot: VecDeque::new(),
                       receiver,
                       cutover,
                       dropped: 0,
                       missed }
    }
}

/// Evento entregado a un suscriptor. `dropped` cuenta los eventos perdidos
/// desde la entrega anterior.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<E> {
    pub event: E,
    pub dropped: u64,
}

/// Extremo receptor de una suscripción. Soltarla libera la suscripción.
pub struct Subscription<E> {
    bus: &'static str,
    snapshot: VecDeque<E>,
    receiver: broadcast::Receiver<Envelope<E>>,
    cutover: u64,
    dropped: u64,
    missed: Arc<AtomicU64>,
}

impl<E: Clone> Subscription<E> {
    /// Espera el siguiente evento. `None` cuando el bus se cerró.
    pub async fn recv(&mut self) -> Option<Delivery<E>> {
        if let Some(event) = self.snapshot.pop_front() {
            return Some(self.deliver(event));
        }
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.seq < self.cutover => continue,
                Ok(envelope) => return Some(self.deliver(envelope.event)),
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Variante no bloqueante de `recv`.
    pub fn try_recv(&mut self) -> Option<Delivery<E>> {
        if let Some(event) = self.snapshot.pop_front() {
            return Some(self.deliver(event));
        }
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) if envelope.seq < self.cutover => continue,
                Ok(envelope) => return Some(self.deliver(envelope.event)),
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn lagged(&mut self, n: u64) {
        warn!("bus={} subscriber lagged, dropped={n}", self.bus);
        self.dropped += n;
    }

    fn deliver(&mut self, event: E) -> Delivery<E> {
        let missed = self.missed.swap(0, Ordering::Relaxed);
        Delivery { event,
                   dropped: std::mem::take(&mut self.dropped) + missed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OnlyEven;

    #[async_trait]
    impl TopicFilter<u32> for OnlyEven {
        async fn admits(&self, topic: &u32) -> Admission {
            if topic % 2 == 0 {
                Admission::Admit
            } else {
                Admission::Deny
            }
        }
    }

    /// Admite sólo el tópico 0; el resto queda sin decidir.
    struct Undecided;

    #[async_trait]
    impl TopicFilter<u32> for Undecided {
        async fn admits(&self, topic: &u32) -> Admission {
            if *topic == 0 {
                Admission::Admit
            } else {
                Admission::Unknown
            }
        }
    }

    /// Consulta el propio bus al decidir.
    struct Reentrant(Arc<Streamer<u32, u32>>);

    #[async_trait]
    impl TopicFilter<u32> for Reentrant {
        async fn admits(&self, _topic: &u32) -> Admission {
            self.0.subscriber_count().await;
            Admission::Admit
        }
    }

    #[tokio::test]
    async fn filter_is_consulted_per_topic() {
        let bus: Streamer<u32, &'static str> = Streamer::new("test", 8);
        let mut sub = bus.subscribe(Arc::new(OnlyEven)).await;
        bus.publish(1, "odd").await;
        bus.publish(2, "even").await;
        assert_eq!(sub.recv().await.unwrap().event, "even");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_reports_count() {
        let bus: Streamer<u32, u32> = Streamer::new("test", 4);
        let mut sub = bus.subscribe(Arc::new(AllowAll)).await;
        for i in 0..10 {
            bus.publish(0, i).await;
        }
        let first = sub.recv().await.unwrap();
        assert_eq!(first.event, 6);
        assert_eq!(first.dropped, 6);
        let second = sub.recv().await.unwrap();
        assert_eq!(second.event, 7);
        assert_eq!(second.dropped, 0);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_publish() {
        let bus: Streamer<u32, u32> = Streamer::new("test", 4);
        let sub = bus.subscribe(Arc::new(AllowAll)).await;
        assert_eq!(bus.subscriber_count().await, 1);
        drop(sub);
        bus.publish(0, 1).await;
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn undecided_filter_counts_as_dropped() {
        let bus: Streamer<u32, u32> = Streamer::new("test", 4);
        let mut sub = bus.subscribe(Arc::new(Undecided)).await;
        bus.publish(1, 10).await;
        bus.publish(1, 11).await;
        bus.publish(0, 12).await;
        let got = sub.recv().await.unwrap();
        assert_eq!(got.event, 12);
        assert_eq!(got.dropped, 2);
    }

    #[tokio::test]
    async fn filters_run_without_the_subscriber_lock() {
        let bus: Arc<Streamer<u32, u32>> = Arc::new(Streamer::new("test", 4));
        let mut sub = bus.subscribe(Arc::new(Reentrant(bus.clone()))).await;
        let published = tokio::time::timeout(std::time::Duration::from_secs(1), bus.publish(0, 7)).await;
        assert!(published.is_ok());
        assert_eq!(sub.try_recv().unwrap().event, 7);
    }
}
