//! Streams de sincronización: reenvían los eventos de una suscripción como
//! mensajes INSERT / UPDATE / DELETE hasta que la llamada se cancela.

use log::debug;
use serde::Serialize;

use flow_core::event::Subscription;

use crate::auth::Cancellation;
use crate::wire::WireId;

/// Un cambio en forma de cable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncItem<Full, Update> {
    /// Fila completa.
    Insert(Full),
    /// Id más los campos cambiados.
    Update(Update),
    Delete { id: WireId },
}

impl<Full, Update> SyncItem<Full, Update> {
    pub fn as_insert(&self) -> Option<&Full> {
        match self {
            SyncItem::Insert(full) => Some(full),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&Update> {
        match self {
            SyncItem::Update(update) => Some(update),
            _ => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, SyncItem::Delete { .. })
    }
}

/// Respuesta de un stream de sync. `dropped` cuenta los eventos descartados
/// para este suscriptor desde la respuesta anterior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResponse<I> {
    pub items: Vec<I>,
    pub dropped: u64,
}

/// Traducción evento → mensaje. `None` descarta el evento.
pub type Encoder<E, I> = fn(&E) -> Option<I>;

pub struct SyncStream<E, I> {
    name: &'static str,
    subscription: Subscription<E>,
    encode: Encoder<E, I>,
    cancel: Cancellation,
    batch: usize,
}

impl<E: Clone, I> SyncStream<E, I> {
    pub(crate) fn new(name: &'static str, subscription: Subscription<E>, encode: Encoder<E, I>, cancel: Cancellation, batch: usize) -> Self {
        Self { name,
               subscription,
               encode,
               cancel,
               batch: batch.max(1) }
    }

    /// Siguiente respuesta. Agrupa los eventos ya encolados (hasta `batch`).
    /// `None` cuando la llamada se cancela o el bus se cierra.
    pub async fn next(&mut self) -> Option<SyncResponse<I>> {
        loop {
            let first = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("sync={} cancelled", self.name);
                    return None;
                }
                delivery = self.subscription.recv() => delivery?,
            };
            let mut dropped = first.dropped;
            let mut items: Vec<I> = (self.encode)(&first.event).into_iter().collect();
            while items.len() < self.batch {
                let Some(delivery) = self.subscription.try_recv() else {
                    break;
                };
                dropped += delivery.dropped;
                items.extend((self.encode)(&delivery.event));
            }
            if items.is_empty() && dropped == 0 {
                continue;
            }
            return Some(SyncResponse { items, dropped });
        }
    }

    /// Variante no bloqueante: lo que ya esté encolado, o `None`.
    pub fn try_next(&mut self) -> Option<SyncResponse<I>> {
        let mut dropped = 0;
        let mut items = Vec::new();
        while items.len() < self.batch {
            let Some(delivery) = self.subscription.try_recv() else {
                break;
            };
            dropped += delivery.dropped;
            items.extend((self.encode)(&delivery.event));
        }
        if items.is_empty() && dropped == 0 {
            return None;
        }
        Some(SyncResponse { items, dropped })
    }
}
