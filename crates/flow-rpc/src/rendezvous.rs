//! Barrera respuesta → ejecución.
//!
//! El camino que publica una respuesta HTTP registra una señal antes de su
//! trabajo lento y la marca con `ResponseGuard::published` después de
//! publicar. El camino que publica una ejecución que cita esa respuesta
//! espera la señal, o la cancelación de su llamada, antes de publicar.
//! Soltar el guard sin marcarlo (la respuesta falló) despierta a los que
//! esperan con `WaitOutcome::Abandoned`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::watch;

use flow_core::Id;

use crate::auth::Cancellation;

/// Cómo terminó una espera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// La respuesta se publicó, o no había nada pendiente.
    Ready,
    /// Se soltó la reserva sin publicar la respuesta.
    Abandoned,
    /// Se canceló la llamada que esperaba.
    Cancelled,
}

#[derive(Clone, Default)]
pub struct Rendezvous {
    pending: Arc<Mutex<HashMap<Id, watch::Receiver<bool>>>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Id, watch::Receiver<bool>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registra la respuesta `response_id` como pendiente.
    pub fn register(&self, response_id: Id) -> ResponseGuard {
        let (tx, rx) = watch::channel(false);
        self.lock().insert(response_id, rx);
        debug!("rendezvous register response={response_id}");
        ResponseGuard { response_id,
                        signal: Some(tx),
                        owner: self.clone() }
    }

    pub fn is_pending(&self, response_id: Id) -> bool {
        self.lock().contains_key(&response_id)
    }

    /// Espera a que la respuesta se publique. Sin registro pendiente retorna
    /// `Ready` de inmediato.
    pub async fn wait(&self, response_id: Id, cancel: &Cancellation) -> WaitOutcome {
        let pending = self.lock().get(&response_id).cloned();
        let Some(mut rx) = pending else {
            return WaitOutcome::Ready;
        };
        debug!("rendezvous wait response={response_id}");
        let outcome = tokio::select! {
            biased;
            published = rx.wait_for(|published| *published) => match published {
                Ok(_) => WaitOutcome::Ready,
                Err(_) => WaitOutcome::Abandoned,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };
        self.lock().remove(&response_id);
        outcome
    }
}

/// Señal pendiente de una respuesta. Soltarla sin `published` cuenta como
/// respuesta fallida.
pub struct ResponseGuard {
    response_id: Id,
    signal: Option<watch::Sender<bool>>,
    owner: Rendezvous,
}

impl ResponseGuard {
    pub fn response_id(&self) -> Id {
        self.response_id
    }

    /// La respuesta ya es visible para los suscriptores.
    pub fn published(mut self) {
        if let Some(signal) = self.signal.take() {
            signal.send_replace(true);
        }
        debug!("rendezvous published response={}", self.response_id);
    }
}

impl Drop for ResponseGuard {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.response_id);
        if self.signal.take().is_some() {
            // canal cerrado sin `true`: `wait_for` devuelve error
            debug!("rendezvous abandoned response={}", self.response_id);
        }
    }
}
