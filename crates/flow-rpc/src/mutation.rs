//! Contexto de mutación: una transacción más la lista de eventos pendientes.
//!
//! Los eventos se publican sólo después de que el commit fue durable y en el
//! mismo orden en que se registraron. Si el contexto se suelta sin commit, la
//! transacción y los eventos se descartan.

use std::sync::Arc;

use log::{debug, warn};

use flow_core::store::{Store, Tx};
use flow_core::Id;

use crate::auth::{CallContext, Cancellation};
use crate::buses::{Buses, Published};
use crate::error::{RpcError, RpcResult};

pub struct MutationContext {
    tx: Tx,
    buses: Buses,
    user: Id,
    events: Vec<Published>,
    cancel: Cancellation,
}

impl MutationContext {
    /// Abre la transacción; `Unavailable` si el store no puede.
    pub async fn begin(store: Arc<dyn Store>, buses: &Buses, ctx: &CallContext) -> RpcResult<Self> {
        let user = ctx.user()?;
        let tx = Tx::begin(store).await?;
        debug!("mutation begin user={user}");
        Ok(Self { tx,
                  buses: buses.clone(),
                  user,
                  events: Vec::new(),
                  cancel: ctx.cancellation().clone() })
    }

    pub fn user(&self) -> Id {
        self.user
    }

    pub fn tx(&mut self) -> &mut Tx {
        &mut self.tx
    }

    pub fn track(&mut self, event: Published) {
        self.events.push(event);
    }

    pub fn tracked(&self) -> usize {
        self.events.len()
    }

    /// Confirma la transacción y publica los eventos registrados.
    pub async fn commit(self) -> RpcResult<()> {
        if self.cancel.is_cancelled() {
            debug!("mutation rollback (cancelled) user={}", self.user);
            return Err(RpcError::Cancelled);
        }
        let Self { tx, buses, user, events, .. } = self;
        let _gate = buses.commit_gate().await;
        tx.commit().await.map_err(|e| {
                              warn!("mutation commit failed user={user}: {e}");
                              RpcError::internal(e)
                          })?;
        debug!("mutation commit user={user} events={}", events.len());
        for event in events {
            buses.publish(event).await;
        }
        Ok(())
    }

    /// Descarta transacción y eventos. Equivale a soltar el contexto.
    pub fn rollback(self) {
        debug!("mutation rollback user={} events={}", self.user, self.events.len());
    }
}
