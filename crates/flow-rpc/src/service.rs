//! Fachada del servicio: agrupa el store, los buses y el registro de
//! rendezvous. Los métodos RPC viven en `handlers/`, un bloque `impl` por
//! familia de entidades.

use std::future::Future;
use std::sync::Arc;

use flow_core::event::TopicFilter;
use flow_core::store::Store;
use flow_core::Id;

use crate::access::Access;
use crate::auth::CallContext;
use crate::buses::{require, Bus, Buses};
use crate::config::ServiceConfig;
use crate::error::RpcResult;
use crate::mutation::MutationContext;
use crate::recorder::RunRecorder;
use crate::rendezvous::Rendezvous;
use crate::sync::{Encoder, SyncStream};

pub struct FlowService {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) buses: Buses,
    pub(crate) rendezvous: Rendezvous,
    pub(crate) config: ServiceConfig,
}

impl FlowService {
    /// Servicio con todos los buses configurados.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let buses = Buses::new(config.subscriber_buffer);
        Self::with_buses(store, buses, config)
    }

    pub fn with_buses(store: Arc<dyn Store>, buses: Buses, config: ServiceConfig) -> Self {
        Self { store,
               buses,
               rendezvous: Rendezvous::new(),
               config }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn buses(&self) -> &Buses {
        &self.buses
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Punto de entrada del motor de ejecución.
    pub fn recorder(&self) -> RunRecorder<'_> {
        RunRecorder::new(self)
    }

    pub(crate) fn access(&self, ctx: &CallContext) -> RpcResult<Access<'_>> {
        Ok(Access::new(self.store.as_ref(), ctx.user()?))
    }

    pub(crate) async fn begin(&self, ctx: &CallContext) -> RpcResult<MutationContext> {
        MutationContext::begin(self.store.clone(), &self.buses, ctx).await
    }

    /// Abre un stream de sync con snapshot inicial sobre `bus`.
    pub(crate) async fn open_sync<E, I, F, Fut>(&self,
                                                ctx: &CallContext,
                                                bus: &Option<Bus<E>>,
                                                name: &'static str,
                                                filter: Arc<dyn TopicFilter<Id>>,
                                                snapshot: F,
                                                encode: Encoder<E, I>)
                                                -> RpcResult<SyncStream<E, I>>
        where E: Clone + Send + Sync + 'static,
              F: FnOnce() -> Fut,
              Fut: Future<Output = RpcResult<Vec<E>>>
    {
        let bus = require(bus, name)?;
        let subscription = {
            let _gate = self.buses.subscribe_gate().await;
            bus.subscribe_with_snapshot(filter, snapshot).await?
        };
        Ok(SyncStream::new(name,
                           subscription,
                           encode,
                           ctx.cancellation().clone(),
                           self.config.sync_batch))
    }
}
