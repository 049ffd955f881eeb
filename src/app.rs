//! Armado del servicio sobre el store en memoria o sobre Postgres.

use std::sync::Arc;

use log::info;

use flow_core::store::InMemoryStore;
use flow_persistence::{build_pool_from_env, PersistenceError, PgStore};
use flow_rpc::{FlowService, ServiceConfig};

/// Servicio sobre un store en memoria. Devuelve también el store para poder
/// dar de alta workspaces y miembros.
pub fn in_memory() -> (Arc<InMemoryStore>, FlowService) {
    let store = Arc::new(InMemoryStore::new());
    let config = ServiceConfig::from_env();
    info!("flowsync in-memory subscriber_buffer={} sync_batch={}",
          config.subscriber_buffer,
          config.sync_batch);
    let service = FlowService::new(store.clone(), config);
    (store, service)
}

/// Servicio sobre Postgres (`DATABASE_URL`). Aplica las migraciones
/// pendientes al construir el pool.
pub fn postgres() -> Result<(Arc<PgStore>, FlowService), PersistenceError> {
    let pool = build_pool_from_env()?;
    let store = Arc::new(PgStore::new(pool));
    let service = FlowService::new(store.clone(), ServiceConfig::from_env());
    info!("flowsync postgres store ready");
    Ok((store, service))
}
