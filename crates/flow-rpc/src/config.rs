//! Parámetros del servicio desde variables de entorno (con `.env`).

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use flow_core::constants::DEFAULT_SUBSCRIBER_BUFFER;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

/// Máximo de eventos ya encolados que se agrupan en una respuesta de sync.
pub const DEFAULT_SYNC_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Cota de la cola de cada suscriptor (`FLOWSYNC_SUBSCRIBER_BUFFER`).
    pub subscriber_buffer: usize,
    /// `FLOWSYNC_SYNC_BATCH`.
    pub sync_batch: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
               sync_batch: DEFAULT_SYNC_BATCH }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        Self { subscriber_buffer: env_usize("FLOWSYNC_SUBSCRIBER_BUFFER", DEFAULT_SUBSCRIBER_BUFFER),
               sync_batch: env_usize("FLOWSYNC_SYNC_BATCH", DEFAULT_SYNC_BATCH) }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok()
                 .and_then(|v| v.trim().parse::<usize>().ok())
                 .unwrap_or(default)
                 .max(1)
}
