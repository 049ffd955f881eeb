//! Configuración de conexión desde variables de entorno.
//! Usa `DATABASE_URL` y parámetros opcionales de pool.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        init_dotenv();
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        let min_connections = env_u32("DATABASE_MIN_CONNECTIONS", 2);
        let max_connections = env_u32("DATABASE_MAX_CONNECTIONS", 16);
        Ok(Self { url,
                  min_connections,
                  max_connections })
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Fuerza la carga temprana de .env.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
