//! flow-persistence
//!
//! Implementación Postgres (Diesel + r2d2) del contrato `Store` de
//! `flow-core`.
//!
//! Módulos:
//! - `pg`: `PgStore` y construcción del pool.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_pool, build_pool_from_env, PgPool, PgStore};
