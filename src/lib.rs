//! FlowSync
//!
//! Núcleo de sincronización en tiempo real para un editor colaborativo de
//! flujos. Este crate reúne los tres crates del workspace:
//! - `flow_core`: modelo, bus de eventos y contrato de almacenamiento.
//! - `flow_persistence`: store Postgres (Diesel + r2d2).
//! - `flow_rpc`: handlers RPC, streams de sync y registro de ejecuciones.
//!
//! `app` arma un `FlowService` listo para usar sobre cualquiera de los dos
//! stores.

pub mod app;

pub use flow_core;
pub use flow_persistence;
pub use flow_rpc;
