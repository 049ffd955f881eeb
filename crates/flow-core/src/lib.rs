//! Núcleo de FlowSync: modelo de filas, contrato de almacenamiento
//! transaccional y bus de eventos tipado por tópico.
//!
//! Este crate no conoce el transporte RPC ni el backend SQL; ambos se apoyan
//! en los contratos definidos aquí (`store::Store`, `event::Streamer`).

pub mod codec;
pub mod constants;
pub mod errors;
pub mod event;
pub mod id;
pub mod model;
pub mod store;

pub use errors::{StoreError, StoreResult};
pub use id::{Id, IdError};
