//! Superficie RPC de FlowSync: autenticación y cancelación por llamada,
//! capa de acceso, contexto de mutación, streams de sincronización y los
//! handlers de cada entidad, agrupados en [`FlowService`].

pub mod access;
pub mod auth;
pub mod buses;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod mutation;
pub mod recorder;
pub mod rendezvous;
pub mod service;
pub mod sync;
pub mod wire;

pub use auth::{CallContext, CancelHandle, Cancellation};
pub use buses::{Buses, Published};
pub use config::ServiceConfig;
pub use error::{Code, RpcError, RpcResult};
pub use recorder::RunRecorder;
pub use rendezvous::{Rendezvous, ResponseGuard, WaitOutcome};
pub use service::FlowService;
pub use sync::{SyncItem, SyncResponse, SyncStream};
pub use wire::WireId;
