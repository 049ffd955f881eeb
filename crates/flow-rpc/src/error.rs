//! Taxonomía de errores visible por el cliente.
//!
//! El detalle interno (errores del store) se registra con `error!` y nunca
//! viaja en el mensaje devuelto.

use std::fmt::Display;

use flow_core::{IdError, StoreError};
use log::{error, warn};
use thiserror::Error;

/// Código estable de cada variante.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    Unauthenticated,
    Internal,
    Unavailable,
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Fila inexistente o sin acceso; ambas causas son indistinguibles.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("internal error")]
    Internal,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("cancelled")]
    Cancelled,
}

impl RpcError {
    pub fn code(&self) -> Code {
        match self {
            RpcError::InvalidArgument(_) => Code::InvalidArgument,
            RpcError::NotFound(_) => Code::NotFound,
            RpcError::Unauthenticated => Code::Unauthenticated,
            RpcError::Internal => Code::Internal,
            RpcError::Unavailable(_) => Code::Unavailable,
            RpcError::Cancelled => Code::Cancelled,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        RpcError::InvalidArgument(msg.into())
    }

    /// Registra `err` y devuelve un `Internal` opaco.
    pub fn internal(err: impl Display) -> Self {
        error!("internal: {err}");
        RpcError::Internal
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => {
                warn!("store unavailable: {detail}");
                RpcError::Unavailable("store unavailable".into())
            }
            other => RpcError::internal(other),
        }
    }
}

impl From<IdError> for RpcError {
    fn from(err: IdError) -> Self {
        RpcError::InvalidArgument(err.to_string())
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
