//! Errores del contrato de almacenamiento.

use thiserror::Error;

use crate::store::RecordKind;
use crate::Id;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// El store no puede abrir una transacción o atender consultas.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Inserción sobre una clave existente.
    #[error("{kind} {id} already exists")]
    Conflict { kind: RecordKind, id: Id },
    /// Cualquier otro fallo del backend (SQL, pool, etc.).
    #[error("backend error: {0}")]
    Backend(String),
    /// Una fila persistida no pudo decodificarse.
    #[error("codec error: {0}")]
    Codec(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
