//! Identificador opaco de 128 bits usado por todas las entidades.
//!
//! Se apoya en UUID v7 (prefijo temporal) y añade un guardián de proceso que
//! garantiza orden estrictamente creciente aun cuando dos ids se generan en
//! el mismo milisegundo.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

static LAST_ISSUED: Mutex<u128> = Mutex::new(0);

/// Errores al interpretar un id recibido del exterior.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("id must be 16 bytes, got {0}")]
    Length(usize),
    #[error("malformed id text: {0}")]
    Text(String),
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Emite un id nuevo, mayor que cualquier otro emitido por este proceso.
    pub fn new() -> Self {
        let candidate = Uuid::now_v7().as_u128();
        let mut last = LAST_ISSUED.lock().unwrap_or_else(|e| e.into_inner());
        let next = if candidate > *last { candidate } else { *last + 1 };
        *last = next;
        Self(Uuid::from_u128(next))
    }

    /// Valor cero, reconocible como "sin asignar".
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let raw: [u8; 16] = bytes.try_into().map_err(|_| IdError::Length(bytes.len()))?;
        Ok(Self(Uuid::from_bytes(raw)))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<Id> for Uuid {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| IdError::Text(e.to_string()))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0.hyphenated())
    }
}
