use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Compression, NodeState};
use crate::Id;

/// Registro de un intento de ejecución de un nodo. Append-only desde el
/// punto de vista de este core; el motor de ejecución lo escribe a través del
/// `RunRecorder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Id,
    pub node_id: Id,
    pub name: String,
    pub state: NodeState,
    pub error: Option<String>,
    pub input: Vec<u8>,
    pub input_compression: Compression,
    pub output: Vec<u8>,
    pub output_compression: Compression,
    /// Respuesta HTTP producida por este intento, si la hubo.
    pub response_id: Option<Id>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Respuesta HTTP capturada durante una ejecución.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub id: Id,
    pub http_id: Id,
    pub workspace_id: Id,
    pub status: i32,
    pub body: Vec<u8>,
    pub time: DateTime<Utc>,
    /// Milisegundos.
    pub duration: i32,
    pub size: i32,
}
