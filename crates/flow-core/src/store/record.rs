//! Representación uniforme de filas para el contrato de almacenamiento.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::model::{Edge, Flow, FlowVariable, HttpResponse, Node, NodeAiMemory, NodeAiModel, NodeAiProvider, NodeCondition, NodeExecution, NodeFor,
                   NodeForEach, NodeGraphql, NodeHttp, NodeJs, NodeKind, NodeNoOp};
use crate::Id;

/// Fila tipada que el store sabe persistir.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    const KIND: RecordKind;

    fn id(&self) -> Id;
    /// Clave de agrupación usada por `list_by_scope` (workspace para flows,
    /// flow para nodos/aristas/variables, nodo para ejecuciones).
    fn scope_id(&self) -> Option<Id>;
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! records {
    ($($row:ident => $name:literal),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum RecordKind {
            $($row),+
        }

        impl RecordKind {
            pub const ALL: &'static [RecordKind] = &[$(RecordKind::$row),+];

            /// Nombre estable usado en la columna `kind` del backend SQL.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(RecordKind::$row => $name),+
                }
            }
        }

        impl FromStr for RecordKind {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(RecordKind::$row),)+
                    other => Err(StoreError::Codec(format!("unknown record kind {other}"))),
                }
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            $($row($row)),+
        }

        impl Record {
            pub fn kind(&self) -> RecordKind {
                match self {
                    $(Record::$row(_) => RecordKind::$row),+
                }
            }

            pub fn id(&self) -> Id {
                match self {
                    $(Record::$row(r) => r.id()),+
                }
            }

            pub fn scope_id(&self) -> Option<Id> {
                match self {
                    $(Record::$row(r) => r.scope_id()),+
                }
            }

            pub fn to_json(&self) -> Result<Value, StoreError> {
                let value = match self {
                    $(Record::$row(r) => serde_json::to_value(r)),+
                };
                value.map_err(|e| StoreError::Codec(e.to_string()))
            }

            pub fn from_json(kind: RecordKind, value: Value) -> Result<Record, StoreError> {
                let record = match kind {
                    $(RecordKind::$row => serde_json::from_value(value).map(Record::$row)),+
                };
                record.map_err(|e| StoreError::Codec(format!("{}: {e}", kind.as_str())))
            }

            /// Campos de `after` cuyo valor difiere del de `self`.
            pub fn changed_fields(&self, after: &Record) -> Result<Map<String, Value>, StoreError> {
                let before = self.to_json()?;
                let Value::Object(after) = after.to_json()? else {
                    return Err(StoreError::Codec(format!("{} is not an object", self.kind())));
                };
                Ok(after.into_iter()
                        .filter(|(field, value)| before.get(field) != Some(value))
                        .collect())
            }

            /// La fila con `fields` sobrescritos.
            pub fn merged(&self, fields: Map<String, Value>) -> Result<Record, StoreError> {
                let Value::Object(mut body) = self.to_json()? else {
                    return Err(StoreError::Codec(format!("{} is not an object", self.kind())));
                };
                body.extend(fields);
                Record::from_json(self.kind(), Value::Object(body))
            }
        }
    };
}

records! {
    Flow => "flow",
    Node => "node",
    NodeNoOp => "node_noop",
    NodeHttp => "node_http",
    NodeFor => "node_for",
    NodeForEach => "node_foreach",
    NodeCondition => "node_condition",
    NodeJs => "node_js",
    NodeGraphql => "node_graphql",
    NodeAiProvider => "node_ai_provider",
    NodeAiModel => "node_ai_model",
    NodeAiMemory => "node_ai_memory",
    Edge => "edge",
    FlowVariable => "flow_variable",
    NodeExecution => "node_execution",
    HttpResponse => "http_response",
}

impl RecordKind {
    /// Tablas de sub-filas de nodo.
    pub const SUB_NODES: &'static [RecordKind] = &[RecordKind::NodeNoOp,
                                                   RecordKind::NodeHttp,
                                                   RecordKind::NodeFor,
                                                   RecordKind::NodeForEach,
                                                   RecordKind::NodeCondition,
                                                   RecordKind::NodeJs,
                                                   RecordKind::NodeGraphql,
                                                   RecordKind::NodeAiProvider,
                                                   RecordKind::NodeAiModel,
                                                   RecordKind::NodeAiMemory];

    /// Tabla de sub-filas correspondiente a un tipo de nodo.
    pub fn for_node_kind(kind: NodeKind) -> Option<RecordKind> {
        match kind {
            NodeKind::Unspecified => None,
            NodeKind::NoOp => Some(RecordKind::NodeNoOp),
            NodeKind::Http => Some(RecordKind::NodeHttp),
            NodeKind::Condition => Some(RecordKind::NodeCondition),
            NodeKind::For => Some(RecordKind::NodeFor),
            NodeKind::ForEach => Some(RecordKind::NodeForEach),
            NodeKind::JavaScript => Some(RecordKind::NodeJs),
            NodeKind::Graphql => Some(RecordKind::NodeGraphql),
            NodeKind::AiProvider => Some(RecordKind::NodeAiProvider),
            NodeKind::AiModel => Some(RecordKind::NodeAiModel),
            NodeKind::AiMemory => Some(RecordKind::NodeAiMemory),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! entity {
    ($row:ident, $id:ident, scope = $scope:ident) => {
        entity!(@impl $row, $id, |row: &$row| Some(row.$scope));
    };
    ($row:ident, $id:ident) => {
        entity!(@impl $row, $id, |_row: &$row| None);
    };
    (@impl $row:ident, $id:ident, $scope:expr) => {
        impl Entity for $row {
            const KIND: RecordKind = RecordKind::$row;

            fn id(&self) -> Id {
                self.$id
            }

            fn scope_id(&self) -> Option<Id> {
                ($scope)(self)
            }

            fn into_record(self) -> Record {
                Record::$row(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$row(row) => Some(row),
                    _ => None,
                }
            }
        }
    };
}

entity!(Flow, id, scope = workspace_id);
entity!(Node, id, scope = flow_id);
entity!(Edge, id, scope = flow_id);
entity!(FlowVariable, id, scope = flow_id);
entity!(NodeExecution, id, scope = node_id);
entity!(HttpResponse, id, scope = workspace_id);
entity!(NodeNoOp, node_id);
entity!(NodeHttp, node_id);
entity!(NodeFor, node_id);
entity!(NodeForEach, node_id);
entity!(NodeCondition, node_id);
entity!(NodeJs, node_id);
entity!(NodeGraphql, node_id);
entity!(NodeAiProvider, node_id);
entity!(NodeAiModel, node_id);
entity!(NodeAiMemory, node_id);
