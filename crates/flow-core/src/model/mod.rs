//! Modelo de filas: workspace, flow, nodos (base y variantes), aristas,
//! variables y registros de ejecución.
//!
//! Cada fila tiene un `*Patch` asociado con los campos modificables; un patch
//! vacío no cambia nada. Los campos que pueden limpiarse usan `Union<T>` para
//! distinguir "dejar como está" (`None`) de "limpiar" (`Some(Union::Unset)`).

pub mod edge;
pub mod enums;
pub mod execution;
pub mod flow;
pub mod node;
pub mod variable;
pub mod variants;
pub mod workspace;

use serde::{Deserialize, Serialize};

pub use edge::{Edge, EdgePatch};
pub use enums::{AiModelKind, Compression, ErrorHandling, HandleKind, MemoryType, NoOpKind, NodeKind, NodeState, UnknownEnumValue};
pub use execution::{HttpResponse, NodeExecution};
pub use flow::{Flow, FlowPatch};
pub use node::{Node, NodePatch, Position};
pub use variable::{FlowVariable, FlowVariablePatch};
pub use variants::{AiSettings, AiSettingsPatch, NodeAiMemory, NodeAiMemoryPatch, NodeAiModel, NodeAiProvider, NodeCondition, NodeConditionPatch,
                   NodeFor, NodeForEach, NodeForEachPatch, NodeForPatch, NodeGraphql, NodeGraphqlPatch, NodeHttp, NodeHttpPatch, NodeJs, NodeJsPatch,
                   NodeNoOp, NodeNoOpPatch, SubNode};
pub use workspace::Workspace;

/// Valor de un campo que admite "sin valor".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Union<T> {
    Value(T),
    Unset,
}

impl<T> Union<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Union::Value(v) => Some(v),
            Union::Unset => None,
        }
    }
}

/// Cambio parcial sobre una fila de tipo `R`.
pub trait Patch<R>: Clone + Default + std::fmt::Debug + Send + Sync + 'static {
    fn apply(&self, row: &mut R);
    fn is_empty(&self) -> bool;
}

/// Aplica `Some(union)` sobre un campo opcional; `None` lo deja intacto.
pub(crate) fn apply_union<T: Clone>(field: &mut Option<T>, patch: &Option<Union<T>>) {
    if let Some(u) = patch {
        *field = u.clone().into_option();
    }
}

/// Aplica `Some(v)` sobre un campo obligatorio.
pub(crate) fn apply_value<T: Clone>(field: &mut T, patch: &Option<T>) {
    if let Some(v) = patch {
        *field = v.clone();
    }
}
