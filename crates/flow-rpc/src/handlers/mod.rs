//! Handlers RPC por familia de entidades.
//!
//! Todas las mutaciones siguen el mismo esquema: decodificar y validar cada
//! ítem, autorizar, escribir en una única transacción, registrar un evento
//! por escritura y confirmar. Nada se publica si algo falla antes del commit.

pub mod edge;
pub mod execution;
pub mod flow;
pub mod node;
pub mod response;
pub mod variable;
pub mod variant;
pub mod variants;
pub mod version;

pub use edge::{EdgeDeleteItem, EdgeInsertItem, EdgeMsg, EdgeSyncItem, EdgeUpdateItem, EdgeUpdateMsg};
pub use execution::{NodeExecutionMsg, NodeExecutionSyncItem};
pub use flow::{FlowDeleteItem, FlowDuplicateItem, FlowInsertItem, FlowMsg, FlowSyncItem, FlowUpdateItem, FlowUpdateMsg};
pub use node::{NodeDeleteItem, NodeInsertItem, NodeMsg, NodeSyncItem, NodeUpdateItem, NodeUpdateMsg};
pub use response::{HttpResponseMsg, HttpResponseSyncItem};
pub use variable::{FlowVariableDeleteItem, FlowVariableInsertItem, FlowVariableMsg, FlowVariableSyncItem, FlowVariableUpdateItem,
                   FlowVariableUpdateMsg};
pub use variant::{SubNodeDeleteItem, VariantRpc, VariantSyncItem};
pub use variants::{AiNodeMsg, AiNodeUpdateMsg, NodeConditionMsg, NodeConditionUpdateMsg, NodeForEachMsg, NodeForEachUpdateMsg, NodeForMsg,
                   NodeForUpdateMsg, NodeGraphqlMsg, NodeGraphqlUpdateMsg, NodeHttpMsg, NodeHttpUpdateMsg, NodeJsMsg, NodeJsUpdateMsg,
                   NodeAiMemoryMsg, NodeAiMemoryUpdateMsg, NodeNoOpMsg, NodeNoOpUpdateMsg};
