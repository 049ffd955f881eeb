//! Eventos de cambio publicados por la capa de mutación.
//!
//! Un evento describe un cambio ya durable sobre una fila. La codificación a
//! mensajes de sincronización (INSERT / UPDATE / DELETE) vive en la capa RPC.
use crate::model::{Edge, EdgePatch, Flow, FlowPatch, FlowVariable, FlowVariablePatch, HttpResponse, Node, NodeAiMemory, NodeAiMemoryPatch,
                   NodeAiModel, NodeAiProvider, AiSettingsPatch, NodeCondition, NodeConditionPatch, NodeExecution, NodeFor, NodeForEach,
                   NodeForEachPatch, NodeForPatch, NodeGraphql, NodeGraphqlPatch, NodeHttp, NodeHttpPatch, NodeJs, NodeJsPatch, NodeNoOp,
                   NodeNoOpPatch, NodePatch};

/// Cambio sobre una fila `R`. `Update` lleva la fila resultante y el patch
/// aplicado; `Delete` lleva la última versión conocida de la fila.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R, P> {
    Insert(R),
    Update { row: R, patch: P },
    Delete(R),
}

impl<R, P> Change<R, P> {
    pub fn row(&self) -> &R {
        match self {
            Change::Insert(row) | Change::Delete(row) => row,
            Change::Update { row, .. } => row,
        }
    }
}

/// Bus de flows, tópico = workspace.
pub type FlowEvent = Change<Flow, FlowPatch>;
/// Bus de versiones, tópico = flow padre. Mismo cambio que el de flow.
pub type FlowVersionEvent = Change<Flow, FlowPatch>;
/// Bus de aristas, tópico = flow.
pub type EdgeEvent = Change<Edge, EdgePatch>;
/// Bus de variables, tópico = flow.
pub type VariableEvent = Change<FlowVariable, FlowVariablePatch>;
/// Bus de ejecuciones, tópico = flow. Un update lleva la fila completa.
pub type ExecutionEvent = Change<NodeExecution, ()>;
/// Bus de respuestas HTTP, tópico = workspace.
pub type HttpResponseEvent = Change<HttpResponse, ()>;

/// Bus de nodos, tópico = flow. Transporta tanto el nodo base como las
/// sub-filas de cada variante.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Base(Change<Node, NodePatch>),
    NoOp(Change<NodeNoOp, NodeNoOpPatch>),
    Http(Change<NodeHttp, NodeHttpPatch>),
    For(Change<NodeFor, NodeForPatch>),
    ForEach(Change<NodeForEach, NodeForEachPatch>),
    Condition(Change<NodeCondition, NodeConditionPatch>),
    Js(Change<NodeJs, NodeJsPatch>),
    Graphql(Change<NodeGraphql, NodeGraphqlPatch>),
    AiProvider(Change<NodeAiProvider, AiSettingsPatch>),
    AiModel(Change<NodeAiModel, AiSettingsPatch>),
    AiMemory(Change<NodeAiMemory, NodeAiMemoryPatch>),
}
