//! Sub-filas específicas de cada tipo de nodo.
//!
//! Una sub-fila se identifica por el id del nodo base. Su existencia es
//! independiente de la del nodo base: el cliente puede escribirlas en
//! cualquier orden.

use serde::{Deserialize, Serialize};

use super::{apply_union, apply_value, AiModelKind, ErrorHandling, MemoryType, NoOpKind, NodeKind, Patch, Union};
use crate::event::{Change, NodeEvent};
use crate::store::Entity;
use crate::Id;

/// Contrato común de las sub-filas de nodo.
pub trait SubNode: Entity + std::fmt::Debug + PartialEq {
    /// Tipo de nodo base al que especializa.
    const NODE_KIND: NodeKind;
    /// Si es `true`, un update se publica como DELETE seguido de INSERT.
    const REPLACE_ON_UPDATE: bool = false;

    type Patch: Patch<Self>;

    fn node_id(&self) -> Id;
    /// Copia de la sub-fila asociada a otro nodo.
    fn with_node_id(self, node_id: Id) -> Self;
    fn into_event(change: Change<Self, Self::Patch>) -> NodeEvent;
    fn from_event(event: &NodeEvent) -> Option<&Change<Self, Self::Patch>>;
}

macro_rules! sub_node {
    ($row:ident, $patch:ty, $kind:expr, $variant:ident $(, replace = $replace:literal)?) => {
        impl SubNode for $row {
            const NODE_KIND: NodeKind = $kind;
            $(const REPLACE_ON_UPDATE: bool = $replace;)?

            type Patch = $patch;

            fn node_id(&self) -> Id {
                self.node_id
            }

            fn with_node_id(mut self, node_id: Id) -> Self {
                self.node_id = node_id;
                self
            }

            fn into_event(change: Change<Self, Self::Patch>) -> NodeEvent {
                NodeEvent::$variant(change)
            }

            fn from_event(event: &NodeEvent) -> Option<&Change<Self, Self::Patch>> {
                match event {
                    NodeEvent::$variant(change) => Some(change),
                    _ => None,
                }
            }
        }
    };
}

// --- no-op -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeNoOp {
    pub node_id: Id,
    pub kind: NoOpKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeNoOpPatch {
    pub kind: Option<NoOpKind>,
}

impl Patch<NodeNoOp> for NodeNoOpPatch {
    fn apply(&self, row: &mut NodeNoOp) {
        apply_value(&mut row.kind, &self.kind);
    }

    fn is_empty(&self) -> bool {
        self.kind.is_none()
    }
}

sub_node!(NodeNoOp, NodeNoOpPatch, NodeKind::NoOp, NoOp, replace = true);

// --- http ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHttp {
    pub node_id: Id,
    pub http_id: Option<Id>,
    /// Override por ejecución sobre la request enlazada.
    pub delta_http_id: Option<Id>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeHttpPatch {
    pub http_id: Option<Union<Id>>,
    pub delta_http_id: Option<Union<Id>>,
}

impl Patch<NodeHttp> for NodeHttpPatch {
    fn apply(&self, row: &mut NodeHttp) {
        apply_union(&mut row.http_id, &self.http_id);
        apply_union(&mut row.delta_http_id, &self.delta_http_id);
    }

    fn is_empty(&self) -> bool {
        self.http_id.is_none() && self.delta_http_id.is_none()
    }
}

sub_node!(NodeHttp, NodeHttpPatch, NodeKind::Http, Http);

// --- for -------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFor {
    pub node_id: Id,
    pub iterations: i32,
    pub condition: String,
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeForPatch {
    pub iterations: Option<i32>,
    pub condition: Option<String>,
    pub error_handling: Option<ErrorHandling>,
}

impl Patch<NodeFor> for NodeForPatch {
    fn apply(&self, row: &mut NodeFor) {
        apply_value(&mut row.iterations, &self.iterations);
        apply_value(&mut row.condition, &self.condition);
        apply_value(&mut row.error_handling, &self.error_handling);
    }

    fn is_empty(&self) -> bool {
        self.iterations.is_none() && self.condition.is_none() && self.error_handling.is_none()
    }
}

sub_node!(NodeFor, NodeForPatch, NodeKind::For, For);

// --- for-each --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeForEach {
    pub node_id: Id,
    pub iter_expression: String,
    pub condition: String,
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeForEachPatch {
    pub iter_expression: Option<String>,
    pub condition: Option<String>,
    pub error_handling: Option<ErrorHandling>,
}

impl Patch<NodeForEach> for NodeForEachPatch {
    fn apply(&self, row: &mut NodeForEach) {
        apply_value(&mut row.iter_expression, &self.iter_expression);
        apply_value(&mut row.condition, &self.condition);
        apply_value(&mut row.error_handling, &self.error_handling);
    }

    fn is_empty(&self) -> bool {
        self.iter_expression.is_none() && self.condition.is_none() && self.error_handling.is_none()
    }
}

sub_node!(NodeForEach, NodeForEachPatch, NodeKind::ForEach, ForEach);

// --- condition -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCondition {
    pub node_id: Id,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConditionPatch {
    pub condition: Option<String>,
}

impl Patch<NodeCondition> for NodeConditionPatch {
    fn apply(&self, row: &mut NodeCondition) {
        apply_value(&mut row.condition, &self.condition);
    }

    fn is_empty(&self) -> bool {
        self.condition.is_none()
    }
}

sub_node!(NodeCondition, NodeConditionPatch, NodeKind::Condition, Condition);

// --- javascript ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeJs {
    pub node_id: Id,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeJsPatch {
    pub code: Option<String>,
}

impl Patch<NodeJs> for NodeJsPatch {
    fn apply(&self, row: &mut NodeJs) {
        apply_value(&mut row.code, &self.code);
    }

    fn is_empty(&self) -> bool {
        self.code.is_none()
    }
}

sub_node!(NodeJs, NodeJsPatch, NodeKind::JavaScript, Js);

// --- graphql ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGraphql {
    pub node_id: Id,
    pub graphql_id: Option<Id>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGraphqlPatch {
    pub graphql_id: Option<Union<Id>>,
}

impl Patch<NodeGraphql> for NodeGraphqlPatch {
    fn apply(&self, row: &mut NodeGraphql) {
        apply_union(&mut row.graphql_id, &self.graphql_id);
    }

    fn is_empty(&self) -> bool {
        self.graphql_id.is_none()
    }
}

sub_node!(NodeGraphql, NodeGraphqlPatch, NodeKind::Graphql, Graphql);

// --- ai provider / ai model -------------------------------------------------

/// Configuración de modelo compartida por los nodos de proveedor y de modelo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiSettings {
    pub credential_id: Option<Id>,
    pub model: AiModelKind,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiSettingsPatch {
    pub credential_id: Option<Union<Id>>,
    pub model: Option<AiModelKind>,
    pub temperature: Option<Union<f32>>,
    pub max_tokens: Option<Union<i32>>,
}

impl AiSettingsPatch {
    fn apply_to(&self, settings: &mut AiSettings) {
        apply_union(&mut settings.credential_id, &self.credential_id);
        apply_value(&mut settings.model, &self.model);
        apply_union(&mut settings.temperature, &self.temperature);
        apply_union(&mut settings.max_tokens, &self.max_tokens);
    }

    fn is_noop(&self) -> bool {
        self.credential_id.is_none() && self.model.is_none() && self.temperature.is_none() && self.max_tokens.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAiProvider {
    pub node_id: Id,
    #[serde(flatten)]
    pub settings: AiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAiModel {
    pub node_id: Id,
    #[serde(flatten)]
    pub settings: AiSettings,
}

impl Patch<NodeAiProvider> for AiSettingsPatch {
    fn apply(&self, row: &mut NodeAiProvider) {
        self.apply_to(&mut row.settings);
    }

    fn is_empty(&self) -> bool {
        self.is_noop()
    }
}

impl Patch<NodeAiModel> for AiSettingsPatch {
    fn apply(&self, row: &mut NodeAiModel) {
        self.apply_to(&mut row.settings);
    }

    fn is_empty(&self) -> bool {
        self.is_noop()
    }
}

sub_node!(NodeAiProvider, AiSettingsPatch, NodeKind::AiProvider, AiProvider);
sub_node!(NodeAiModel, AiSettingsPatch, NodeKind::AiModel, AiModel);

// --- ai memory -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAiMemory {
    pub node_id: Id,
    pub memory_type: MemoryType,
    pub window_size: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAiMemoryPatch {
    pub memory_type: Option<MemoryType>,
    pub window_size: Option<i32>,
}

impl Patch<NodeAiMemory> for NodeAiMemoryPatch {
    fn apply(&self, row: &mut NodeAiMemory) {
        apply_value(&mut row.memory_type, &self.memory_type);
        apply_value(&mut row.window_size, &self.window_size);
    }

    fn is_empty(&self) -> bool {
        self.memory_type.is_none() && self.window_size.is_none()
    }
}

sub_node!(NodeAiMemory, NodeAiMemoryPatch, NodeKind::AiMemory, AiMemory);
