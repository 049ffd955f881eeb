//! Forma de cable de cada sub-fila de nodo y sus métodos RPC.

use serde::Serialize;

use flow_core::event::NodeEvent;
use flow_core::model::{AiSettings, AiSettingsPatch, ErrorHandling, MemoryType, NoOpKind, NodeAiMemory, NodeAiMemoryPatch, NodeAiModel, NodeAiProvider,
                       NodeCondition, NodeConditionPatch, NodeFor, NodeForEach, NodeForEachPatch, NodeForPatch, NodeGraphql, NodeGraphqlPatch, NodeHttp,
                       NodeHttpPatch, NodeJs, NodeJsPatch, NodeNoOp, NodeNoOpPatch, AiModelKind, Union};
use flow_core::Id;

use super::variant::{SubNodeDeleteItem, VariantRpc, VariantSyncItem};
use crate::auth::CallContext;
use crate::error::{RpcError, RpcResult};
use crate::service::FlowService;
use crate::sync::SyncStream;
use crate::wire::{parse_enum, parse_id, parse_opt_enum, parse_opt_id, parse_union_id, wire, wire_opt, wire_union_id, WireId};

fn non_negative(field: &str, value: i32) -> RpcResult<i32> {
    if value < 0 {
        return Err(RpcError::invalid(format!("{field} must not be negative")));
    }
    Ok(value)
}

fn opt_non_negative(field: &str, value: Option<i32>) -> RpcResult<Option<i32>> {
    value.map(|v| non_negative(field, v)).transpose()
}

// --- no-op -----------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeNoOpMsg {
    pub node_id: WireId,
    pub kind: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeNoOpUpdateMsg {
    pub node_id: WireId,
    pub kind: Option<i32>,
}

impl VariantRpc for NodeNoOp {
    const NAME: &'static str = "node_noop";

    type Msg = NodeNoOpMsg;
    type UpdateMsg = NodeNoOpUpdateMsg;

    fn decode(msg: &NodeNoOpMsg) -> RpcResult<Self> {
        Ok(NodeNoOp { node_id: parse_id("node_id", &msg.node_id)?,
                      kind: parse_enum::<NoOpKind>("kind", msg.kind)? })
    }

    fn encode(&self) -> NodeNoOpMsg {
        NodeNoOpMsg { node_id: wire(self.node_id),
                      kind: self.kind.as_i32() }
    }

    fn decode_update(msg: &NodeNoOpUpdateMsg) -> RpcResult<(Id, NodeNoOpPatch)> {
        Ok((parse_id("node_id", &msg.node_id)?, NodeNoOpPatch { kind: parse_opt_enum("kind", msg.kind)? }))
    }

    fn encode_update(row: &Self, patch: &NodeNoOpPatch) -> NodeNoOpUpdateMsg {
        NodeNoOpUpdateMsg { node_id: wire(row.node_id),
                            kind: patch.kind.map(NoOpKind::as_i32) }
    }
}

// --- http ------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeHttpMsg {
    pub node_id: WireId,
    pub http_id: Option<WireId>,
    pub delta_http_id: Option<WireId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeHttpUpdateMsg {
    pub node_id: WireId,
    pub http_id: Option<Union<WireId>>,
    pub delta_http_id: Option<Union<WireId>>,
}

impl VariantRpc for NodeHttp {
    const NAME: &'static str = "node_http";

    type Msg = NodeHttpMsg;
    type UpdateMsg = NodeHttpUpdateMsg;

    fn decode(msg: &NodeHttpMsg) -> RpcResult<Self> {
        Ok(NodeHttp { node_id: parse_id("node_id", &msg.node_id)?,
                      http_id: parse_opt_id("http_id", msg.http_id.as_ref())?,
                      delta_http_id: parse_opt_id("delta_http_id", msg.delta_http_id.as_ref())? })
    }

    fn encode(&self) -> NodeHttpMsg {
        NodeHttpMsg { node_id: wire(self.node_id),
                      http_id: wire_opt(self.http_id),
                      delta_http_id: wire_opt(self.delta_http_id) }
    }

    fn decode_update(msg: &NodeHttpUpdateMsg) -> RpcResult<(Id, NodeHttpPatch)> {
        let patch = NodeHttpPatch { http_id: parse_union_id("http_id", msg.http_id.as_ref())?,
                                    delta_http_id: parse_union_id("delta_http_id", msg.delta_http_id.as_ref())? };
        Ok((parse_id("node_id", &msg.node_id)?, patch))
    }

    fn encode_update(row: &Self, patch: &NodeHttpPatch) -> NodeHttpUpdateMsg {
        NodeHttpUpdateMsg { node_id: wire(row.node_id),
                            http_id: wire_union_id(&patch.http_id),
                            delta_http_id: wire_union_id(&patch.delta_http_id) }
    }
}

// --- for -------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeForMsg {
    pub node_id: WireId,
    pub iterations: i32,
    pub condition: String,
    pub error_handling: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeForUpdateMsg {
    pub node_id: WireId,
    pub iterations: Option<i32>,
    pub condition: Option<String>,
    pub error_handling: Option<i32>,
}

impl VariantRpc for NodeFor {
    const NAME: &'static str = "node_for";

    type Msg = NodeForMsg;
    type UpdateMsg = NodeForUpdateMsg;

    fn decode(msg: &NodeForMsg) -> RpcResult<Self> {
        Ok(NodeFor { node_id: parse_id("node_id", &msg.node_id)?,
                     iterations: non_negative("iterations", msg.iterations)?,
                     condition: msg.condition.clone(),
                     error_handling: parse_enum::<ErrorHandling>("error_handling", msg.error_handling)? })
    }

    fn encode(&self) -> NodeForMsg {
        NodeForMsg { node_id: wire(self.node_id),
                     iterations: self.iterations,
                     condition: self.condition.clone(),
                     error_handling: self.error_handling.as_i32() }
    }

    fn decode_update(msg: &NodeForUpdateMsg) -> RpcResult<(Id, NodeForPatch)> {
        let patch = NodeForPatch { iterations: opt_non_negative("iterations", msg.iterations)?,
                                   condition: msg.condition.clone(),
                                   error_handling: parse_opt_enum("error_handling", msg.error_handling)? };
        Ok((parse_id("node_id", &msg.node_id)?, patch))
    }

    fn encode_update(row: &Self, patch: &NodeForPatch) -> NodeForUpdateMsg {
        NodeForUpdateMsg { node_id: wire(row.node_id),
                           iterations: patch.iterations,
                           condition: patch.condition.clone(),
                           error_handling: patch.error_handling.map(ErrorHandling::as_i32) }
    }
}

// --- for-each --------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeForEachMsg {
    pub node_id: WireId,
    pub iter_expression: String,
    pub condition: String,
    pub error_handling: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeForEachUpdateMsg {
    pub node_id: WireId,
    pub iter_expression: Option<String>,
    pub condition: Option<String>,
    pub error_handling: Option<i32>,
}

impl VariantRpc for NodeForEach {
    const NAME: &'static str = "node_foreach";

    type Msg = NodeForEachMsg;
    type UpdateMsg = NodeForEachUpdateMsg;

    fn decode(msg: &NodeForEachMsg) -> RpcResult<Self> {
        Ok(NodeForEach { node_id: parse_id("node_id", &msg.node_id)?,
                         iter_expression: msg.iter_expression.clone(),
                         condition: msg.condition.clone(),
                         error_handling: parse_enum::<ErrorHandling>("error_handling", msg.error_handling)? })
    }

    fn encode(&self) -> NodeForEachMsg {
        NodeForEachMsg { node_id: wire(self.node_id),
                         iter_expression: self.iter_expression.clone(),
                         condition: self.condition.clone(),
                         error_handling: self.error_handling.as_i32() }
    }

    fn decode_update(msg: &NodeForEachUpdateMsg) -> RpcResult<(Id, NodeForEachPatch)> {
        let patch = NodeForEachPatch { iter_expression: msg.iter_expression.clone(),
                                       condition: msg.condition.clone(),
                                       error_handling: parse_opt_enum("error_handling", msg.error_handling)? };
        Ok((parse_id("node_id", &msg.node_id)?, patch))
    }

    fn encode_update(row: &Self, patch: &NodeForEachPatch) -> NodeForEachUpdateMsg {
        NodeForEachUpdateMsg { node_id: wire(row.node_id),
                               iter_expression: patch.iter_expression.clone(),
                               condition: patch.condition.clone(),
                               error_handling: patch.error_handling.map(ErrorHandling::as_i32) }
    }
}

// --- condition -------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeConditionMsg {
    pub node_id: WireId,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeConditionUpdateMsg {
    pub node_id: WireId,
    pub condition: Option<String>,
}

impl VariantRpc for NodeCondition {
    const NAME: &'static str = "node_condition";

    type Msg = NodeConditionMsg;
    type UpdateMsg = NodeConditionUpdateMsg;

    fn decode(msg: &NodeConditionMsg) -> RpcResult<Self> {
        Ok(NodeCondition { node_id: parse_id("node_id", &msg.node_id)?,
                           condition: msg.condition.clone() })
    }

    fn encode(&self) -> NodeConditionMsg {
        NodeConditionMsg { node_id: wire(self.node_id),
                           condition: self.condition.clone() }
    }

    fn decode_update(msg: &NodeConditionUpdateMsg) -> RpcResult<(Id, NodeConditionPatch)> {
        Ok((parse_id("node_id", &msg.node_id)?, NodeConditionPatch { condition: msg.condition.clone() }))
    }

    fn encode_update(row: &Self, patch: &NodeConditionPatch) -> NodeConditionUpdateMsg {
        NodeConditionUpdateMsg { node_id: wire(row.node_id),
                                 condition: patch.condition.clone() }
    }
}

// --- javascript ------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeJsMsg {
    pub node_id: WireId,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeJsUpdateMsg {
    pub node_id: WireId,
    pub code: Option<String>,
}

impl VariantRpc for NodeJs {
    const NAME: &'static str = "node_javascript";

    type Msg = NodeJsMsg;
    type UpdateMsg = NodeJsUpdateMsg;

    fn decode(msg: &NodeJsMsg) -> RpcResult<Self> {
        Ok(NodeJs { node_id: parse_id("node_id", &msg.node_id)?,
                    code: msg.code.clone() })
    }

    fn encode(&self) -> NodeJsMsg {
        NodeJsMsg { node_id: wire(self.node_id),
                    code: self.code.clone() }
    }

    fn decode_update(msg: &NodeJsUpdateMsg) -> RpcResult<(Id, NodeJsPatch)> {
        Ok((parse_id("node_id", &msg.node_id)?, NodeJsPatch { code: msg.code.clone() }))
    }

    fn encode_update(row: &Self, patch: &NodeJsPatch) -> NodeJsUpdateMsg {
        NodeJsUpdateMsg { node_id: wire(row.node_id),
                          code: patch.code.clone() }
    }
}

// --- graphql ---------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeGraphqlMsg {
    pub node_id: WireId,
    pub graphql_id: Option<WireId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeGraphqlUpdateMsg {
    pub node_id: WireId,
    pub graphql_id: Option<Union<WireId>>,
}

impl VariantRpc for NodeGraphql {
    const NAME: &'static str = "node_graphql";

    type Msg = NodeGraphqlMsg;
    type UpdateMsg = NodeGraphqlUpdateMsg;

    fn decode(msg: &NodeGraphqlMsg) -> RpcResult<Self> {
        Ok(NodeGraphql { node_id: parse_id("node_id", &msg.node_id)?,
                         graphql_id: parse_opt_id("graphql_id", msg.graphql_id.as_ref())? })
    }

    fn encode(&self) -> NodeGraphqlMsg {
        NodeGraphqlMsg { node_id: wire(self.node_id),
                         graphql_id: wire_opt(self.graphql_id) }
    }

    fn decode_update(msg: &NodeGraphqlUpdateMsg) -> RpcResult<(Id, NodeGraphqlPatch)> {
        let patch = NodeGraphqlPatch { graphql_id: parse_union_id("graphql_id", msg.graphql_id.as_ref())? };
        Ok((parse_id("node_id", &msg.node_id)?, patch))
    }

    fn encode_update(row: &Self, patch: &NodeGraphqlPatch) -> NodeGraphqlUpdateMsg {
        NodeGraphqlUpdateMsg { node_id: wire(row.node_id),
                               graphql_id: wire_union_id(&patch.graphql_id) }
    }
}

// --- ai provider / ai model -------------------------------------------------

/// Compartido por proveedor y modelo.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiNodeMsg {
    pub node_id: WireId,
    pub credential_id: Option<WireId>,
    pub model: i32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiNodeUpdateMsg {
    pub node_id: WireId,
    pub credential_id: Option<Union<WireId>>,
    pub model: Option<i32>,
    pub temperature: Option<Union<f32>>,
    pub max_tokens: Option<Union<i32>>,
}

fn decode_ai(msg: &AiNodeMsg) -> RpcResult<(Id, AiSettings)> {
    let settings = AiSettings { credential_id: parse_opt_id("credential_id", msg.credential_id.as_ref())?,
                                model: parse_enum::<AiModelKind>("model", msg.model)?,
                                temperature: msg.temperature,
                                max_tokens: opt_non_negative("max_tokens", msg.max_tokens)? };
    Ok((parse_id("node_id", &msg.node_id)?, settings))
}

fn encode_ai(node_id: Id, settings: &AiSettings) -> AiNodeMsg {
    AiNodeMsg { node_id: wire(node_id),
                credential_id: wire_opt(settings.credential_id),
                model: settings.model.as_i32(),
                temperature: settings.temperature,
                max_tokens: settings.max_tokens }
}

fn decode_ai_update(msg: &AiNodeUpdateMsg) -> RpcResult<(Id, AiSettingsPatch)> {
    if let Some(Union::Value(tokens)) = msg.max_tokens {
        non_negative("max_tokens", tokens)?;
    }
    let patch = AiSettingsPatch { credential_id: parse_union_id("credential_id", msg.credential_id.as_ref())?,
                                  model: parse_opt_enum("model", msg.model)?,
                                  temperature: msg.temperature,
                                  max_tokens: msg.max_tokens };
    Ok((parse_id("node_id", &msg.node_id)?, patch))
}

fn encode_ai_update(node_id: Id, patch: &AiSettingsPatch) -> AiNodeUpdateMsg {
    AiNodeUpdateMsg { node_id: wire(node_id),
                      credential_id: wire_union_id(&patch.credential_id),
                      model: patch.model.map(AiModelKind::as_i32),
                      temperature: patch.temperature,
                      max_tokens: patch.max_tokens }
}

impl VariantRpc for NodeAiProvider {
    const NAME: &'static str = "node_ai_provider";

    type Msg = AiNodeMsg;
    type UpdateMsg = AiNodeUpdateMsg;

    fn decode(msg: &AiNodeMsg) -> RpcResult<Self> {
        let (node_id, settings) = decode_ai(msg)?;
        Ok(NodeAiProvider { node_id, settings })
    }

    fn encode(&self) -> AiNodeMsg {
        encode_ai(self.node_id, &self.settings)
    }

    fn decode_update(msg: &AiNodeUpdateMsg) -> RpcResult<(Id, AiSettingsPatch)> {
        decode_ai_update(msg)
    }

    fn encode_update(row: &Self, patch: &AiSettingsPatch) -> AiNodeUpdateMsg {
        encode_ai_update(row.node_id, patch)
    }
}

impl VariantRpc for NodeAiModel {
    const NAME: &'static str = "node_ai_model";

    type Msg = AiNodeMsg;
    type UpdateMsg = AiNodeUpdateMsg;

    fn decode(msg: &AiNodeMsg) -> RpcResult<Self> {
        let (node_id, settings) = decode_ai(msg)?;
        Ok(NodeAiModel { node_id, settings })
    }

    fn encode(&self) -> AiNodeMsg {
        encode_ai(self.node_id, &self.settings)
    }

    fn decode_update(msg: &AiNodeUpdateMsg) -> RpcResult<(Id, AiSettingsPatch)> {
        decode_ai_update(msg)
    }

    fn encode_update(row: &Self, patch: &AiSettingsPatch) -> AiNodeUpdateMsg {
        encode_ai_update(row.node_id, patch)
    }
}

// --- ai memory -------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeAiMemoryMsg {
    pub node_id: WireId,
    pub memory_type: i32,
    pub window_size: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeAiMemoryUpdateMsg {
    pub node_id: WireId,
    pub memory_type: Option<i32>,
    pub window_size: Option<i32>,
}

impl VariantRpc for NodeAiMemory {
    const NAME: &'static str = "node_ai_memory";

    type Msg = NodeAiMemoryMsg;
    type UpdateMsg = NodeAiMemoryUpdateMsg;

    fn decode(msg: &NodeAiMemoryMsg) -> RpcResult<Self> {
        Ok(NodeAiMemory { node_id: parse_id("node_id", &msg.node_id)?,
                          memory_type: parse_enum::<MemoryType>("memory_type", msg.memory_type)?,
                          window_size: non_negative("window_size", msg.window_size)? })
    }

    fn encode(&self) -> NodeAiMemoryMsg {
        NodeAiMemoryMsg { node_id: wire(self.node_id),
                          memory_type: self.memory_type.as_i32(),
                          window_size: self.window_size }
    }

    fn decode_update(msg: &NodeAiMemoryUpdateMsg) -> RpcResult<(Id, NodeAiMemoryPatch)> {
        let patch = NodeAiMemoryPatch { memory_type: parse_opt_enum("memory_type", msg.memory_type)?,
                                        window_size: opt_non_negative("window_size", msg.window_size)? };
        Ok((parse_id("node_id", &msg.node_id)?, patch))
    }

    fn encode_update(row: &Self, patch: &NodeAiMemoryPatch) -> NodeAiMemoryUpdateMsg {
        NodeAiMemoryUpdateMsg { node_id: wire(row.node_id),
                                memory_type: patch.memory_type.map(MemoryType::as_i32),
                                window_size: patch.window_size }
    }
}

// --- métodos RPC -----------------------------------------------------------

macro_rules! variant_rpcs {
    ($($row:ty => $collection:ident, $insert:ident, $update:ident, $delete:ident, $sync:ident;)+) => {
        impl FlowService {
            $(
                pub async fn $collection(&self, ctx: &CallContext) -> RpcResult<Vec<<$row as VariantRpc>::Msg>> {
                    self.variant_collection::<$row>(ctx).await
                }

                pub async fn $insert(&self, ctx: &CallContext, items: Vec<<$row as VariantRpc>::Msg>) -> RpcResult<()> {
                    self.variant_insert::<$row>(ctx, items).await
                }

                pub async fn $update(&self, ctx: &CallContext, items: Vec<<$row as VariantRpc>::UpdateMsg>) -> RpcResult<()> {
                    self.variant_update::<$row>(ctx, items).await
                }

                pub async fn $delete(&self, ctx: &CallContext, items: Vec<SubNodeDeleteItem>) -> RpcResult<()> {
                    self.variant_delete::<$row>(ctx, items).await
                }

                pub async fn $sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<NodeEvent, VariantSyncItem<$row>>> {
                    self.variant_sync::<$row>(ctx).await
                }
            )+
        }
    };
}

variant_rpcs! {
    NodeNoOp => node_noop_collection, node_noop_insert, node_noop_update, node_noop_delete, node_noop_sync;
    NodeHttp => node_http_collection, node_http_insert, node_http_update, node_http_delete, node_http_sync;
    NodeFor => node_for_collection, node_for_insert, node_for_update, node_for_delete, node_for_sync;
    NodeForEach => node_foreach_collection, node_foreach_insert, node_foreach_update, node_foreach_delete, node_foreach_sync;
    NodeCondition => node_condition_collection, node_condition_insert, node_condition_update, node_condition_delete, node_condition_sync;
    NodeJs => node_javascript_collection, node_javascript_insert, node_javascript_update, node_javascript_delete, node_javascript_sync;
    NodeGraphql => node_graphql_collection, node_graphql_insert, node_graphql_update, node_graphql_delete, node_graphql_sync;
    NodeAiProvider => node_ai_provider_collection, node_ai_provider_insert, node_ai_provider_update, node_ai_provider_delete, node_ai_provider_sync;
    NodeAiModel => node_ai_model_collection, node_ai_model_insert, node_ai_model_update, node_ai_model_delete, node_ai_model_sync;
    NodeAiMemory => node_ai_memory_collection, node_ai_memory_insert, node_ai_memory_update, node_ai_memory_delete, node_ai_memory_sync;
}
