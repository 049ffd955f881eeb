//! Ejecuciones de nodos: sólo lectura desde el cliente.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use serde_json::Value;

use flow_core::codec::decode_json_blob;
use flow_core::event::{Change, ExecutionEvent};
use flow_core::model::{Compression, NodeExecution};
use flow_core::store::StoreExt;
use flow_core::Id;

use crate::auth::CallContext;
use crate::error::RpcResult;
use crate::filter::flow_filter;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{wire, wire_opt, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeExecutionMsg {
    pub node_execution_id: WireId,
    pub node_id: WireId,
    pub name: String,
    pub state: i32,
    pub error: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub response_id: Option<WireId>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Un UPDATE de ejecución lleva la fila completa.
pub type NodeExecutionSyncItem = SyncItem<NodeExecutionMsg, NodeExecutionMsg>;

fn decode_blob(execution: Id, field: &str, data: &[u8], compression: Compression) -> Option<Value> {
    match decode_json_blob(data, compression) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!("execution={execution} {field} blob undecodable: {e}");
            None
        }
    }
}

impl From<&NodeExecution> for NodeExecutionMsg {
    fn from(execution: &NodeExecution) -> Self {
        Self { node_execution_id: wire(execution.id),
               node_id: wire(execution.node_id),
               name: execution.name.clone(),
               state: execution.state.as_i32(),
               error: execution.error.clone(),
               input: decode_blob(execution.id, "input", &execution.input, execution.input_compression),
               output: decode_blob(execution.id, "output", &execution.output, execution.output_compression),
               response_id: wire_opt(execution.response_id),
               completed_at: execution.completed_at }
    }
}

pub fn encode_execution(event: &ExecutionEvent) -> Option<NodeExecutionSyncItem> {
    Some(match event {
             Change::Insert(execution) => SyncItem::Insert(NodeExecutionMsg::from(execution)),
             Change::Update { row, .. } => SyncItem::Update(NodeExecutionMsg::from(row)),
             Change::Delete(execution) => SyncItem::Delete { id: wire(execution.id) },
         })
}

/// Última ejecución (id mayor) de cada nodo, en el orden de los nodos.
fn latest_per_node(node_ids: &[Id], executions: Vec<NodeExecution>) -> Vec<NodeExecution> {
    let mut latest: HashMap<Id, NodeExecution> = HashMap::new();
    for execution in executions {
        match latest.get(&execution.node_id) {
            Some(current) if current.id >= execution.id => {}
            _ => {
                latest.insert(execution.node_id, execution);
            }
        }
    }
    node_ids.iter().filter_map(|id| latest.remove(id)).collect()
}

impl FlowService {
    async fn latest_executions(&self, ctx: &CallContext) -> RpcResult<Vec<NodeExecution>> {
        let node_ids: Vec<Id> = self.access(ctx)?
                                    .accessible_nodes()
                                    .await?
                                    .into_iter()
                                    .map(|node| node.id)
                                    .collect();
        let executions = self.store.list_scoped::<NodeExecution>(&node_ids).await?;
        Ok(latest_per_node(&node_ids, executions))
    }

    pub async fn node_execution_collection(&self, ctx: &CallContext) -> RpcResult<Vec<NodeExecutionMsg>> {
        let executions = self.latest_executions(ctx).await?;
        Ok(executions.iter().map(NodeExecutionMsg::from).collect())
    }

    pub async fn node_execution_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<ExecutionEvent, NodeExecutionSyncItem>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.execution,
                       "node_execution",
                       filter,
                       move || async move {
                           let executions = self.latest_executions(ctx).await?;
                           Ok(executions.into_iter().map(Change::Insert).collect())
                       },
                       encode_execution)
            .await
    }
}
