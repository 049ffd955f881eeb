//! Nodos base. Las sub-filas de cada tipo viven en `variants.rs`.

use log::debug;
use serde::Serialize;

use flow_core::event::{Change, NodeEvent};
use flow_core::model::{Node, NodeKind, NodePatch, NodeState, Patch, Position};
use flow_core::Id;

use super::variant::{announce_sub_row, dispatch_variant, remove_sub_row};
use crate::access::dedup_ids;
use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::filter::flow_filter;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{given_or_new, parse_enum, parse_id, parse_opt_enum, parse_opt_id, wire, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMsg {
    pub node_id: WireId,
    pub flow_id: WireId,
    pub kind: i32,
    pub name: String,
    pub position: Position,
    pub state: i32,
}

impl From<&Node> for NodeMsg {
    fn from(node: &Node) -> Self {
        Self { node_id: wire(node.id),
               flow_id: wire(node.flow_id),
               kind: node.kind.as_i32(),
               name: node.name.clone(),
               position: node.position,
               state: node.state.as_i32() }
    }
}

/// `state` viaja siempre, aunque sea `Unspecified`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeUpdateMsg {
    pub node_id: WireId,
    pub name: Option<String>,
    pub position: Option<Position>,
    pub state: i32,
}

pub type NodeSyncItem = SyncItem<NodeMsg, NodeUpdateMsg>;

#[derive(Debug, Clone, Default)]
pub struct NodeInsertItem {
    pub node_id: Option<WireId>,
    pub flow_id: WireId,
    pub kind: i32,
    pub name: String,
    pub position: Option<Position>,
}

/// `flow_id` y `kind` sólo se aceptan si no cambian.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdateItem {
    pub node_id: WireId,
    pub flow_id: Option<WireId>,
    pub kind: Option<i32>,
    pub name: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeDeleteItem {
    pub node_id: WireId,
}

/// Sólo eventos del nodo base; los de sub-filas van por su propio stream.
pub fn encode_node(event: &NodeEvent) -> Option<NodeSyncItem> {
    let NodeEvent::Base(change) = event else {
        return None;
    };
    Some(match change {
             Change::Insert(node) => SyncItem::Insert(NodeMsg::from(node)),
             Change::Update { row, patch } => SyncItem::Update(NodeUpdateMsg { node_id: wire(row.id),
                                                                              name: patch.name.clone(),
                                                                              position: patch.position,
                                                                              state: row.state.as_i32() }),
             Change::Delete(node) => SyncItem::Delete { id: wire(node.id) },
         })
}

impl FlowService {
    pub async fn node_collection(&self, ctx: &CallContext) -> RpcResult<Vec<NodeMsg>> {
        let nodes = self.access(ctx)?.accessible_nodes().await?;
        Ok(nodes.iter().map(NodeMsg::from).collect())
    }

    pub async fn node_insert(&self, ctx: &CallContext, items: Vec<NodeInsertItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut nodes = Vec::with_capacity(items.len());
        for item in &items {
            let kind = parse_enum::<NodeKind>("kind", item.kind)?;
            if kind == NodeKind::Unspecified {
                return Err(RpcError::invalid("kind is required"));
            }
            nodes.push(Node { id: given_or_new("node_id", item.node_id.as_ref())?,
                              flow_id: parse_id("flow_id", &item.flow_id)?,
                              kind,
                              name: item.name.clone(),
                              position: item.position.unwrap_or_default(),
                              state: NodeState::Unspecified });
        }
        for node in &nodes {
            access.ensure_flow(node.flow_id).await?;
        }

        let mut mutation = self.begin(ctx).await?;
        for node in nodes {
            mutation.tx().insert(node.clone());
            dispatch_variant!(node.kind, V => announce_sub_row::<V>(&mut mutation, &node).await?);
            mutation.track(Published::Node(node.flow_id, NodeEvent::Base(Change::Insert(node))));
        }
        mutation.commit().await
    }

    pub async fn node_update(&self, ctx: &CallContext, items: Vec<NodeUpdateItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in &items {
            let node_id = parse_id("node_id", &item.node_id)?;
            let flow_id = parse_opt_id("flow_id", item.flow_id.as_ref())?;
            let kind = parse_opt_enum::<NodeKind>("kind", item.kind)?;
            let patch = NodePatch { name: item.name.clone(),
                                    position: item.position,
                                    state: None };
            decoded.push((node_id, flow_id, kind, patch));
        }
        let mut batch = Vec::with_capacity(decoded.len());
        for (node_id, flow_id, kind, patch) in decoded {
            let node = access.ensure_node(node_id).await?;
            if kind.is_some_and(|k| k != node.kind) {
                return Err(RpcError::invalid("node kind cannot change"));
            }
            if flow_id.is_some_and(|f| f != node.flow_id) {
                return Err(RpcError::invalid("node cannot move to another flow"));
            }
            batch.push((node_id, patch));
        }

        let mut mutation = self.begin(ctx).await?;
        for (node_id, patch) in batch {
            if patch.is_empty() {
                continue;
            }
            let Some(before) = mutation.tx().get::<Node>(node_id).await? else {
                return Err(RpcError::NotFound("node"));
            };
            let mut node = before.clone();
            patch.apply(&mut node);
            mutation.tx().update(&before, node.clone())?;
            mutation.track(Published::Node(node.flow_id, NodeEvent::Base(Change::Update { row: node, patch })));
        }
        mutation.commit().await
    }

    /// Borra el nodo y su sub-fila; el DELETE de la sub-fila sale primero.
    pub async fn node_delete(&self, ctx: &CallContext, items: Vec<NodeDeleteItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let ids = items.iter()
                       .map(|item| parse_id("node_id", &item.node_id))
                       .collect::<RpcResult<Vec<Id>>>()?;
        let mut targets = Vec::new();
        for id in dedup_ids(ids) {
            match access.lookup_node(id).await? {
                Some(node) => targets.push(node),
                None => debug!("node_delete skip missing node={id}"),
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut mutation = self.begin(ctx).await?;
        for node in targets {
            dispatch_variant!(node.kind, V => remove_sub_row::<V>(&mut mutation, &node).await?);
            mutation.tx().delete::<Node>(node.id);
            mutation.track(Published::Node(node.flow_id, NodeEvent::Base(Change::Delete(node))));
        }
        mutation.commit().await
    }

    pub async fn node_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<NodeEvent, NodeSyncItem>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.node,
                       "node",
                       filter,
                       move || async move {
                           let nodes = self.access(ctx)?.accessible_nodes().await?;
                           Ok(nodes.into_iter()
                                   .map(|node| NodeEvent::Base(Change::Insert(node)))
                                   .collect())
                       },
                       encode_node)
            .await
    }
}
