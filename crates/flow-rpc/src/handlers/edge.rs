//! Aristas. Origen y destino no se validan contra el store.

use log::debug;
use serde::Serialize;

use flow_core::event::{Change, EdgeEvent};
use flow_core::model::{Edge, EdgePatch, HandleKind, NodeState, Patch};
use flow_core::store::StoreExt;

use crate::access::dedup_ids;
use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::filter::flow_filter;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{given_or_new, parse_enum, parse_id, parse_opt_enum, parse_opt_id, wire, wire_opt, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeMsg {
    pub edge_id: WireId,
    pub flow_id: WireId,
    pub source_id: WireId,
    pub target_id: WireId,
    pub source_handle: i32,
    pub state: i32,
}

impl From<&Edge> for EdgeMsg {
    fn from(edge: &Edge) -> Self {
        Self { edge_id: wire(edge.id),
               flow_id: wire(edge.flow_id),
               source_id: wire(edge.source_id),
               target_id: wire(edge.target_id),
               source_handle: edge.source_handle.as_i32(),
               state: edge.state.as_i32() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeUpdateMsg {
    pub edge_id: WireId,
    pub source_id: Option<WireId>,
    pub target_id: Option<WireId>,
    pub source_handle: Option<i32>,
    pub state: i32,
}

pub type EdgeSyncItem = SyncItem<EdgeMsg, EdgeUpdateMsg>;

#[derive(Debug, Clone, Default)]
pub struct EdgeInsertItem {
    pub edge_id: Option<WireId>,
    pub flow_id: WireId,
    pub source_id: WireId,
    pub target_id: WireId,
    pub source_handle: i32,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeUpdateItem {
    pub edge_id: WireId,
    pub flow_id: Option<WireId>,
    pub source_id: Option<WireId>,
    pub target_id: Option<WireId>,
    pub source_handle: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeDeleteItem {
    pub edge_id: WireId,
}

pub fn encode_edge(event: &EdgeEvent) -> Option<EdgeSyncItem> {
    Some(match event {
             Change::Insert(edge) => SyncItem::Insert(EdgeMsg::from(edge)),
             Change::Update { row, patch } => SyncItem::Update(EdgeUpdateMsg { edge_id: wire(row.id),
                                                                              source_id: wire_opt(patch.source_id),
                                                                              target_id: wire_opt(patch.target_id),
                                                                              source_handle: patch.source_handle.map(HandleKind::as_i32),
                                                                              state: row.state.as_i32() }),
             Change::Delete(edge) => SyncItem::Delete { id: wire(edge.id) },
         })
}

impl FlowService {
    pub async fn edge_collection(&self, ctx: &CallContext) -> RpcResult<Vec<EdgeMsg>> {
        let flows = self.access(ctx)?.accessible_flow_ids().await?;
        let edges = self.store.list_scoped::<Edge>(&flows).await?;
        Ok(edges.iter().map(EdgeMsg::from).collect())
    }

    pub async fn edge_insert(&self, ctx: &CallContext, items: Vec<EdgeInsertItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut edges = Vec::with_capacity(items.len());
        for item in &items {
            edges.push(Edge { id: given_or_new("edge_id", item.edge_id.as_ref())?,
                              flow_id: parse_id("flow_id", &item.flow_id)?,
                              source_id: parse_id("source_id", &item.source_id)?,
                              target_id: parse_id("target_id", &item.target_id)?,
                              source_handle: parse_enum::<HandleKind>("source_handle", item.source_handle)?,
                              state: NodeState::Unspecified });
        }
        for edge in &edges {
            access.ensure_flow(edge.flow_id).await?;
        }

        let mut mutation = self.begin(ctx).await?;
        for edge in edges {
            mutation.tx().insert(edge.clone());
            mutation.track(Published::Edge(edge.flow_id, Change::Insert(edge)));
        }
        mutation.commit().await
    }

    pub async fn edge_update(&self, ctx: &CallContext, items: Vec<EdgeUpdateItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in &items {
            let patch = EdgePatch { source_id: parse_opt_id("source_id", item.source_id.as_ref())?,
                                    target_id: parse_opt_id("target_id", item.target_id.as_ref())?,
                                    source_handle: parse_opt_enum("source_handle", item.source_handle)?,
                                    state: None };
            decoded.push((parse_id("edge_id", &item.edge_id)?, parse_opt_id("flow_id", item.flow_id.as_ref())?, patch));
        }
        let mut batch = Vec::with_capacity(decoded.len());
        for (edge_id, flow_id, patch) in decoded {
            let edge = access.ensure_edge(edge_id).await?;
            if flow_id.is_some_and(|f| f != edge.flow_id) {
                return Err(RpcError::invalid("edge cannot move to another flow"));
            }
            batch.push((edge_id, patch));
        }

        let mut mutation = self.begin(ctx).await?;
        for (edge_id, patch) in batch {
            if patch.is_empty() {
                continue;
            }
            let Some(before) = mutation.tx().get::<Edge>(edge_id).await? else {
                return Err(RpcError::NotFound("edge"));
            };
            let mut edge = before.clone();
            patch.apply(&mut edge);
            mutation.tx().update(&before, edge.clone())?;
            mutation.track(Published::Edge(edge.flow_id, Change::Update { row: edge, patch }));
        }
        mutation.commit().await
    }

    pub async fn edge_delete(&self, ctx: &CallContext, items: Vec<EdgeDeleteItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let ids = items.iter()
                       .map(|item| parse_id("edge_id", &item.edge_id))
                       .collect::<RpcResult<Vec<_>>>()?;
        let mut targets = Vec::new();
        for id in dedup_ids(ids) {
            match access.lookup_edge(id).await? {
                Some(edge) => targets.push(edge),
                None => debug!("edge_delete skip missing edge={id}"),
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut mutation = self.begin(ctx).await?;
        for edge in targets {
            mutation.tx().delete::<Edge>(edge.id);
            mutation.track(Published::Edge(edge.flow_id, Change::Delete(edge)));
        }
        mutation.commit().await
    }

    pub async fn edge_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<EdgeEvent, EdgeSyncItem>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.edge,
                       "edge",
                       filter,
                       move || async move {
                           let flows = self.access(ctx)?.accessible_flow_ids().await?;
                           let edges = self.store.list_scoped::<Edge>(&flows).await?;
                           Ok(edges.into_iter().map(Change::Insert).collect())
                       },
                       encode_edge)
            .await
    }
}
