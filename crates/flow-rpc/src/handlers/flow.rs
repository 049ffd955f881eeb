//! Flows: colección, alta (con nodo Start), cambios, bajas, duplicado y sync.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use flow_core::constants::{DUPLICATE_PREFIX, START_NODE_NAME};
use flow_core::event::{Change, FlowEvent, NodeEvent};
use flow_core::model::{Edge, Flow, FlowPatch, FlowVariable, NoOpKind, Node, NodeKind, NodeNoOp, NodeState, Patch, Position, Union};
use flow_core::store::StoreExt;
use flow_core::Id;

use super::variant::{copy_sub_row, dispatch_variant};
use crate::access::dedup_ids;
use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::filter::workspace_filter;
use crate::mutation::MutationContext;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{given_or_new, opt_name, parse_id, parse_opt_id, required_name, wire, wire_opt, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowMsg {
    pub flow_id: WireId,
    pub workspace_id: WireId,
    pub name: String,
    pub running: bool,
    pub duration: Option<i32>,
    pub version_parent_id: Option<WireId>,
}

impl From<&Flow> for FlowMsg {
    fn from(flow: &Flow) -> Self {
        Self { flow_id: wire(flow.id),
               workspace_id: wire(flow.workspace_id),
               name: flow.name.clone(),
               running: flow.running,
               duration: flow.duration,
               version_parent_id: wire_opt(flow.version_parent_id) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowUpdateMsg {
    pub flow_id: WireId,
    pub name: Option<String>,
    pub duration: Option<Union<i32>>,
    pub running: Option<bool>,
}

pub type FlowSyncItem = SyncItem<FlowMsg, FlowUpdateMsg>;

#[derive(Debug, Clone, Default)]
pub struct FlowInsertItem {
    /// Si falta, el servidor emite uno.
    pub flow_id: Option<WireId>,
    pub workspace_id: WireId,
    pub name: String,
    pub duration: Option<i32>,
    pub version_parent_id: Option<WireId>,
}

#[derive(Debug, Clone, Default)]
pub struct FlowUpdateItem {
    pub flow_id: WireId,
    pub name: Option<String>,
    pub duration: Option<Union<i32>>,
}

#[derive(Debug, Clone, Default)]
pub struct FlowDeleteItem {
    pub flow_id: WireId,
}

#[derive(Debug, Clone, Default)]
pub struct FlowDuplicateItem {
    pub flow_id: WireId,
}

/// Compartido por los buses de flow y de versiones.
pub fn encode_flow(event: &FlowEvent) -> Option<FlowSyncItem> {
    Some(match event {
             Change::Insert(flow) => SyncItem::Insert(FlowMsg::from(flow)),
             Change::Update { row, patch } => SyncItem::Update(FlowUpdateMsg { flow_id: wire(row.id),
                                                                              name: patch.name.clone(),
                                                                              duration: patch.duration,
                                                                              running: patch.running }),
             Change::Delete(flow) => SyncItem::Delete { id: wire(flow.id) },
         })
}

/// Registra el evento de flow y, si es una versión, el del bus de versiones.
pub(crate) fn track_flow(mutation: &mut MutationContext, change: FlowEvent) {
    let flow = change.row();
    let (workspace_id, parent) = (flow.workspace_id, flow.version_parent_id);
    match parent {
        Some(parent) => {
            mutation.track(Published::Flow(workspace_id, change.clone()));
            mutation.track(Published::Version(parent, change));
        }
        None => mutation.track(Published::Flow(workspace_id, change)),
    }
}

fn insert_with_start(mutation: &mut MutationContext, flow: Flow, now: DateTime<Utc>) {
    let start = Node { id: Id::new(),
                       flow_id: flow.id,
                       kind: NodeKind::NoOp,
                       name: START_NODE_NAME.to_string(),
                       position: Position::default(),
                       state: NodeState::Unspecified };
    let noop = NodeNoOp { node_id: start.id,
                          kind: NoOpKind::Start };
    let tx = mutation.tx();
    tx.insert(flow.clone());
    tx.insert(start.clone());
    tx.insert(noop.clone());
    if !flow.is_version() {
        tx.adjust_workspace(flow.workspace_id, 1, now);
    }
    mutation.track(Published::Node(flow.id, NodeEvent::NoOp(Change::Insert(noop))));
    mutation.track(Published::Node(flow.id, NodeEvent::Base(Change::Insert(start))));
    track_flow(mutation, Change::Insert(flow));
}

impl FlowService {
    pub async fn flow_collection(&self, ctx: &CallContext) -> RpcResult<Vec<FlowMsg>> {
        let flows = self.access(ctx)?.accessible_flows().await?;
        debug!("flow_collection count={}", flows.len());
        Ok(flows.iter().map(FlowMsg::from).collect())
    }

    pub async fn flow_insert(&self, ctx: &CallContext, items: Vec<FlowInsertItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut flows = Vec::with_capacity(items.len());
        for item in &items {
            flows.push(Flow { id: given_or_new("flow_id", item.flow_id.as_ref())?,
                              workspace_id: parse_id("workspace_id", &item.workspace_id)?,
                              name: required_name("name", &item.name)?,
                              running: false,
                              duration: item.duration,
                              version_parent_id: parse_opt_id("version_parent_id", item.version_parent_id.as_ref())? });
        }
        for flow in &flows {
            access.ensure_workspace(flow.workspace_id).await?;
            if let Some(parent_id) = flow.version_parent_id {
                let parent = access.ensure_flow(parent_id).await?;
                if parent.workspace_id != flow.workspace_id {
                    return Err(RpcError::invalid("version parent belongs to another workspace"));
                }
            }
        }

        let mut mutation = self.begin(ctx).await?;
        let now = Utc::now();
        for flow in flows {
            insert_with_start(&mut mutation, flow, now);
        }
        mutation.commit().await
    }

    pub async fn flow_update(&self, ctx: &CallContext, items: Vec<FlowUpdateItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let mut patches = Vec::with_capacity(items.len());
        for item in &items {
            let patch = FlowPatch { name: opt_name("name", item.name.as_ref())?,
                                    duration: item.duration,
                                    running: None };
            patches.push((parse_id("flow_id", &item.flow_id)?, patch));
        }
        for (flow_id, _) in &patches {
            access.ensure_flow(*flow_id).await?;
        }

        let mut mutation = self.begin(ctx).await?;
        for (flow_id, patch) in patches {
            if patch.is_empty() {
                continue;
            }
            let Some(before) = mutation.tx().get::<Flow>(flow_id).await? else {
                return Err(RpcError::NotFound("flow"));
            };
            let mut flow = before.clone();
            patch.apply(&mut flow);
            mutation.tx().update(&before, flow.clone())?;
            track_flow(&mut mutation, Change::Update { row: flow, patch });
        }
        mutation.commit().await
    }

    pub async fn flow_delete(&self, ctx: &CallContext, items: Vec<FlowDeleteItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let ids = items.iter()
                       .map(|item| parse_id("flow_id", &item.flow_id))
                       .collect::<RpcResult<Vec<_>>>()?;
        let mut targets = Vec::new();
        for id in dedup_ids(ids) {
            match access.lookup_flow(id).await? {
                Some(flow) => targets.push(flow),
                None => debug!("flow_delete skip missing flow={id}"),
            }
        }
        if targets.is_empty() {
            return Ok(());
        }

        let mut mutation = self.begin(ctx).await?;
        let now = Utc::now();
        for flow in targets {
            mutation.tx().delete::<Flow>(flow.id);
            if !flow.is_version() {
                mutation.tx().adjust_workspace(flow.workspace_id, -1, now);
            }
            track_flow(&mut mutation, Change::Delete(flow));
        }
        mutation.commit().await
    }

    /// Copia el flow con sus nodos (base y sub-fila), aristas (reapuntadas a
    /// los nodos copiados) y variables. Devuelve el flow nuevo.
    pub async fn flow_duplicate(&self, ctx: &CallContext, item: FlowDuplicateItem) -> RpcResult<FlowMsg> {
        let access = self.access(ctx)?;
        let source = access.ensure_flow(parse_id("flow_id", &item.flow_id)?).await?;
        let store = self.store.as_ref();
        let nodes = store.list_scoped::<Node>(&[source.id]).await?;
        let edges = store.list_scoped::<Edge>(&[source.id]).await?;
        let variables = store.list_scoped::<FlowVariable>(&[source.id]).await?;

        let copy = Flow { id: Id::new(),
                          workspace_id: source.workspace_id,
                          name: format!("{DUPLICATE_PREFIX}{}", source.name),
                          running: false,
                          duration: None,
                          version_parent_id: None };

        let mut mutation = self.begin(ctx).await?;
        mutation.tx().insert(copy.clone());
        mutation.tx().adjust_workspace(copy.workspace_id, 1, Utc::now());

        let mut remap = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let cloned = Node { id: Id::new(),
                                flow_id: copy.id,
                                state: NodeState::Unspecified,
                                ..node.clone() };
            remap.insert(node.id, cloned.id);
            dispatch_variant!(node.kind, V => copy_sub_row::<V>(&mut mutation, &node, &cloned).await?);
            mutation.tx().insert(cloned.clone());
            mutation.track(Published::Node(copy.id, NodeEvent::Base(Change::Insert(cloned))));
        }
        for edge in edges {
            let cloned = Edge { id: Id::new(),
                                flow_id: copy.id,
                                source_id: remap.get(&edge.source_id).copied().unwrap_or(edge.source_id),
                                target_id: remap.get(&edge.target_id).copied().unwrap_or(edge.target_id),
                                source_handle: edge.source_handle,
                                state: NodeState::Unspecified };
            mutation.tx().insert(cloned.clone());
            mutation.track(Published::Edge(copy.id, Change::Insert(cloned)));
        }
        for variable in variables {
            let cloned = FlowVariable { id: Id::new(),
                                        flow_id: copy.id,
                                        ..variable };
            mutation.tx().insert(cloned.clone());
            mutation.track(Published::Variable(copy.id, Change::Insert(cloned)));
        }
        mutation.track(Published::Flow(copy.workspace_id, Change::Insert(copy.clone())));
        mutation.commit().await?;
        debug!("flow_duplicate source={} copy={}", source.id, copy.id);
        Ok(FlowMsg::from(&copy))
    }

    pub async fn flow_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<FlowEvent, FlowSyncItem>> {
        let filter = workspace_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.flow,
                       "flow",
                       filter,
                       move || async move {
                           let flows = self.access(ctx)?.accessible_flows().await?;
                           Ok(flows.into_iter().map(Change::Insert).collect())
                       },
                       encode_flow)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_message_carries_only_the_patch() {
        let flow = Flow { id: Id::new(),
                          workspace_id: Id::new(),
                          name: "F".into(),
                          running: true,
                          duration: None,
                          version_parent_id: None };
        let patch = FlowPatch { duration: Some(Union::Unset),
                                ..Default::default() };
        let item = encode_flow(&Change::Update { row: flow.clone(),
                                                 patch })
            .unwrap();
        let update = item.as_update().unwrap();
        assert_eq!(update.flow_id, wire(flow.id));
        assert_eq!(update.name, None);
        assert_eq!(update.duration, Some(Union::Unset));
        assert!(encode_flow(&Change::Delete(flow)).unwrap().is_delete());
    }
}
