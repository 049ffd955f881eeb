//! Maquinaria común de las sub-filas de nodo.
//!
//! Cada variante declara su forma de cable implementando [`VariantRpc`]; los
//! handlers genéricos de este módulo hacen el resto. Todo cambio sobre una
//! sub-fila publica su propio evento seguido de un UPDATE del nodo base para
//! que el cliente vuelva a pedir el nodo.

use std::fmt::Debug;

use log::debug;
use serde::Serialize;

use flow_core::event::{Change, NodeEvent};
use flow_core::model::{Node, NodePatch, Patch, SubNode};
use flow_core::store::StoreExt;
use flow_core::Id;

use crate::access::dedup_ids;
use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::filter::flow_filter;
use crate::mutation::MutationContext;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{parse_id, wire, WireId};

/// Forma de cable de una sub-fila.
pub trait VariantRpc: SubNode {
    /// Nombre usado en errores y logs.
    const NAME: &'static str;

    type Msg: Clone + Debug + PartialEq + Serialize + Send + Sync + 'static;
    type UpdateMsg: Clone + Debug + PartialEq + Serialize + Send + Sync + 'static;

    fn decode(msg: &Self::Msg) -> RpcResult<Self>;
    fn encode(&self) -> Self::Msg;
    /// Id del nodo más el patch pedido.
    fn decode_update(msg: &Self::UpdateMsg) -> RpcResult<(Id, Self::Patch)>;
    fn encode_update(row: &Self, patch: &Self::Patch) -> Self::UpdateMsg;
}

pub type VariantSyncItem<V> = SyncItem<<V as VariantRpc>::Msg, <V as VariantRpc>::UpdateMsg>;

#[derive(Debug, Clone, Default)]
pub struct SubNodeDeleteItem {
    pub node_id: WireId,
}

/// Eventos de otras variantes (y del nodo base) no producen mensaje.
pub fn encode_variant<V: VariantRpc>(event: &NodeEvent) -> Option<VariantSyncItem<V>> {
    V::from_event(event).map(|change| match change {
                            Change::Insert(row) => SyncItem::Insert(row.encode()),
                            Change::Update { row, patch } => SyncItem::Update(V::encode_update(row, patch)),
                            Change::Delete(row) => SyncItem::Delete { id: wire(row.node_id()) },
                        })
}

/// UPDATE vacío del nodo base; el mensaje resultante lleva igualmente `state`.
pub(crate) fn touch_base(mutation: &mut MutationContext, node: &Node) {
    mutation.track(Published::Node(node.flow_id,
                                   NodeEvent::Base(Change::Update { row: node.clone(),
                                                                    patch: NodePatch::default() })));
}

/// Ejecuta `$body` con `$v` ligado al tipo de sub-fila de `$kind`.
/// Devuelve `None` para `NodeKind::Unspecified`.
macro_rules! dispatch_variant {
    ($kind:expr, $v:ident => $body:expr) => {
        match $kind {
            ::flow_core::model::NodeKind::Unspecified => None,
            ::flow_core::model::NodeKind::NoOp => {
                type $v = ::flow_core::model::NodeNoOp;
                Some($body)
            }
            ::flow_core::model::NodeKind::Http => {
                type $v = ::flow_core::model::NodeHttp;
                Some($body)
            }
            ::flow_core::model::NodeKind::Condition => {
                type $v = ::flow_core::model::NodeCondition;
                Some($body)
            }
            ::flow_core::model::NodeKind::For => {
                type $v = ::flow_core::model::NodeFor;
                Some($body)
            }
            ::flow_core::model::NodeKind::ForEach => {
                type $v = ::flow_core::model::NodeForEach;
                Some($body)
            }
            ::flow_core::model::NodeKind::JavaScript => {
                type $v = ::flow_core::model::NodeJs;
                Some($body)
            }
            ::flow_core::model::NodeKind::Graphql => {
                type $v = ::flow_core::model::NodeGraphql;
                Some($body)
            }
            ::flow_core::model::NodeKind::AiProvider => {
                type $v = ::flow_core::model::NodeAiProvider;
                Some($body)
            }
            ::flow_core::model::NodeKind::AiModel => {
                type $v = ::flow_core::model::NodeAiModel;
                Some($body)
            }
            ::flow_core::model::NodeKind::AiMemory => {
                type $v = ::flow_core::model::NodeAiMemory;
                Some($body)
            }
        }
    };
}

pub(crate) use dispatch_variant;

impl FlowService {
    pub(crate) async fn variant_collection<V: VariantRpc>(&self, ctx: &CallContext) -> RpcResult<Vec<V::Msg>> {
        let rows = self.visible_variant_rows::<V>(ctx).await?;
        debug!("{}_collection count={}", V::NAME, rows.len());
        Ok(rows.iter().map(V::encode).collect())
    }

    async fn visible_variant_rows<V: VariantRpc>(&self, ctx: &CallContext) -> RpcResult<Vec<V>> {
        let node_ids: Vec<Id> = self.access(ctx)?
                                    .accessible_nodes()
                                    .await?
                                    .into_iter()
                                    .filter(|node| node.kind == V::NODE_KIND)
                                    .map(|node| node.id)
                                    .collect();
        Ok(self.store.fetch_many::<V>(&node_ids).await?)
    }

    /// Alta de sub-filas. Se acepta aunque el nodo base todavía no exista: la
    /// fila queda guardada sin evento y se anuncia al insertar el nodo.
    pub(crate) async fn variant_insert<V: VariantRpc>(&self, ctx: &CallContext, items: Vec<V::Msg>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let rows = items.iter().map(V::decode).collect::<RpcResult<Vec<V>>>()?;
        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let base = access.lookup_node(row.node_id()).await?;
            if let Some(node) = &base {
                if node.kind != V::NODE_KIND {
                    return Err(RpcError::invalid(format!("node kind does not accept {}", V::NAME)));
                }
            }
            batch.push((row, base));
        }

        let mut mutation = self.begin(ctx).await?;
        for (row, base) in batch {
            mutation.tx().insert(row.clone());
            match base {
                Some(node) => {
                    mutation.track(Published::Node(node.flow_id, V::into_event(Change::Insert(row))));
                    touch_base(&mut mutation, &node);
                }
                None => debug!("{} insert without base node={}", V::NAME, row.node_id()),
            }
        }
        mutation.commit().await
    }

    pub(crate) async fn variant_update<V: VariantRpc>(&self, ctx: &CallContext, items: Vec<V::UpdateMsg>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let patches = items.iter()
                           .map(V::decode_update)
                           .collect::<RpcResult<Vec<_>>>()?;
        let mut batch = Vec::with_capacity(patches.len());
        for (node_id, patch) in patches {
            let node = access.ensure_node(node_id).await?;
            if self.store.fetch::<V>(node_id).await?.is_none() {
                return Err(RpcError::NotFound(V::NAME));
            }
            batch.push((node, patch));
        }

        let mut mutation = self.begin(ctx).await?;
        for (node, patch) in batch {
            if patch.is_empty() {
                continue;
            }
            let Some(old) = mutation.tx().get::<V>(node.id).await? else {
                return Err(RpcError::NotFound(V::NAME));
            };
            let mut row = old.clone();
            patch.apply(&mut row);
            if V::REPLACE_ON_UPDATE {
                mutation.tx().delete::<V>(node.id);
                mutation.tx().insert(row.clone());
                mutation.track(Published::Node(node.flow_id, V::into_event(Change::Delete(old))));
                mutation.track(Published::Node(node.flow_id, V::into_event(Change::Insert(row))));
            } else {
                mutation.tx().update(&old, row.clone())?;
                mutation.track(Published::Node(node.flow_id, V::into_event(Change::Update { row, patch })));
            }
            touch_base(&mut mutation, &node);
        }
        mutation.commit().await
    }

    /// Sin nodo base o sin sub-fila no hay nada que borrar.
    pub(crate) async fn variant_delete<V: VariantRpc>(&self, ctx: &CallContext, items: Vec<SubNodeDeleteItem>) -> RpcResult<()> {
        let access = self.access(ctx)?;
        let ids = items.iter()
                       .map(|item| parse_id("node_id", &item.node_id))
                       .collect::<RpcResult<Vec<_>>>()?;
        let mut batch = Vec::new();
        for node_id in dedup_ids(ids) {
            let Some(node) = access.lookup_node(node_id).await? else {
                debug!("{} delete skip missing node={node_id}", V::NAME);
                continue;
            };
            if let Some(row) = self.store.fetch::<V>(node_id).await? {
                batch.push((node, row));
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        let mut mutation = self.begin(ctx).await?;
        for (node, row) in batch {
            mutation.tx().delete::<V>(node.id);
            mutation.track(Published::Node(node.flow_id, V::into_event(Change::Delete(row))));
            touch_base(&mut mutation, &node);
        }
        mutation.commit().await
    }

    pub(crate) async fn variant_sync<V: VariantRpc>(&self, ctx: &CallContext) -> RpcResult<SyncStream<NodeEvent, VariantSyncItem<V>>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.node,
                       V::NAME,
                       filter,
                       move || async move {
                           let rows = self.visible_variant_rows::<V>(ctx).await?;
                           Ok(rows.into_iter()
                                  .map(|row| V::into_event(Change::Insert(row)))
                                  .collect())
                       },
                       encode_variant::<V>)
            .await
    }
}

/// Si ya existe una sub-fila para `node`, registra su INSERT (se publica
/// antes que el del nodo base).
pub(crate) async fn announce_sub_row<V: VariantRpc>(mutation: &mut MutationContext, node: &Node) -> RpcResult<()> {
    if let Some(row) = mutation.tx().get::<V>(node.id).await? {
        mutation.track(Published::Node(node.flow_id, V::into_event(Change::Insert(row))));
    }
    Ok(())
}

/// Borra la sub-fila de `node` si existe y registra su DELETE.
pub(crate) async fn remove_sub_row<V: VariantRpc>(mutation: &mut MutationContext, node: &Node) -> RpcResult<()> {
    if let Some(row) = mutation.tx().get::<V>(node.id).await? {
        mutation.tx().delete::<V>(node.id);
        mutation.track(Published::Node(node.flow_id, V::into_event(Change::Delete(row))));
    }
    Ok(())
}

/// Copia la sub-fila de `from` (si existe) sobre el nodo `to`.
pub(crate) async fn copy_sub_row<V: VariantRpc>(mutation: &mut MutationContext, from: &Node, to: &Node) -> RpcResult<()> {
    if let Some(row) = mutation.tx().get::<V>(from.id).await? {
        let row = row.with_node_id(to.id);
        mutation.tx().insert(row.clone());
        mutation.track(Published::Node(to.flow_id, V::into_event(Change::Insert(row))));
    }
    Ok(())
}
