//! Capa de acceso: ¿puede el llamador observar/modificar esta fila?
//!
//! Un rechazo por permisos se devuelve como `NotFound`, igual que una fila
//! inexistente, para no permitir enumeración.

use std::collections::HashSet;

use log::debug;

use flow_core::model::{Edge, Flow, FlowVariable, Node};
use flow_core::store::{Store, StoreExt};
use flow_core::Id;

use crate::error::{RpcError, RpcResult};

pub struct Access<'a> {
    store: &'a dyn Store,
    user: Id,
}

impl<'a> Access<'a> {
    pub fn new(store: &'a dyn Store, user: Id) -> Self {
        Self { store, user }
    }

    pub fn user(&self) -> Id {
        self.user
    }

    pub async fn ensure_workspace(&self, workspace_id: Id) -> RpcResult<()> {
        if self.store.is_member(self.user, workspace_id).await? {
            return Ok(());
        }
        debug!("access denied user={} workspace={workspace_id}", self.user);
        Err(RpcError::NotFound("workspace"))
    }

    pub async fn ensure_flow(&self, flow_id: Id) -> RpcResult<Flow> {
        self.lookup_flow(flow_id).await?.ok_or(RpcError::NotFound("flow"))
    }

    pub async fn ensure_node(&self, node_id: Id) -> RpcResult<Node> {
        self.lookup_node(node_id).await?.ok_or(RpcError::NotFound("node"))
    }

    pub async fn ensure_edge(&self, edge_id: Id) -> RpcResult<Edge> {
        self.lookup_edge(edge_id).await?.ok_or(RpcError::NotFound("edge"))
    }

    pub async fn ensure_variable(&self, variable_id: Id) -> RpcResult<FlowVariable> {
        self.lookup_variable(variable_id)
            .await?
            .ok_or(RpcError::NotFound("flow variable"))
    }

    /// `Ok(None)` si el flow no existe; `NotFound` si existe pero el llamador
    /// no es miembro de su workspace.
    pub async fn lookup_flow(&self, flow_id: Id) -> RpcResult<Option<Flow>> {
        let Some(flow) = self.store.fetch::<Flow>(flow_id).await? else {
            return Ok(None);
        };
        self.ensure_workspace(flow.workspace_id)
            .await
            .map_err(|_| RpcError::NotFound("flow"))?;
        Ok(Some(flow))
    }

    pub async fn lookup_node(&self, node_id: Id) -> RpcResult<Option<Node>> {
        let Some(node) = self.store.fetch::<Node>(node_id).await? else {
            return Ok(None);
        };
        self.ensure_flow(node.flow_id)
            .await
            .map_err(|_| RpcError::NotFound("node"))?;
        Ok(Some(node))
    }

    pub async fn lookup_edge(&self, edge_id: Id) -> RpcResult<Option<Edge>> {
        let Some(edge) = self.store.fetch::<Edge>(edge_id).await? else {
            return Ok(None);
        };
        self.ensure_flow(edge.flow_id)
            .await
            .map_err(|_| RpcError::NotFound("edge"))?;
        Ok(Some(edge))
    }

    pub async fn lookup_variable(&self, variable_id: Id) -> RpcResult<Option<FlowVariable>> {
        let Some(variable) = self.store.fetch::<FlowVariable>(variable_id).await? else {
            return Ok(None);
        };
        self.ensure_flow(variable.flow_id)
            .await
            .map_err(|_| RpcError::NotFound("flow variable"))?;
        Ok(Some(variable))
    }

    /// Todos los flows (versiones incluidas) de los workspaces del llamador.
    pub async fn accessible_flows(&self) -> RpcResult<Vec<Flow>> {
        let workspaces = self.store.member_workspaces(self.user).await?;
        Ok(self.store.list_scoped::<Flow>(&workspaces).await?)
    }

    pub async fn accessible_flow_ids(&self) -> RpcResult<Vec<Id>> {
        Ok(self.accessible_flows().await?.into_iter().map(|f| f.id).collect())
    }

    pub async fn accessible_nodes(&self) -> RpcResult<Vec<Node>> {
        let flows = self.accessible_flow_ids().await?;
        Ok(self.store.list_scoped::<Node>(&flows).await?)
    }
}

/// Quita ids repetidos conservando el orden de aparición.
pub fn dedup_ids(ids: Vec<Id>) -> Vec<Id> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
