#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flow_core::model::{NodeKind, Position, Workspace};
use flow_core::store::{InMemoryStore, Record, RecordKind, Store, Write};
use flow_core::{Id, StoreResult};
use flow_rpc::handlers::{FlowInsertItem, NodeInsertItem};
use flow_rpc::wire::wire;
use flow_rpc::{CallContext, CancelHandle, FlowService, ServiceConfig};

/// Un llamador autenticado. El handle se conserva: soltarlo cancela.
pub struct Caller {
    pub user: Id,
    pub ctx: CallContext,
    pub handle: CancelHandle,
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub service: FlowService,
    pub workspace: Id,
    pub alice: Caller,
}

pub fn caller() -> Caller {
    let user = Id::new();
    let (ctx, handle) = CallContext::authenticated(user);
    Caller { user, ctx, handle }
}

/// Store en memoria con un workspace y un miembro (`alice`).
pub fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let service = FlowService::new(store.clone(), ServiceConfig::default());
    let workspace = store.create_workspace("W1");
    let alice = caller();
    store.add_member(workspace, alice.user);
    Fixture { store,
              service,
              workspace,
              alice }
}

/// Store en memoria cuyo `apply` tarda `delay` antes y después de escribir:
/// deja abierta la ventana entre leer, confirmar y publicar.
pub struct SlowStore {
    inner: Arc<InMemoryStore>,
    delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn workspace(&self, id: Id) -> StoreResult<Option<Workspace>> {
        self.inner.workspace(id).await
    }

    async fn member_workspaces(&self, user_id: Id) -> StoreResult<Vec<Id>> {
        self.inner.member_workspaces(user_id).await
    }

    async fn is_member(&self, user_id: Id, workspace_id: Id) -> StoreResult<bool> {
        self.inner.is_member(user_id, workspace_id).await
    }

    async fn get(&self, kind: RecordKind, id: Id) -> StoreResult<Option<Record>> {
        self.inner.get(kind, id).await
    }

    async fn get_many(&self, kind: RecordKind, ids: &[Id]) -> StoreResult<Vec<Record>> {
        self.inner.get_many(kind, ids).await
    }

    async fn list_by_scope(&self, kind: RecordKind, scopes: &[Id]) -> StoreResult<Vec<Record>> {
        self.inner.list_by_scope(kind, scopes).await
    }

    async fn apply(&self, writes: Vec<Write>) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        let applied = self.inner.apply(writes).await;
        tokio::time::sleep(self.delay).await;
        applied
    }
}

/// Como `fixture`, pero el servicio escribe a través de un `SlowStore`.
/// `store` sigue siendo el store en memoria subyacente.
pub fn slow_fixture(delay: Duration) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let slow = Arc::new(SlowStore { inner: store.clone(),
                                    delay });
    let service = FlowService::new(slow, ServiceConfig::default());
    let workspace = store.create_workspace("W1");
    let alice = caller();
    store.add_member(workspace, alice.user);
    Fixture { store,
              service,
              workspace,
              alice }
}

impl Fixture {
    /// Otro usuario en su propio workspace.
    pub fn outsider(&self) -> (Caller, Id) {
        let bob = caller();
        let workspace = self.store.create_workspace("W2");
        self.store.add_member(workspace, bob.user);
        (bob, workspace)
    }

    pub async fn flow(&self, name: &str) -> Id {
        let id = Id::new();
        self.service
            .flow_insert(&self.alice.ctx,
                         vec![FlowInsertItem { flow_id: Some(wire(id)),
                                               workspace_id: wire(self.workspace),
                                               name: name.into(),
                                               ..Default::default() }])
            .await
            .expect("flow insert");
        id
    }

    pub async fn node(&self, flow_id: Id, kind: NodeKind, name: &str) -> Id {
        let id = Id::new();
        self.service
            .node_insert(&self.alice.ctx,
                         vec![NodeInsertItem { node_id: Some(wire(id)),
                                               flow_id: wire(flow_id),
                                               kind: kind.as_i32(),
                                               name: name.into(),
                                               position: Some(Position { x: 1.0, y: 2.0 }) }])
            .await
            .expect("node insert");
        id
    }
}
