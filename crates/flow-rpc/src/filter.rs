//! Filtros de autorización para suscripciones. Se envuelven en `Memoized`:
//! una vez admitido un tópico no se vuelve a consultar el store.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use flow_core::event::{Admission, Memoized, TopicFilter};
use flow_core::model::Flow;
use flow_core::store::{Store, StoreExt};
use flow_core::Id;

use crate::access::Access;
use crate::error::{RpcError, RpcResult};

/// `NotFound` niega; cualquier otro fallo deja el evento sin decidir y el
/// suscriptor lo ve como descartado.
fn decide(checked: RpcResult<()>, filter: &str, user: Id) -> Admission {
    match checked {
        Ok(()) => Admission::Admit,
        Err(RpcError::NotFound(_)) => Admission::Deny,
        Err(e) => {
            warn!("{filter} filter failed user={user} err={e}");
            Admission::Unknown
        }
    }
}

/// Tópico = workspace.
pub struct WorkspaceAccess {
    store: Arc<dyn Store>,
    user: Id,
}

#[async_trait]
impl TopicFilter<Id> for WorkspaceAccess {
    async fn admits(&self, workspace_id: &Id) -> Admission {
        let checked = Access::new(self.store.as_ref(), self.user).ensure_workspace(*workspace_id)
                                                                 .await;
        decide(checked, "workspace", self.user)
    }
}

/// Tópico = flow.
pub struct FlowAccess {
    store: Arc<dyn Store>,
    user: Id,
}

#[async_trait]
impl TopicFilter<Id> for FlowAccess {
    async fn admits(&self, flow_id: &Id) -> Admission {
        let checked = match self.store.fetch::<Flow>(*flow_id).await {
            Ok(Some(flow)) => {
                Access::new(self.store.as_ref(), self.user).ensure_workspace(flow.workspace_id)
                                                           .await
            }
            Ok(None) => Err(RpcError::NotFound("flow")),
            Err(e) => Err(e.into()),
        };
        decide(checked, "flow", self.user)
    }
}

pub fn workspace_filter(store: Arc<dyn Store>, user: Id) -> Arc<dyn TopicFilter<Id>> {
    Arc::new(Memoized::new(WorkspaceAccess { store, user }))
}

pub fn flow_filter(store: Arc<dyn Store>, user: Id) -> Arc<dyn TopicFilter<Id>> {
    Arc::new(Memoized::new(FlowAccess { store, user }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::store::InMemoryStore;

    #[tokio::test]
    async fn outage_leaves_the_topic_undecided() {
        let store = Arc::new(InMemoryStore::new());
        let user = Id::new();
        let ws = store.create_workspace("W");
        store.add_member(ws, user);
        let filter = WorkspaceAccess { store: store.clone(),
                                       user };
        assert_eq!(filter.admits(&ws).await, Admission::Admit);
        assert_eq!(filter.admits(&Id::new()).await, Admission::Deny);

        store.set_available(false);
        assert_eq!(filter.admits(&ws).await, Admission::Unknown);
        let flows = FlowAccess { store, user };
        assert_eq!(flows.admits(&Id::new()).await, Admission::Unknown);
    }
}
