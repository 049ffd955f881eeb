//! Versiones de flow: vista derivada sin escrituras propias. Los eventos los
//! publica el handler de flows sobre el tópico del flow padre.

use flow_core::event::{Change, FlowVersionEvent};

use super::flow::{encode_flow, FlowMsg, FlowSyncItem};
use crate::auth::CallContext;
use crate::error::RpcResult;
use crate::filter::flow_filter;
use crate::service::FlowService;
use crate::sync::SyncStream;

impl FlowService {
    pub async fn flow_version_collection(&self, ctx: &CallContext) -> RpcResult<Vec<FlowMsg>> {
        let flows = self.access(ctx)?.accessible_flows().await?;
        Ok(flows.iter()
                .filter(|flow| flow.is_version())
                .map(FlowMsg::from)
                .collect())
    }

    pub async fn flow_version_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<FlowVersionEvent, FlowSyncItem>> {
        let filter = flow_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.version,
                       "flow_version",
                       filter,
                       move || async move {
                           let flows = self.access(ctx)?.accessible_flows().await?;
                           Ok(flows.into_iter()
                                   .filter(|flow| flow.is_version())
                                   .map(Change::Insert)
                                   .collect())
                       },
                       encode_flow)
            .await
    }
}
