//! Respuestas HTTP capturadas por el motor de ejecución.

use chrono::{DateTime, Utc};
use serde::Serialize;

use flow_core::event::{Change, HttpResponseEvent};
use flow_core::model::HttpResponse;
use flow_core::store::StoreExt;

use crate::auth::CallContext;
use crate::error::RpcResult;
use crate::filter::workspace_filter;
use crate::service::FlowService;
use crate::sync::{SyncItem, SyncStream};
use crate::wire::{wire, WireId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponseMsg {
    pub http_response_id: WireId,
    pub http_id: WireId,
    pub status: i32,
    pub body: Vec<u8>,
    pub time: DateTime<Utc>,
    pub duration: i32,
    pub size: i32,
}

impl From<&HttpResponse> for HttpResponseMsg {
    fn from(response: &HttpResponse) -> Self {
        Self { http_response_id: wire(response.id),
               http_id: wire(response.http_id),
               status: response.status,
               body: response.body.clone(),
               time: response.time,
               duration: response.duration,
               size: response.size }
    }
}

pub type HttpResponseSyncItem = SyncItem<HttpResponseMsg, HttpResponseMsg>;

pub fn encode_response(event: &HttpResponseEvent) -> Option<HttpResponseSyncItem> {
    Some(match event {
             Change::Insert(response) => SyncItem::Insert(HttpResponseMsg::from(response)),
             Change::Update { row, .. } => SyncItem::Update(HttpResponseMsg::from(row)),
             Change::Delete(response) => SyncItem::Delete { id: wire(response.id) },
         })
}

impl FlowService {
    async fn visible_responses(&self, ctx: &CallContext) -> RpcResult<Vec<HttpResponse>> {
        let workspaces = self.store.member_workspaces(ctx.user()?).await?;
        Ok(self.store.list_scoped::<HttpResponse>(&workspaces).await?)
    }

    pub async fn http_response_collection(&self, ctx: &CallContext) -> RpcResult<Vec<HttpResponseMsg>> {
        let responses = self.visible_responses(ctx).await?;
        Ok(responses.iter().map(HttpResponseMsg::from).collect())
    }

    pub async fn http_response_sync(&self, ctx: &CallContext) -> RpcResult<SyncStream<HttpResponseEvent, HttpResponseSyncItem>> {
        let filter = workspace_filter(self.store.clone(), ctx.user()?);
        self.open_sync(ctx,
                       &self.buses.response,
                       "http_response",
                       filter,
                       move || async move {
                           let responses = self.visible_responses(ctx).await?;
                           Ok(responses.into_iter().map(Change::Insert).collect())
                       },
                       encode_response)
            .await
    }
}
