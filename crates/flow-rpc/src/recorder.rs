//! Entrada del motor de ejecución: registra respuestas HTTP, ejecuciones y
//! estados transitorios. Todo pasa por un contexto de mutación, igual que las
//! RPC de los clientes.

use log::{debug, info};

use flow_core::event::{Change, NodeEvent};
use flow_core::model::{Flow, FlowPatch, HttpResponse, Node, NodeExecution, NodePatch, NodeState, Patch, Union};
use flow_core::Id;

use crate::auth::CallContext;
use crate::buses::Published;
use crate::error::{RpcError, RpcResult};
use crate::handlers::flow::track_flow;
use crate::rendezvous::{ResponseGuard, WaitOutcome};
use crate::service::FlowService;

pub struct RunRecorder<'a> {
    service: &'a FlowService,
}

impl<'a> RunRecorder<'a> {
    pub(crate) fn new(service: &'a FlowService) -> Self {
        Self { service }
    }

    /// Marca la respuesta como pendiente. Debe llamarse antes de empezar la
    /// request HTTP; las ejecuciones que la citen esperarán a que se publique.
    pub fn reserve_response(&self, response_id: Id) -> ResponseGuard {
        self.service.rendezvous.register(response_id)
    }

    /// Guarda y publica la respuesta y marca la reserva como publicada. Si
    /// falla, la reserva se suelta sin marcar y las ejecuciones que la
    /// esperan fallan.
    pub async fn record_http_response(&self, ctx: &CallContext, guard: ResponseGuard, response: HttpResponse) -> RpcResult<()> {
        if guard.response_id() != response.id {
            return Err(RpcError::invalid("response id does not match the reservation"));
        }
        self.service.access(ctx)?.ensure_workspace(response.workspace_id).await?;

        let mut mutation = self.service.begin(ctx).await?;
        mutation.tx().insert(response.clone());
        mutation.track(Published::Response(response.workspace_id, Change::Insert(response)));
        mutation.commit().await?;
        guard.published();
        Ok(())
    }

    /// Inserta o reemplaza una ejecución. Si cita una respuesta todavía
    /// pendiente, espera a que ésta se publique; una respuesta que nunca se
    /// guardó hace fallar la ejecución con `NotFound`.
    pub async fn record_execution(&self, ctx: &CallContext, execution: NodeExecution) -> RpcResult<()> {
        let node = self.service.access(ctx)?.ensure_node(execution.node_id).await?;
        if let Some(response_id) = execution.response_id {
            match self.service.rendezvous.wait(response_id, ctx.cancellation()).await {
                WaitOutcome::Ready => {}
                WaitOutcome::Cancelled => {
                    debug!("record_execution cancelled waiting response={response_id}");
                    return Err(RpcError::Cancelled);
                }
                WaitOutcome::Abandoned => {
                    debug!("record_execution response={response_id} was not published");
                    return Err(RpcError::NotFound("http response"));
                }
            }
        }

        let mut mutation = self.service.begin(ctx).await?;
        if let Some(response_id) = execution.response_id {
            if mutation.tx().get::<HttpResponse>(response_id).await?.is_none() {
                return Err(RpcError::NotFound("http response"));
            }
        }
        let change = match mutation.tx().get::<NodeExecution>(execution.id).await? {
            Some(before) => {
                mutation.tx().update(&before, execution.clone())?;
                Change::Update { row: execution, patch: () }
            }
            None => {
                mutation.tx().insert(execution.clone());
                Change::Insert(execution)
            }
        };
        mutation.track(Published::Execution(node.flow_id, change));
        mutation.commit().await
    }

    pub async fn set_node_state(&self, ctx: &CallContext, node_id: Id, state: NodeState) -> RpcResult<()> {
        self.service.access(ctx)?.ensure_node(node_id).await?;
        let mut mutation = self.service.begin(ctx).await?;
        let Some(before) = mutation.tx().get::<Node>(node_id).await? else {
            return Err(RpcError::NotFound("node"));
        };
        let patch = NodePatch { state: Some(state),
                                ..Default::default() };
        let mut node = before.clone();
        patch.apply(&mut node);
        mutation.tx().update(&before, node.clone())?;
        mutation.track(Published::Node(node.flow_id, NodeEvent::Base(Change::Update { row: node, patch })));
        mutation.commit().await
    }

    /// Marca el inicio o el fin de una corrida del flow.
    pub async fn set_flow_running(&self, ctx: &CallContext, flow_id: Id, running: bool, duration: Option<Union<i32>>) -> RpcResult<()> {
        self.service.access(ctx)?.ensure_flow(flow_id).await?;
        let mut mutation = self.service.begin(ctx).await?;
        let Some(before) = mutation.tx().get::<Flow>(flow_id).await? else {
            return Err(RpcError::NotFound("flow"));
        };
        let patch = FlowPatch { running: Some(running),
                                duration,
                                ..Default::default() };
        let mut flow = before.clone();
        patch.apply(&mut flow);
        mutation.tx().update(&before, flow.clone())?;
        track_flow(&mut mutation, Change::Update { row: flow, patch });
        mutation.commit().await?;
        info!("flow={flow_id} running={running}");
        Ok(())
    }
}
