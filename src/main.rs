//! Demo de FlowSync: recorre los escenarios principales (alta de flow con
//! nodo Start, aislamiento de sync, borrado idempotente, UPDATE con estado,
//! rechazo a no miembros y orden respuesta → ejecución) y registra el
//! tráfico de sync. `RUST_LOG=debug` muestra también el bus y el store.

use std::error::Error;

use chrono::Utc;
use log::{info, warn};

use flowsync::app;
use flowsync::flow_core::model::{Compression, HttpResponse, NodeExecution, NodeKind, NodeState};
use flowsync::flow_core::Id;
use flowsync::flow_rpc::handlers::{EdgeDeleteItem, EdgeInsertItem, FlowInsertItem, FlowUpdateItem, NodeInsertItem, NodeUpdateItem};
use flowsync::flow_rpc::wire::wire;
use flowsync::flow_rpc::{CallContext, CancelHandle, FlowService};

type DemoResult<T> = Result<T, Box<dyn Error>>;

struct Caller {
    user: Id,
    ctx: CallContext,
    _handle: CancelHandle,
}

fn caller() -> Caller {
    let user = Id::new();
    let (ctx, handle) = CallContext::authenticated(user);
    Caller { user,
             ctx,
             _handle: handle }
}

async fn run_scenarios(service: &FlowService, workspace: Id, alice: &Caller, bob: &Caller, bob_workspace: Id) -> DemoResult<()> {
    let mut alice_flows = service.flow_sync(&alice.ctx).await?;
    let mut alice_nodes = service.node_sync(&alice.ctx).await?;

    // 1. alta de flow
    let flow_id = Id::new();
    service.flow_insert(&alice.ctx,
                        vec![FlowInsertItem { flow_id: Some(wire(flow_id)),
                                              workspace_id: wire(workspace),
                                              name: "F1".into(),
                                              ..Default::default() }])
           .await?;
    while let Some(batch) = alice_flows.try_next() {
        info!("[flow sync] {}", serde_json::to_string(&batch)?);
    }
    while let Some(batch) = alice_nodes.try_next() {
        info!("[node sync] {}", serde_json::to_string(&batch)?);
    }

    // 2. aislamiento
    service.flow_insert(&bob.ctx,
                        vec![FlowInsertItem { workspace_id: wire(bob_workspace),
                                              name: "B1".into(),
                                              ..Default::default() }])
           .await?;
    match alice_flows.try_next() {
        None => info!("[isolation] alice received nothing from W2"),
        Some(batch) => warn!("[isolation] unexpected delivery: {} items", batch.items.len()),
    }

    // 3. borrado idempotente
    let node_id = Id::new();
    service.node_insert(&alice.ctx,
                        vec![NodeInsertItem { node_id: Some(wire(node_id)),
                                              flow_id: wire(flow_id),
                                              kind: NodeKind::Http.as_i32(),
                                              name: "request".into(),
                                              position: None }])
           .await?;
    let edge_id = Id::new();
    service.edge_insert(&alice.ctx,
                        vec![EdgeInsertItem { edge_id: Some(wire(edge_id)),
                                              flow_id: wire(flow_id),
                                              source_id: wire(node_id),
                                              target_id: wire(node_id),
                                              source_handle: 0 }])
           .await?;
    let mut alice_edges = service.edge_sync(&alice.ctx).await?;
    let _ = alice_edges.try_next();
    for round in 1..=2 {
        service.edge_delete(&alice.ctx, vec![EdgeDeleteItem { edge_id: wire(edge_id) }])
               .await?;
        let emitted = alice_edges.try_next().map_or(0, |b| b.items.len());
        info!("[edge delete #{round}] events={emitted}");
    }

    // 4. UPDATE conserva el estado
    service.recorder()
           .set_node_state(&alice.ctx, node_id, NodeState::Success)
           .await?;
    let _ = alice_nodes.try_next();
    service.node_update(&alice.ctx,
                        vec![NodeUpdateItem { node_id: wire(node_id),
                                              name: Some("n".into()),
                                              ..Default::default() }])
           .await?;
    if let Some(batch) = alice_nodes.try_next() {
        info!("[node update] {}", serde_json::to_string(&batch)?);
    }

    // 5. no miembro
    let denied = service.flow_update(&bob.ctx,
                                     vec![FlowUpdateItem { flow_id: wire(flow_id),
                                                           name: Some("x".into()),
                                                           ..Default::default() }])
                        .await;
    info!("[non-member update] {denied:?}");

    // 6. respuesta antes que ejecución
    let mut responses = service.http_response_sync(&alice.ctx).await?;
    let mut executions = service.node_execution_sync(&alice.ctx).await?;
    let recorder = service.recorder();
    let response_id = Id::new();
    let guard = recorder.reserve_response(response_id);
    let execution = NodeExecution { id: Id::new(),
                                    node_id,
                                    name: "run".into(),
                                    state: NodeState::Success,
                                    error: None,
                                    input: Vec::new(),
                                    input_compression: Compression::None,
                                    output: br#"{"status":200}"#.to_vec(),
                                    output_compression: Compression::None,
                                    response_id: Some(response_id),
                                    completed_at: Some(Utc::now()) };
    let response = HttpResponse { id: response_id,
                                  http_id: Id::new(),
                                  workspace_id: workspace,
                                  status: 200,
                                  body: b"{}".to_vec(),
                                  time: Utc::now(),
                                  duration: 8,
                                  size: 2 };
    let (executed, responded) = tokio::join!(recorder.record_execution(&alice.ctx, execution), async {
        tokio::task::yield_now().await;
        recorder.record_http_response(&alice.ctx, guard, response).await
    });
    executed?;
    responded?;
    if let Some(batch) = responses.try_next() {
        info!("[response sync] {}", serde_json::to_string(&batch)?);
    }
    if let Some(batch) = executions.try_next() {
        info!("[execution sync] {}", serde_json::to_string(&batch)?);
    }
    Ok(())
}

async fn in_memory_demo() -> DemoResult<()> {
    let (store, service) = app::in_memory();
    let (alice, bob) = (caller(), caller());
    let w1 = store.create_workspace("W1");
    let w2 = store.create_workspace("W2");
    store.add_member(w1, alice.user);
    store.add_member(w2, bob.user);
    info!("== in-memory store ==");
    run_scenarios(&service, w1, &alice, &bob, w2).await
}

#[cfg(feature = "pg_demo")]
async fn pg_demo() -> DemoResult<()> {
    if std::env::var("DATABASE_URL").is_err() {
        warn!("pg demo skipped (no DATABASE_URL)");
        return Ok(());
    }
    let (store, service) = app::postgres()?;
    let (alice, bob) = (caller(), caller());
    let w1 = store.create_workspace("W1").await?;
    let w2 = store.create_workspace("W2").await?;
    store.add_member(w1, alice.user).await?;
    store.add_member(w2, bob.user).await?;
    info!("== postgres store ==");
    run_scenarios(&service, w1, &alice, &bob, w2).await
}

#[tokio::main]
async fn main() -> DemoResult<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    in_memory_demo().await?;
    #[cfg(feature = "pg_demo")]
    pg_demo().await?;
    Ok(())
}
