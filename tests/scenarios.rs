//! Escenarios de extremo a extremo sobre el servicio armado por `app`.

use chrono::Utc;
use tokio_test::{assert_pending, assert_ready, task};

use flowsync::app;
use flowsync::flow_core::model::{Compression, HttpResponse, NodeExecution, NodeKind, NodeState};
use flowsync::flow_core::Id;
use flowsync::flow_rpc::handlers::{EdgeDeleteItem, EdgeInsertItem, FlowInsertItem, FlowUpdateItem, NodeInsertItem, NodeUpdateItem};
use flowsync::flow_rpc::wire::wire;
use flowsync::flow_rpc::{CallContext, CancelHandle, Code};

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

fn insert_flow(workspace: Id, name: &str) -> (Id, FlowInsertItem) {
    let id = Id::new();
    (id,
     FlowInsertItem { flow_id: Some(wire(id)),
                      workspace_id: wire(workspace),
                      name: name.into(),
                      ..Default::default() })
}

#[tokio::test]
async fn flow_insert_reaches_member_with_start_node() {
    let (store, service) = app::in_memory();
    let alice = caller();
    let w1 = store.create_workspace("W1");
    store.add_member(w1, alice.user);
    let mut flows = service.flow_sync(&alice.ctx).await.unwrap();
    let mut nodes = service.node_sync(&alice.ctx).await.unwrap();

    let (flow_id, item) = insert_flow(w1, "F1");
    service.flow_insert(&alice.ctx, vec![item]).await.unwrap();

    let got = flows.try_next().unwrap();
    let flow = got.items[0].as_insert().unwrap();
    assert_eq!(flow.flow_id, wire(flow_id));
    assert_eq!(flow.name, "F1");
    let got = nodes.try_next().unwrap();
    let start = got.items[0].as_insert().unwrap();
    assert_eq!(start.flow_id, wire(flow_id));
    assert_eq!(start.kind, NodeKind::NoOp.as_i32());
}

#[tokio::test]
async fn other_workspace_traffic_stays_invisible() {
    let (store, service) = app::in_memory();
    let (alice, bob) = (caller(), caller());
    let w1 = store.create_workspace("W1");
    let w2 = store.create_workspace("W2");
    store.add_member(w1, alice.user);
    store.add_member(w2, bob.user);
    let mut alice_flows = service.flow_sync(&alice.ctx).await.unwrap();

    let (_, item) = insert_flow(w2, "B1");
    service.flow_insert(&bob.ctx, vec![item]).await.unwrap();

    assert!(alice_flows.try_next().is_none());
    assert!(service.flow_collection(&alice.ctx).await.unwrap().is_empty());

    // las decisiones negativas no se memorizan
    store.add_member(w2, alice.user);
    let (b2, item) = insert_flow(w2, "B2");
    service.flow_insert(&bob.ctx, vec![item]).await.unwrap();
    let got = alice_flows.try_next().unwrap();
    assert_eq!(got.items[0].as_insert().unwrap().flow_id, wire(b2));
}

#[tokio::test]
async fn second_edge_delete_succeeds_silently() {
    let (store, service) = app::in_memory();
    let alice = caller();
    let w1 = store.create_workspace("W1");
    store.add_member(w1, alice.user);
    let (flow_id, item) = insert_flow(w1, "F1");
    service.flow_insert(&alice.ctx, vec![item]).await.unwrap();
    let start = service.node_collection(&alice.ctx).await.unwrap()[0].node_id.clone();

    let edge_id = Id::new();
    service.edge_insert(&alice.ctx,
                        vec![EdgeInsertItem { edge_id: Some(wire(edge_id)),
                                              flow_id: wire(flow_id),
                                              source_id: start.clone(),
                                              target_id: start,
                                              source_handle: 0 }])
           .await
           .unwrap();
    let mut edges = service.edge_sync(&alice.ctx).await.unwrap();

    service.edge_delete(&alice.ctx, vec![EdgeDeleteItem { edge_id: wire(edge_id) }])
           .await
           .unwrap();
    let got = edges.try_next().unwrap();
    assert_eq!(got.items.len(), 1);
    assert!(got.items[0].is_delete());

    service.edge_delete(&alice.ctx, vec![EdgeDeleteItem { edge_id: wire(edge_id) }])
           .await
           .unwrap();
    assert!(edges.try_next().is_none());
}

#[tokio::test]
async fn node_update_carries_current_state() {
    let (store, service) = app::in_memory();
    let alice = caller();
    let w1 = store.create_workspace("W1");
    store.add_member(w1, alice.user);
    let (flow_id, item) = insert_flow(w1, "F1");
    service.flow_insert(&alice.ctx, vec![item]).await.unwrap();
    let node_id = Id::new();
    service.node_insert(&alice.ctx,
                        vec![NodeInsertItem { node_id: Some(wire(node_id)),
                                              flow_id: wire(flow_id),
                                              kind: NodeKind::Http.as_i32(),
                                              name: "req".into(),
                                              position: None }])
           .await
           .unwrap();
    service.recorder()
           .set_node_state(&alice.ctx, node_id, NodeState::Success)
           .await
           .unwrap();

    let mut nodes = service.node_sync(&alice.ctx).await.unwrap();
    service.node_update(&alice.ctx,
                        vec![NodeUpdateItem { node_id: wire(node_id),
                                              name: Some("n".into()),
                                              ..Default::default() }])
           .await
           .unwrap();
    let got = nodes.try_next().unwrap();
    let update = got.items[0].as_update().unwrap();
    assert_eq!(update.name.as_deref(), Some("n"));
    assert_eq!(update.state, NodeState::Success.as_i32());
}

#[tokio::test]
async fn non_member_update_is_rejected_without_events() {
    let (store, service) = app::in_memory();
    let (alice, bob) = (caller(), caller());
    let w1 = store.create_workspace("W1");
    store.add_member(w1, alice.user);
    let (flow_id, item) = insert_flow(w1, "F1");
    service.flow_insert(&alice.ctx, vec![item]).await.unwrap();
    let mut flows = service.flow_sync(&alice.ctx).await.unwrap();

    let err = service.flow_update(&bob.ctx,
                                  vec![FlowUpdateItem { flow_id: wire(flow_id),
                                                        name: Some("x".into()),
                                                        ..Default::default() }])
                     .await
                     .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert!(flows.try_next().is_none());
    assert_eq!(service.flow_collection(&alice.ctx).await.unwrap()[0].name, "F1");
}

#[tokio::test]
async fn execution_waits_for_its_response() {
    let (store, service) = app::in_memory();
    let alice = caller();
    let w1 = store.create_workspace("W1");
    store.add_member(w1, alice.user);
    let (flow_id, item) = insert_flow(w1, "F1");
    service.flow_insert(&alice.ctx, vec![item]).await.unwrap();
    let node_id = Id::new();
    service.node_insert(&alice.ctx,
                        vec![NodeInsertItem { node_id: Some(wire(node_id)),
                                              flow_id: wire(flow_id),
                                              kind: NodeKind::Http.as_i32(),
                                              name: "req".into(),
                                              position: None }])
           .await
           .unwrap();
    let mut responses = service.http_response_sync(&alice.ctx).await.unwrap();
    let mut executions = service.node_execution_sync(&alice.ctx).await.unwrap();

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
                                    output: Vec::new(),
                                    output_compression: Compression::None,
                                    response_id: Some(response_id),
                                    completed_at: Some(Utc::now()) };
    let mut run = task::spawn(recorder.record_execution(&alice.ctx, execution));
    assert_pending!(run.poll());
    assert!(executions.try_next().is_none());

    let response = HttpResponse { id: response_id,
                                  http_id: Id::new(),
                                  workspace_id: w1,
                                  status: 201,
                                  body: Vec::new(),
                                  time: Utc::now(),
                                  duration: 3,
                                  size: 0 };
    recorder.record_http_response(&alice.ctx, guard, response).await.unwrap();
    assert!(responses.try_next().is_some());

    assert_ready!(run.poll()).unwrap();
    let got = executions.try_next().unwrap();
    assert_eq!(got.items[0].as_insert().unwrap().response_id, Some(wire(response_id)));
}
