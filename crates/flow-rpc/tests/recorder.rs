mod common;

use chrono::Utc;
use serde_json::json;
use tokio_test::{assert_pending, assert_ready, task};

use flow_core::model::{Compression, HttpResponse, NodeExecution, NodeKind, NodeState, Union};
use flow_core::store::RecordKind;
use flow_core::Id;
use flow_rpc::wire::wire;
use flow_rpc::RpcError;

use common::{caller, fixture};

fn execution(node_id: Id, response_id: Option<Id>) -> NodeExecution {
    NodeExecution { id: Id::new(),
                    node_id,
                    name: "run 1".into(),
                    state: NodeState::Success,
                    error: None,
                    input: serde_json::to_vec(&json!("{\"url\":\"https://example.test\"}")).unwrap(),
                    input_compression: Compression::None,
                    output: Vec::new(),
                    output_compression: Compression::None,
                    response_id,
                    completed_at: Some(Utc::now()) }
}

fn response(id: Id, workspace_id: Id) -> HttpResponse {
    HttpResponse { id,
                   http_id: Id::new(),
                   workspace_id,
                   status: 200,
                   body: b"{}".to_vec(),
                   time: Utc::now(),
                   duration: 12,
                   size: 2 }
}

#[tokio::test]
async fn response_is_observed_before_the_execution_citing_it() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::Http, "req").await;
    let mut responses = fx.service.http_response_sync(&fx.alice.ctx).await.unwrap();
    let mut executions = fx.service.node_execution_sync(&fx.alice.ctx).await.unwrap();

    let recorder = fx.service.recorder();
    let response_id = Id::new();
    let guard = recorder.reserve_response(response_id);

    let mut run = task::spawn(recorder.record_execution(&fx.alice.ctx, execution(node_id, Some(response_id))));
    assert_pending!(run.poll());
    assert!(executions.try_next().is_none());

    recorder.record_http_response(&fx.alice.ctx, guard, response(response_id, fx.workspace))
            .await
            .unwrap();
    let published = responses.try_next().unwrap();
    assert_eq!(published.items[0].as_insert().unwrap().http_response_id, wire(response_id));
    assert!(executions.try_next().is_none());

    assert!(run.is_woken());
    assert_ready!(run.poll()).unwrap();
    let got = executions.try_next().unwrap();
    let msg = got.items[0].as_insert().unwrap();
    assert_eq!(msg.response_id, Some(wire(response_id)));
    assert_eq!(msg.input, Some(json!({"url": "https://example.test"})));
    assert!(!fx.service.rendezvous().is_pending(response_id));
}

#[tokio::test]
async fn cancelled_waiter_gives_up_without_writing() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::Http, "req").await;
    let engine = caller();
    fx.store.add_member(fx.workspace, engine.user);

    let recorder = fx.service.recorder();
    let response_id = Id::new();
    let _guard = recorder.reserve_response(response_id);
    let mut run = task::spawn(recorder.record_execution(&engine.ctx, execution(node_id, Some(response_id))));
    assert_pending!(run.poll());

    engine.handle.cancel();
    assert_eq!(assert_ready!(run.poll()), Err(RpcError::Cancelled));
    assert!(fx.service.node_execution_collection(&fx.alice.ctx).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_response_fails_the_waiting_execution() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::Http, "req").await;
    let (_bob, foreign) = fx.outsider();
    let mut responses = fx.service.http_response_sync(&fx.alice.ctx).await.unwrap();
    let mut executions = fx.service.node_execution_sync(&fx.alice.ctx).await.unwrap();

    let recorder = fx.service.recorder();
    let response_id = Id::new();
    let guard = recorder.reserve_response(response_id);
    let mut run = task::spawn(recorder.record_execution(&fx.alice.ctx, execution(node_id, Some(response_id))));
    assert_pending!(run.poll());

    // alice no es miembro de `foreign`: la respuesta no se guarda
    let err = recorder.record_http_response(&fx.alice.ctx, guard, response(response_id, foreign))
                      .await
                      .unwrap_err();
    assert_eq!(err, RpcError::NotFound("workspace"));

    assert!(run.is_woken());
    assert_eq!(assert_ready!(run.poll()), Err(RpcError::NotFound("http response")));
    assert!(responses.try_next().is_none());
    assert!(executions.try_next().is_none());
    assert_eq!(fx.store.count(RecordKind::HttpResponse), 0);
    assert_eq!(fx.store.count(RecordKind::NodeExecution), 0);
    assert!(!fx.service.rendezvous().is_pending(response_id));
}

#[tokio::test]
async fn execution_citing_an_unrecorded_response_is_rejected() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::Http, "req").await;
    let recorder = fx.service.recorder();

    // reserva soltada antes de que nadie espere
    let response_id = Id::new();
    drop(recorder.reserve_response(response_id));
    let err = recorder.record_execution(&fx.alice.ctx, execution(node_id, Some(response_id)))
                      .await
                      .unwrap_err();
    assert_eq!(err, RpcError::NotFound("http response"));
    assert_eq!(fx.store.count(RecordKind::NodeExecution), 0);
}

#[tokio::test]
async fn collection_keeps_the_latest_execution_per_node() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "js").await;
    let recorder = fx.service.recorder();

    let first = execution(node_id, None);
    let mut second = execution(node_id, None);
    second.name = "run 2".into();
    second.state = NodeState::Failure;
    second.error = Some("boom".into());
    recorder.record_execution(&fx.alice.ctx, first).await.unwrap();
    recorder.record_execution(&fx.alice.ctx, second.clone()).await.unwrap();

    let latest = fx.service.node_execution_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].name, "run 2");
    assert_eq!(latest[0].error.as_deref(), Some("boom"));

    // reescribir la misma ejecución llega como UPDATE
    let mut sync = fx.service.node_execution_sync(&fx.alice.ctx).await.unwrap();
    let _ = sync.try_next();
    second.state = NodeState::Success;
    recorder.record_execution(&fx.alice.ctx, second).await.unwrap();
    let got = sync.try_next().unwrap();
    assert_eq!(got.items[0].as_update().unwrap().state, NodeState::Success.as_i32());
}

#[tokio::test]
async fn response_reservation_must_match() {
    let fx = fixture();
    let recorder = fx.service.recorder();
    let guard = recorder.reserve_response(Id::new());
    let err = recorder.record_http_response(&fx.alice.ctx, guard, response(Id::new(), fx.workspace))
                      .await
                      .unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(_)));
}

#[tokio::test]
async fn running_flag_reaches_flow_subscribers() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let mut sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let _ = sync.try_next();

    fx.service
      .recorder()
      .set_flow_running(&fx.alice.ctx, flow_id, false, Some(Union::Value(250)))
      .await
      .unwrap();
    let got = sync.try_next().unwrap();
    let update = got.items[0].as_update().unwrap();
    assert_eq!(update.running, Some(false));
    assert_eq!(update.duration, Some(Union::Value(250)));
}
