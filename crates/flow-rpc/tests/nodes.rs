mod common;

use flow_core::model::{NoOpKind, NodeKind, NodeState, Position, Union};
use flow_core::store::RecordKind;
use flow_core::Id;
use flow_rpc::handlers::{AiNodeMsg, AiNodeUpdateMsg, NodeDeleteItem, NodeInsertItem, NodeJsMsg, NodeJsUpdateMsg, NodeNoOpUpdateMsg, NodeUpdateItem,
                         SubNodeDeleteItem};
use flow_rpc::wire::wire;
use flow_rpc::{RpcError, SyncItem};

use common::fixture;

#[tokio::test]
async fn node_update_always_carries_state() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "a").await;
    fx.service
      .recorder()
      .set_node_state(&fx.alice.ctx, node_id, NodeState::Success)
      .await
      .unwrap();

    let mut sync = fx.service.node_sync(&fx.alice.ctx).await.unwrap();
    let _ = sync.try_next();
    fx.service
      .node_update(&fx.alice.ctx,
                   vec![NodeUpdateItem { node_id: wire(node_id),
                                         name: Some("n".into()),
                                         ..Default::default() }])
      .await
      .unwrap();
    let got = sync.try_next().unwrap();
    let update = got.items[0].as_update().unwrap();
    assert_eq!(update.name.as_deref(), Some("n"));
    assert_eq!(update.position, None);
    assert_eq!(update.state, NodeState::Success.as_i32());
}

#[tokio::test]
async fn kind_and_flow_are_immutable() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let other = fx.flow("F2").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "a").await;

    let change_kind = NodeUpdateItem { node_id: wire(node_id),
                                       kind: Some(NodeKind::Http.as_i32()),
                                       ..Default::default() };
    let reparent = NodeUpdateItem { node_id: wire(node_id),
                                    flow_id: Some(wire(other)),
                                    ..Default::default() };
    for item in [change_kind, reparent] {
        let err = fx.service.node_update(&fx.alice.ctx, vec![item]).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidArgument(_)));
    }

    // repetir los valores actuales no es un cambio
    let same = NodeUpdateItem { node_id: wire(node_id),
                                flow_id: Some(wire(flow_id)),
                                kind: Some(NodeKind::JavaScript.as_i32()),
                                position: Some(Position { x: 5.0, y: 5.0 }),
                                ..Default::default() };
    fx.service.node_update(&fx.alice.ctx, vec![same]).await.unwrap();
}

#[tokio::test]
async fn unspecified_kind_is_rejected() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let err = fx.service
                .node_insert(&fx.alice.ctx,
                             vec![NodeInsertItem { flow_id: wire(flow_id),
                                                   kind: NodeKind::Unspecified.as_i32(),
                                                   ..Default::default() }])
                .await
                .unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(_)));
}

#[tokio::test]
async fn sub_row_written_first_is_announced_with_its_node() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let mut scripts = fx.service.node_javascript_sync(&fx.alice.ctx).await.unwrap();
    let mut nodes = fx.service.node_sync(&fx.alice.ctx).await.unwrap();
    let _ = nodes.try_next();

    let node_id = Id::new();
    fx.service
      .node_javascript_insert(&fx.alice.ctx,
                              vec![NodeJsMsg { node_id: wire(node_id),
                                               code: "x".into() }])
      .await
      .unwrap();
    assert!(scripts.try_next().is_none());

    fx.service
      .node_insert(&fx.alice.ctx,
                   vec![NodeInsertItem { node_id: Some(wire(node_id)),
                                         flow_id: wire(flow_id),
                                         kind: NodeKind::JavaScript.as_i32(),
                                         name: "js".into(),
                                         position: None }])
      .await
      .unwrap();
    let sub = scripts.try_next().unwrap();
    assert_eq!(sub.items[0].as_insert().unwrap().code, "x");
    let base = nodes.try_next().unwrap();
    assert_eq!(base.items[0].as_insert().unwrap().node_id, wire(node_id));
}

#[tokio::test]
async fn sub_row_update_touches_the_base_node() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "js").await;
    fx.service
      .node_javascript_insert(&fx.alice.ctx,
                              vec![NodeJsMsg { node_id: wire(node_id),
                                               code: "a".into() }])
      .await
      .unwrap();
    let mut scripts = fx.service.node_javascript_sync(&fx.alice.ctx).await.unwrap();
    let mut nodes = fx.service.node_sync(&fx.alice.ctx).await.unwrap();
    let _ = (scripts.try_next(), nodes.try_next());

    fx.service
      .node_javascript_update(&fx.alice.ctx,
                              vec![NodeJsUpdateMsg { node_id: wire(node_id),
                                                     code: Some("b".into()) }])
      .await
      .unwrap();
    let sub = scripts.try_next().unwrap();
    assert_eq!(sub.items[0].as_update().unwrap().code.as_deref(), Some("b"));
    let base = nodes.try_next().unwrap();
    let touch = base.items[0].as_update().unwrap();
    assert_eq!(touch.node_id, wire(node_id));
    assert_eq!(touch.name, None);
    assert_eq!(touch.state, NodeState::Unspecified.as_i32());
}

#[tokio::test]
async fn sub_row_update_without_row_is_not_found() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "js").await;
    let err = fx.service
                .node_javascript_update(&fx.alice.ctx,
                                        vec![NodeJsUpdateMsg { node_id: wire(node_id),
                                                               code: Some("b".into()) }])
                .await
                .unwrap_err();
    assert!(matches!(err, RpcError::NotFound(_)));
}

#[tokio::test]
async fn sub_row_kind_must_match_its_node() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::Http, "req").await;
    let err = fx.service
                .node_javascript_insert(&fx.alice.ctx,
                                        vec![NodeJsMsg { node_id: wire(node_id),
                                                         code: "x".into() }])
                .await
                .unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(_)));
}

#[tokio::test]
async fn noop_kind_change_is_delete_then_insert() {
    let fx = fixture();
    fx.flow("F1").await;
    let start = fx.service.node_noop_collection(&fx.alice.ctx).await.unwrap().remove(0);
    let mut noops = fx.service.node_noop_sync(&fx.alice.ctx).await.unwrap();
    let _ = noops.try_next();

    fx.service
      .node_noop_update(&fx.alice.ctx,
                        vec![NodeNoOpUpdateMsg { node_id: start.node_id.clone(),
                                                 kind: Some(NoOpKind::Then.as_i32()) }])
      .await
      .unwrap();
    let got = noops.try_next().unwrap();
    assert_eq!(got.items.len(), 2);
    assert_eq!(got.items[0], SyncItem::Delete { id: start.node_id.clone() });
    assert_eq!(got.items[1].as_insert().unwrap().kind, NoOpKind::Then.as_i32());
    assert_eq!(fx.store.count(RecordKind::NodeNoOp), 1);
}

#[tokio::test]
async fn ai_update_distinguishes_unset_from_unchanged() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::AiProvider, "llm").await;
    fx.service
      .node_ai_provider_insert(&fx.alice.ctx,
                               vec![AiNodeMsg { node_id: wire(node_id),
                                                model: 1,
                                                temperature: Some(0.5),
                                                max_tokens: Some(100),
                                                ..Default::default() }])
      .await
      .unwrap();
    fx.service
      .node_ai_provider_update(&fx.alice.ctx,
                               vec![AiNodeUpdateMsg { node_id: wire(node_id),
                                                      temperature: Some(Union::Unset),
                                                      ..Default::default() }])
      .await
      .unwrap();
    let row = fx.service.node_ai_provider_collection(&fx.alice.ctx).await.unwrap().remove(0);
    assert_eq!(row.temperature, None);
    assert_eq!(row.max_tokens, Some(100));
    assert_eq!(row.model, 1);
}

#[tokio::test]
async fn node_delete_removes_sub_row_first() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let node_id = fx.node(flow_id, NodeKind::JavaScript, "js").await;
    fx.service
      .node_javascript_insert(&fx.alice.ctx,
                              vec![NodeJsMsg { node_id: wire(node_id),
                                               code: "a".into() }])
      .await
      .unwrap();
    let mut scripts = fx.service.node_javascript_sync(&fx.alice.ctx).await.unwrap();
    let _ = scripts.try_next();

    let item = || vec![NodeDeleteItem { node_id: wire(node_id) }];
    fx.service.node_delete(&fx.alice.ctx, item()).await.unwrap();
    let got = scripts.try_next().unwrap();
    assert_eq!(got.items, vec![SyncItem::Delete { id: wire(node_id) }]);
    assert_eq!(fx.store.count(RecordKind::NodeJs), 0);

    // segundo borrado: nada que hacer
    fx.service.node_delete(&fx.alice.ctx, item()).await.unwrap();
    fx.service
      .node_javascript_delete(&fx.alice.ctx, vec![SubNodeDeleteItem { node_id: wire(node_id) }])
      .await
      .unwrap();
    assert!(scripts.try_next().is_none());
}
