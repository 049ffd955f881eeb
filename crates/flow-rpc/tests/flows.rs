mod common;

use std::time::Duration;

use flow_core::model::{NoOpKind, NodeKind};
use flow_core::store::{RecordKind, Store};
use flow_core::Id;
use flow_rpc::handlers::{FlowDeleteItem, FlowDuplicateItem, FlowInsertItem, FlowUpdateItem, NodeInsertItem};
use flow_rpc::wire::wire;
use flow_rpc::{Buses, CallContext, FlowService, RpcError, ServiceConfig, SyncItem};

use common::{fixture, slow_fixture};

#[tokio::test]
async fn insert_seeds_a_start_node() {
    let fx = fixture();
    let flow_id = fx.flow("  F1 ").await;

    let flows = fx.service.flow_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].name, "F1");
    assert_eq!(flows[0].workspace_id, wire(fx.workspace));

    let nodes = fx.service.node_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].flow_id, wire(flow_id));
    assert_eq!(nodes[0].kind, NodeKind::NoOp.as_i32());
    assert_eq!(nodes[0].name, "Start");

    let noops = fx.service.node_noop_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(noops.len(), 1);
    assert_eq!(noops[0].node_id, nodes[0].node_id);
    assert_eq!(noops[0].kind, NoOpKind::Start.as_i32());

    let ws = fx.store.workspace(fx.workspace).await.unwrap().unwrap();
    assert_eq!(ws.flow_count, 1);
}

#[tokio::test]
async fn insert_publishes_sub_row_before_base_before_flow() {
    let fx = fixture();
    let mut flows = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let mut nodes = fx.service.node_sync(&fx.alice.ctx).await.unwrap();
    let mut noops = fx.service.node_noop_sync(&fx.alice.ctx).await.unwrap();
    assert!(flows.try_next().is_none());

    let flow_id = fx.flow("F1").await;

    let noop = noops.try_next().unwrap();
    assert_eq!(noop.items.len(), 1);
    let node = nodes.try_next().unwrap();
    assert_eq!(node.items.len(), 1);
    assert_eq!(node.items[0].as_insert().unwrap().node_id, noop.items[0].as_insert().unwrap().node_id);
    let flow = flows.try_next().unwrap();
    assert_eq!(flow.items[0].as_insert().unwrap().flow_id, wire(flow_id));
    assert_eq!(flow.dropped, 0);
}

#[tokio::test]
async fn invalid_item_aborts_the_whole_batch() {
    let fx = fixture();
    let mut sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let items = vec![FlowInsertItem { workspace_id: wire(fx.workspace),
                                      name: "ok".into(),
                                      ..Default::default() },
                     FlowInsertItem { workspace_id: wire(fx.workspace),
                                      name: "   ".into(),
                                      ..Default::default() }];
    let err = fx.service.flow_insert(&fx.alice.ctx, items).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(_)));
    assert_eq!(fx.store.count(RecordKind::Flow), 0);
    assert_eq!(fx.store.count(RecordKind::Node), 0);
    assert!(sync.try_next().is_none());
}

#[tokio::test]
async fn store_conflict_rolls_back_every_item() {
    let fx = fixture();
    let taken = fx.flow("F1").await;
    let items = vec![FlowInsertItem { workspace_id: wire(fx.workspace),
                                      name: "fresh".into(),
                                      ..Default::default() },
                     FlowInsertItem { flow_id: Some(wire(taken)),
                                      workspace_id: wire(fx.workspace),
                                      name: "dup".into(),
                                      ..Default::default() }];
    let err = fx.service.flow_insert(&fx.alice.ctx, items).await.unwrap_err();
    assert_eq!(err, RpcError::Internal);
    assert_eq!(fx.store.count(RecordKind::Flow), 1);
    let ws = fx.store.workspace(fx.workspace).await.unwrap().unwrap();
    assert_eq!(ws.flow_count, 1);
}

#[tokio::test]
async fn sync_is_isolated_between_workspaces() {
    let fx = fixture();
    let (bob, bob_ws) = fx.outsider();
    let mut alice_sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();

    fx.service
      .flow_insert(&bob.ctx,
                   vec![FlowInsertItem { workspace_id: wire(bob_ws),
                                         name: "B".into(),
                                         ..Default::default() }])
      .await
      .unwrap();
    assert!(alice_sync.try_next().is_none());
    assert!(fx.service.flow_collection(&fx.alice.ctx).await.unwrap().is_empty());

    // una vez miembro, los eventos nuevos de W2 le llegan
    fx.store.add_member(bob_ws, fx.alice.user);
    fx.service
      .flow_insert(&bob.ctx,
                   vec![FlowInsertItem { workspace_id: wire(bob_ws),
                                         name: "B2".into(),
                                         ..Default::default() }])
      .await
      .unwrap();
    let got = alice_sync.try_next().unwrap();
    assert_eq!(got.items[0].as_insert().unwrap().name, "B2");
}

#[tokio::test]
async fn non_member_cannot_tell_missing_from_forbidden() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let (bob, _) = fx.outsider();
    let mut alice_sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let _ = alice_sync.try_next();

    let update = |id: Id| {
        vec![FlowUpdateItem { flow_id: wire(id),
                              name: Some("x".into()),
                              ..Default::default() }]
    };
    let forbidden = fx.service.flow_update(&bob.ctx, update(flow_id)).await.unwrap_err();
    let missing = fx.service.flow_update(&bob.ctx, update(Id::new())).await.unwrap_err();
    assert_eq!(forbidden, missing);
    assert!(matches!(forbidden, RpcError::NotFound(_)));
    assert!(alice_sync.try_next().is_none());

    let insert = fx.service
                   .node_insert(&bob.ctx,
                                vec![NodeInsertItem { flow_id: wire(flow_id),
                                                      kind: NodeKind::JavaScript.as_i32(),
                                                      ..Default::default() }])
                   .await
                   .unwrap_err();
    assert!(matches!(insert, RpcError::NotFound(_)));
}

#[tokio::test]
async fn update_publishes_only_changed_fields() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let mut sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let _ = sync.try_next();

    fx.service
      .flow_update(&fx.alice.ctx,
                   vec![FlowUpdateItem { flow_id: wire(flow_id),
                                         name: Some(" renamed ".into()),
                                         ..Default::default() }])
      .await
      .unwrap();
    let got = sync.try_next().unwrap();
    let update = got.items[0].as_update().unwrap();
    assert_eq!(update.name.as_deref(), Some("renamed"));
    assert_eq!(update.duration, None);
}

#[tokio::test]
async fn delete_is_idempotent_and_floors_the_counter() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let mut sync = fx.service.flow_sync(&fx.alice.ctx).await.unwrap();
    let _ = sync.try_next();

    let item = || vec![FlowDeleteItem { flow_id: wire(flow_id) }, FlowDeleteItem { flow_id: wire(flow_id) }];
    fx.service.flow_delete(&fx.alice.ctx, item()).await.unwrap();
    let got = sync.try_next().unwrap();
    assert_eq!(got.items, vec![SyncItem::Delete { id: wire(flow_id) }]);
    assert_eq!(fx.store.count(RecordKind::Node), 0);
    assert_eq!(fx.store.count(RecordKind::NodeNoOp), 0);

    fx.service.flow_delete(&fx.alice.ctx, item()).await.unwrap();
    assert!(sync.try_next().is_none());
    let ws = fx.store.workspace(fx.workspace).await.unwrap().unwrap();
    assert_eq!(ws.flow_count, 0);
}

#[tokio::test]
async fn versions_are_published_on_the_parent_topic() {
    let fx = fixture();
    let parent = fx.flow("F1").await;
    let mut versions = fx.service.flow_version_sync(&fx.alice.ctx).await.unwrap();

    fx.service
      .flow_insert(&fx.alice.ctx,
                   vec![FlowInsertItem { workspace_id: wire(fx.workspace),
                                         name: "v1".into(),
                                         version_parent_id: Some(wire(parent)),
                                         ..Default::default() }])
      .await
      .unwrap();
    let got = versions.try_next().unwrap();
    let version = got.items[0].as_insert().unwrap();
    assert_eq!(version.version_parent_id, Some(wire(parent)));

    assert_eq!(fx.service.flow_version_collection(&fx.alice.ctx).await.unwrap().len(), 1);
    // las versiones no cuentan como flows del workspace
    let ws = fx.store.workspace(fx.workspace).await.unwrap().unwrap();
    assert_eq!(ws.flow_count, 1);
}

#[tokio::test]
async fn version_parent_must_share_the_workspace() {
    let fx = fixture();
    let parent = fx.flow("F1").await;
    let other_ws = fx.store.create_workspace("W3");
    fx.store.add_member(other_ws, fx.alice.user);
    let err = fx.service
                .flow_insert(&fx.alice.ctx,
                             vec![FlowInsertItem { workspace_id: wire(other_ws),
                                                   name: "v1".into(),
                                                   version_parent_id: Some(wire(parent)),
                                                   ..Default::default() }])
                .await
                .unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(_)));
}

#[tokio::test]
async fn duplicate_copies_the_graph() {
    let fx = fixture();
    let flow_id = fx.flow("F1").await;
    let js = fx.node(flow_id, NodeKind::JavaScript, "script").await;
    fx.service
      .node_javascript_insert(&fx.alice.ctx,
                              vec![flow_rpc::handlers::NodeJsMsg { node_id: wire(js),
                                                                   code: "return 1".into() }])
      .await
      .unwrap();

    let copy = fx.service
                 .flow_duplicate(&fx.alice.ctx, FlowDuplicateItem { flow_id: wire(flow_id) })
                 .await
                 .unwrap();
    assert_eq!(copy.name, "Copy of F1");
    assert_ne!(copy.flow_id, wire(flow_id));

    let nodes = fx.service.node_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(nodes.iter().filter(|n| n.flow_id == copy.flow_id).count(), 2);
    let scripts = fx.service.node_javascript_collection(&fx.alice.ctx).await.unwrap();
    assert_eq!(scripts.len(), 2);
    assert!(scripts.iter().all(|s| s.code == "return 1"));
    let ws = fx.store.workspace(fx.workspace).await.unwrap().unwrap();
    assert_eq!(ws.flow_count, 2);
}

#[tokio::test]
async fn missing_identity_is_unauthenticated() {
    let fx = fixture();
    let (anon, _handle) = CallContext::anonymous();
    assert_eq!(fx.service.flow_collection(&anon).await.unwrap_err(), RpcError::Unauthenticated);
    assert!(matches!(fx.service.flow_sync(&anon).await, Err(RpcError::Unauthenticated)));
}

#[tokio::test]
async fn store_outage_is_unavailable() {
    let fx = fixture();
    fx.store.set_available(false);
    let err = fx.service
                .flow_insert(&fx.alice.ctx,
                             vec![FlowInsertItem { workspace_id: wire(fx.workspace),
                                                   name: "F".into(),
                                                   ..Default::default() }])
                .await
                .unwrap_err();
    assert!(matches!(err, RpcError::Unavailable(_)));
    assert_eq!(fx.store.count(RecordKind::Flow), 0);
}

#[tokio::test]
async fn unconfigured_bus_refuses_subscriptions() {
    let fx = fixture();
    let service = FlowService::with_buses(fx.store.clone(), Buses::default(), ServiceConfig::default());
    assert!(matches!(service.flow_sync(&fx.alice.ctx).await, Err(RpcError::Unavailable(_))));
    // las mutaciones siguen funcionando sin buses
    service.flow_insert(&fx.alice.ctx,
                        vec![FlowInsertItem { workspace_id: wire(fx.workspace),
                                              name: "quiet".into(),
                                              ..Default::default() }])
           .await
           .unwrap();
}

#[tokio::test]
async fn sync_opened_mid_commit_sees_the_insert_once() {
    let fx = slow_fixture(Duration::from_millis(100));
    let flow_id = Id::new();
    let insert = fx.service
                   .flow_insert(&fx.alice.ctx,
                                vec![FlowInsertItem { flow_id: Some(wire(flow_id)),
                                                      workspace_id: wire(fx.workspace),
                                                      name: "F1".into(),
                                                      ..Default::default() }]);
    let open = async {
        // dentro del `apply` lento: la fila ya está escrita, todavía sin publicar
        tokio::time::sleep(Duration::from_millis(150)).await;
        fx.service.flow_sync(&fx.alice.ctx).await
    };
    let (inserted, opened) = tokio::join!(insert, open);
    inserted.unwrap();
    let mut sync = opened.unwrap();

    let mut seen = 0;
    while let Some(batch) = sync.try_next() {
        seen += batch.items
                     .iter()
                     .filter(|item| item.as_insert().is_some_and(|f| f.flow_id == wire(flow_id)))
                     .count();
    }
    assert_eq!(seen, 1);
}
