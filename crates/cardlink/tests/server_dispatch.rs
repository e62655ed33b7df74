//! Server-side dispatch, subscriber registration, and event fan-out.

use std::sync::Arc;

use cardlink::{
    Action, Message, NodeId, ReaderApiError, RemoteFailure, ServerService, SessionId, API_LEVEL,
};
use cardlink_testkit::{init_tracing, CapturingServerEndpoint, FakeReader, FakeReaderApi};

fn api_with_reader() -> Arc<FakeReaderApi> {
    Arc::new(FakeReaderApi::new().with_reader(
        "reader-1",
        FakeReader {
            contactless: false,
            observable: true,
        },
    ))
}

async fn build_server(
    api: Arc<FakeReaderApi>,
) -> (Arc<ServerService>, Arc<CapturingServerEndpoint>) {
    let endpoint = Arc::new(CapturingServerEndpoint::new());
    let server = ServerService::builder(api)
        .with_async_node(endpoint.clone())
        .build()
        .await
        .unwrap();
    (server, endpoint)
}

fn command(reader: Option<&str>, client: NodeId, session: SessionId) -> Message {
    let mut message = Message::new(Action::ExecuteRemoteService, session).with_body("select-app");
    message.client_node_id = Some(client);
    if let Some(reader) = reader {
        message.local_reader_name = Some(reader.to_string());
    }
    message
}

#[tokio::test]
async fn test_dispatch_executes_and_replies_resp() {
    init_tracing();
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    let client_id = NodeId::random();
    let request = command(Some("reader-1"), client_id, SessionId::random());
    node.on_message(request.clone()).await.unwrap();

    let sent = endpoint.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, Action::Resp);
    assert_eq!(sent[0].body, "executed:select-app");
    assert_eq!(sent[0].session_id, request.session_id);
    assert_eq!(sent[0].client_node_id, Some(client_id));
    assert!(sent[0].server_node_id.is_some());
}

#[tokio::test]
async fn test_dispatch_converts_precondition_to_error_reply() {
    let api = api_with_reader();
    api.script_execution(Err(ReaderApiError::Precondition("card absent".into())));
    let (server, endpoint) = build_server(api).await;
    let node = server.async_node().unwrap();

    node.on_message(command(
        Some("reader-1"),
        NodeId::random(),
        SessionId::random(),
    ))
    .await
    .unwrap();

    let sent = endpoint.sent();
    assert_eq!(sent[0].action, Action::Error);
    let failure = RemoteFailure::from_body(&sent[0].body).unwrap();
    assert!(failure.message.contains("card absent"));
}

#[tokio::test]
async fn test_dispatch_fatal_failure_propagates_and_sends_nothing() {
    let api = api_with_reader();
    api.script_execution(Err(ReaderApiError::Unexpected("reader crashed".into())));
    let (server, endpoint) = build_server(api).await;
    let node = server.async_node().unwrap();

    let outcome = node
        .on_message(command(
            Some("reader-1"),
            NodeId::random(),
            SessionId::random(),
        ))
        .await;

    assert!(outcome.is_err());
    assert!(endpoint.sent().is_empty());
}

#[tokio::test]
async fn test_plugin_observation_control_messages() {
    let api = api_with_reader();
    let (server, endpoint) = build_server(api.clone()).await;
    let node = server.async_node().unwrap();

    let mut start = Message::new(Action::StartPluginsObservation, SessionId::random());
    start.client_node_id = Some(NodeId::random());
    node.on_message(start).await.unwrap();

    assert!(api.plugins_observed());
    assert_eq!(endpoint.sent()[0].action, Action::Resp);
    assert_eq!(endpoint.sent()[0].body, "");

    let mut stop = Message::new(Action::StopPluginsObservation, SessionId::random());
    stop.client_node_id = Some(NodeId::random());
    node.on_message(stop).await.unwrap();

    assert!(!api.plugins_observed());
}

#[tokio::test]
async fn test_unsupported_api_level_is_answered_with_error() {
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    let mut request = command(Some("reader-1"), NodeId::random(), SessionId::random());
    request.api_level = API_LEVEL + 1;
    node.on_message(request).await.unwrap();

    assert_eq!(endpoint.sent()[0].action, Action::Error);
}

#[tokio::test]
async fn test_unknown_action_is_answered_with_error() {
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    let mut request = command(Some("reader-1"), NodeId::random(), SessionId::random());
    request.action = Action::Unknown;
    node.on_message(request).await.unwrap();

    assert_eq!(endpoint.sent()[0].action, Action::Error);
}

#[tokio::test]
async fn test_registrations_coalesce_by_client_node_id() {
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    let client_id = NodeId::random();
    let first_session = SessionId::random();
    node.on_message(command(Some("reader-1"), client_id, first_session))
        .await
        .unwrap();
    node.on_message(command(Some("reader-1"), client_id, SessionId::random()))
        .await
        .unwrap();

    server.on_reader_event("reader-1", "card-inserted").await;

    let events: Vec<Message> = endpoint
        .sent()
        .into_iter()
        .filter(|m| m.action == Action::ReaderEvent)
        .collect();
    // One subscriber entry despite two registrations, keyed to the first
    // recorded session.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].client_node_id, Some(client_id));
    assert_eq!(events[0].session_id, first_session);
    assert_eq!(events[0].local_reader_name.as_deref(), Some("reader-1"));
    assert_eq!(events[0].remote_reader_name.as_deref(), Some("reader-1"));
    assert_eq!(events[0].body, "card-inserted");
}

#[tokio::test]
async fn test_failed_delivery_evicts_only_that_subscriber() {
    init_tracing();
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    let reachable_a = NodeId::random();
    let unreachable = NodeId::random();
    let reachable_b = NodeId::random();
    for client_id in [reachable_a, unreachable, reachable_b] {
        node.on_message(command(Some("reader-1"), client_id, SessionId::random()))
            .await
            .unwrap();
    }
    endpoint.fail_deliveries_to(unreachable);

    server.on_reader_event("reader-1", "card-inserted").await;

    let delivered: Vec<Option<NodeId>> = endpoint
        .sent()
        .into_iter()
        .filter(|m| m.action == Action::ReaderEvent)
        .map(|m| m.client_node_id)
        .collect();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.contains(&Some(reachable_a)));
    assert!(delivered.contains(&Some(reachable_b)));

    // The evicted subscriber is not retried on the next event.
    server.on_reader_event("reader-1", "card-removed").await;
    let second_round: Vec<Message> = endpoint
        .sent()
        .into_iter()
        .filter(|m| m.action == Action::ReaderEvent && m.body == "card-removed")
        .collect();
    assert_eq!(second_round.len(), 2);
}

#[tokio::test]
async fn test_plugin_level_registration_and_fan_out() {
    let (server, endpoint) = build_server(api_with_reader()).await;
    let node = server.async_node().unwrap();

    // No reader name: a plugin-level subscription.
    let client_id = NodeId::random();
    let mut request = Message::new(Action::StartPluginsObservation, SessionId::random());
    request.client_node_id = Some(client_id);
    node.on_message(request).await.unwrap();

    server.on_plugin_event("reader-9", "reader-connected").await;

    let events: Vec<Message> = endpoint
        .sent()
        .into_iter()
        .filter(|m| m.action == Action::PluginEvent)
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].client_node_id, Some(client_id));
    assert_eq!(events[0].local_reader_name.as_deref(), Some("reader-9"));
    assert_eq!(events[0].body, "reader-connected");
}

#[tokio::test]
async fn test_events_for_unknown_reader_go_nowhere() {
    let (server, endpoint) = build_server(api_with_reader()).await;

    server.on_reader_event("reader-without-subscribers", "x").await;
    assert!(endpoint.sent().is_empty());
}

#[tokio::test]
async fn test_pool_plugin_names_are_pushed_at_build_time() {
    let api = api_with_reader();
    let endpoint = Arc::new(CapturingServerEndpoint::new());
    let _server = ServerService::builder(api.clone())
        .with_async_node(endpoint)
        .with_pool_plugin_names(["pool-a", "pool-b"])
        .build()
        .await
        .unwrap();

    assert_eq!(api.pool_plugin_names(), vec!["pool-a", "pool-b"]);
}

#[tokio::test]
async fn test_sync_server_round_trip_and_self_evicting_events() {
    init_tracing();
    let api = api_with_reader();
    let server = ServerService::builder(api)
        .with_sync_node()
        .build()
        .await
        .unwrap();
    let node = server.sync_node().unwrap();

    let client_id = NodeId::random();
    let request = command(Some("reader-1"), client_id, SessionId::random());
    let replies = node.on_request(request.clone()).await.unwrap();

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].action, Action::Resp);
    assert_eq!(replies[0].session_id, request.session_id);

    // A request/reply transport has no push channel: fan-out fails and the
    // subscriber is silently evicted, without disturbing the caller.
    server.on_reader_event("reader-1", "card-inserted").await;
    server.on_reader_event("reader-1", "card-removed").await;
}

#[tokio::test]
async fn test_wrong_discipline_accessors_fail() {
    let (server, _endpoint) = build_server(api_with_reader()).await;
    assert!(server.sync_node().is_err());
    assert!(server.async_node().is_ok());
}
