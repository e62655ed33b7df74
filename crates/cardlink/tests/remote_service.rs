//! End-to-end transaction driving against scripted remote controllers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cardlink::{
    Action, ClientService, ReaderApiError, RemoteServiceRequest, ServiceError, SessionId,
};
use cardlink_testkit::{
    init_tracing, ChannelAsyncEndpoint, FakeReader, FakeReaderApi, ScriptedRemote,
    ScriptedSyncEndpoint,
};
use serde_json::{json, Value};

fn api_with_reader() -> Arc<FakeReaderApi> {
    Arc::new(FakeReaderApi::new().with_reader(
        "reader-1",
        FakeReader {
            contactless: true,
            observable: false,
        },
    ))
}

#[tokio::test]
async fn test_sync_transaction_runs_to_completion() {
    init_tracing();
    let api = api_with_reader();
    let remote = ScriptedRemote::new(["cmd-1", "cmd-2"], r#"{"outputData":{"status":"DONE"}}"#);
    let endpoint = Arc::new(ScriptedSyncEndpoint::from_remote(remote));

    let client = ClientService::builder(api.clone())
        .with_sync_node(endpoint.clone())
        .build()
        .unwrap();

    let output: Option<Value> = client
        .execute_remote_service(
            RemoteServiceRequest::new("VALIDATION", "reader-1")
                .with_input_data(json!({"ticket": 42})),
        )
        .await
        .unwrap();

    assert_eq!(output.unwrap()["status"], "DONE");

    // Exactly the modeled round trips: announce + one reply per command.
    let requests = endpoint.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].action, Action::ExecuteRemoteService);
    assert_eq!(requests[1].action, Action::Resp);
    assert_eq!(requests[1].body, "executed:cmd-1");
    assert_eq!(requests[2].body, "executed:cmd-2");

    // One session id across the whole exchange, stamped with the node id.
    let session_id = requests[0].session_id;
    assert!(requests.iter().all(|r| r.session_id == session_id));
    assert!(requests.iter().all(|r| r.client_node_id.is_some()));

    // The announce body carries the protocol-owned fields.
    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["serviceId"], "VALIDATION");
    assert_eq!(body["isReaderContactless"], true);
    assert_eq!(body["inputData"]["ticket"], 42);
}

#[tokio::test]
async fn test_empty_parameters_fail_before_any_node_interaction() {
    let api = api_with_reader();
    let (endpoint, _rx) = ChannelAsyncEndpoint::new();
    let endpoint = Arc::new(endpoint);

    let client = ClientService::builder(api)
        .with_async_node(endpoint.clone(), Duration::from_secs(1))
        .build()
        .unwrap();

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("", "reader-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Precondition(_)));

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("VALIDATION", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Precondition(_)));

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("VALIDATION", "ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Reader(_)));

    // No session was opened, nothing was sent.
    assert!(endpoint.opened().is_empty());
    assert!(endpoint.closed().is_empty());
}

#[tokio::test]
async fn test_remote_error_surfaces_and_stops_the_loop() {
    let api = api_with_reader();
    let endpoint = Arc::new(ScriptedSyncEndpoint::new(|request| {
        Ok(vec![request.reply(
            Action::Error,
            r#"{"message":"service refused","code":"REFUSED"}"#,
        )])
    }));

    let client = ClientService::builder(api)
        .with_sync_node(endpoint.clone())
        .build()
        .unwrap();

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("VALIDATION", "reader-1"))
        .await
        .unwrap_err();

    match err {
        ServiceError::Remote(failure) => {
            assert_eq!(failure.message, "service refused");
            assert_eq!(failure.code.as_deref(), Some("REFUSED"));
        }
        other => panic!("expected remote failure, got {other:?}"),
    }
    // No further sends after the terminal error.
    assert_eq!(endpoint.requests().len(), 1);
}

#[tokio::test]
async fn test_local_precondition_failure_is_sent_as_error_envelope() {
    let api = api_with_reader();
    api.script_execution(Err(ReaderApiError::Precondition("card absent".into())));

    let remote = ScriptedRemote::new(["cmd-1"], "");
    let endpoint = Arc::new(ScriptedSyncEndpoint::from_remote(remote));

    let client = ClientService::builder(api)
        .with_sync_node(endpoint.clone())
        .build()
        .unwrap();

    let output: Option<Value> = client
        .execute_remote_service(RemoteServiceRequest::new("VALIDATION", "reader-1"))
        .await
        .unwrap();
    assert!(output.is_none());

    // The failed command went back as a serialized failure, and the loop
    // kept running until the controller terminated it.
    let requests = endpoint.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].action, Action::Error);
    let failure = cardlink::RemoteFailure::from_body(&requests[1].body).unwrap();
    assert!(failure.message.contains("card absent"));
}

#[tokio::test]
async fn test_fatal_local_failure_propagates() {
    let api = api_with_reader();
    api.script_execution(Err(ReaderApiError::Unexpected("reader crashed".into())));

    let remote = ScriptedRemote::new(["cmd-1"], "");
    let endpoint = Arc::new(ScriptedSyncEndpoint::from_remote(remote));

    let client = ClientService::builder(api)
        .with_sync_node(endpoint.clone())
        .build()
        .unwrap();

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("VALIDATION", "reader-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Reader(_)));
    // The announce went out, the failing command did not produce a reply.
    assert_eq!(endpoint.requests().len(), 1);
}

#[tokio::test]
async fn test_async_transaction_closes_session_once_on_success() {
    init_tracing();
    let api = api_with_reader();
    let (endpoint, mut rx) = ChannelAsyncEndpoint::new();
    let endpoint = Arc::new(endpoint);

    let client = ClientService::builder(api)
        .with_async_node(endpoint.clone(), Duration::from_secs(5))
        .build()
        .unwrap();
    let node = client.async_node().unwrap();

    let pump = {
        let node = node.clone();
        let remote = ScriptedRemote::new(["cmd-1"], r#"{"outputData":"ok"}"#);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                node.on_message(remote.next_reply(&request)).await;
            }
        })
    };

    let output: Option<String> = client
        .execute_remote_service(RemoteServiceRequest::new("VALIDATION", "reader-1"))
        .await
        .unwrap();
    assert_eq!(output.as_deref(), Some("ok"));

    assert_eq!(endpoint.opened().len(), 1);
    assert_eq!(endpoint.closed(), endpoint.opened());
    drop(client);
    pump.abort();
}

#[tokio::test(start_paused = true)]
async fn test_async_timeout_fails_the_transaction_and_still_closes() {
    let api = api_with_reader();
    let (endpoint, _rx) = ChannelAsyncEndpoint::new();
    let endpoint = Arc::new(endpoint);

    let client = ClientService::builder(api)
        .with_async_node(endpoint.clone(), Duration::from_secs(2))
        .build()
        .unwrap();

    let err = client
        .execute_remote_service::<Value>(RemoteServiceRequest::new("VALIDATION", "reader-1"))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(endpoint.opened().len(), 1);
    assert_eq!(endpoint.closed(), endpoint.opened());
}

#[tokio::test]
async fn test_concurrent_transactions_do_not_bleed() {
    init_tracing();
    const N: usize = 4;

    let api = api_with_reader();
    let (endpoint, mut rx) = ChannelAsyncEndpoint::new();
    let endpoint = Arc::new(endpoint);

    let client = ClientService::builder(api)
        .with_async_node(endpoint, Duration::from_secs(5))
        .build()
        .unwrap();
    let node = client.async_node().unwrap();

    // The controller gathers a full round of requests before answering,
    // then answers in reverse order, so delivery interleaves across the
    // concurrently open sessions.
    let pump = {
        let node = node.clone();
        tokio::spawn(async move {
            let mut announced: HashMap<SessionId, String> = HashMap::new();

            let mut round = Vec::new();
            for _ in 0..N {
                round.push(rx.recv().await.expect("request"));
            }
            round.reverse();
            for request in round {
                let body: Value = serde_json::from_str(&request.body).unwrap();
                let service_id = body["serviceId"].as_str().unwrap().to_string();
                announced.insert(request.session_id, service_id);
                node.on_message(request.reply(Action::Resp, "cmd")).await;
            }

            let mut round = Vec::new();
            for _ in 0..N {
                round.push(rx.recv().await.expect("request"));
            }
            round.reverse();
            for request in round {
                let service_id = &announced[&request.session_id];
                let end = request.reply(
                    Action::EndRemoteService,
                    format!(r#"{{"outputData":"{service_id}"}}"#),
                );
                node.on_message(end).await;
            }
        })
    };

    let mut drivers = Vec::new();
    for i in 0..N {
        let client = client.clone();
        drivers.push(tokio::spawn(async move {
            let output: Option<String> = client
                .execute_remote_service(RemoteServiceRequest::new(format!("svc-{i}"), "reader-1"))
                .await
                .unwrap();
            (i, output)
        }));
    }

    for driver in drivers {
        let (i, output) = driver.await.unwrap();
        assert_eq!(output.as_deref(), Some(format!("svc-{i}").as_str()));
    }
    pump.await.unwrap();
}
