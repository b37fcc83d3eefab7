mod common;

use std::sync::Arc;
use std::time::Duration;

use constellation_core::{ErrorCode, Request, Response};
use constellation_fabric::MemoryBroker;
use constellation_rpc::{Client, Error, RpcConfig, RpcService};
use tracing::Level;

fn service(broker: &MemoryBroker) -> RpcService {
    RpcService::new(Arc::new(broker.clone()), "test", common::register_test_methods)
}

#[tokio::test]
async fn subjects_follow_registered_methods() {
    let broker = MemoryBroker::new();
    let service = service(&broker);

    assert_eq!(
        service.subjects(),
        vec!["test:channel", "test:exception", "test:large"]
    );
    assert_eq!(service.queue_group(), "test");
    assert_eq!(service.table().len(), 3);
}

#[tokio::test]
async fn serves_every_method_end_to_end() {
    let (log, _guard) = common::capture();
    let broker = MemoryBroker::new();
    let service = service(&broker);
    service.start().await.unwrap();
    let client = Client::new(Arc::new(broker.clone()));

    let response = client
        .call(&Request::new("test:channel").with_id("X").with_param("data", "ping"))
        .await
        .unwrap();
    assert_eq!(response.id(), Some("X"));
    assert_eq!(response.result(), Some("ping"));

    let response = client
        .call(&Request::new("test:exception"))
        .await
        .unwrap();
    let error = response.error().unwrap();
    assert!(error.is(ErrorCode::ServerError));
    assert_eq!(error.message, "Error");

    assert!(service.is_healthy().await);
    assert_eq!(log.count(Level::INFO, "Creating subscription"), 3);
    assert_eq!(log.count(Level::INFO, "All listeners started"), 1);

    service.stop().await;
    assert!(!service.is_healthy().await);
}

#[tokio::test]
async fn empty_registration_starts() {
    let broker = MemoryBroker::new();
    let service = RpcService::new(Arc::new(broker.clone()), "test", |_table| {});

    service.start().await.unwrap();

    assert!(service.subjects().is_empty());
    assert!(service.is_healthy().await);
    service.stop().await;
}

#[tokio::test]
async fn partial_start_failure_disposes_the_group() {
    let (log, _guard) = common::capture();
    let broker = MemoryBroker::new();
    let service = RpcService::new(Arc::new(broker.clone()), "test", |table| {
        common::register_test_methods(table);
        table.register("bad subject", |request: Request| async move {
            Ok::<_, anyhow::Error>(Response::empty(request.id))
        });
    });

    let error = service.start().await.unwrap_err();

    match error {
        Error::Start { total, failures } => {
            assert_eq!(total, 4);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "bad subject");
            assert!(matches!(failures[0].1, Error::Listener { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(log.count(Level::ERROR, "Failed to start listener"), 1);
    assert_eq!(broker.subscriber_count("test:channel"), 0);
    assert_eq!(broker.open_connections(), 0);
    assert!(!service.is_healthy().await);

    // Disposed listeners cannot be started again
    let error = service.start().await.unwrap_err();
    assert!(matches!(error, Error::Start { ref failures, .. } if failures.len() == 4));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let broker = MemoryBroker::new();
    let service = service(&broker);
    service.start().await.unwrap();

    service.stop().await;
    service.stop().await;

    assert_eq!(broker.subscriber_count("test:channel"), 0);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn replicas_share_the_load() {
    let broker = MemoryBroker::new();
    let first = service(&broker);
    let second = service(&broker);
    first.start().await.unwrap();
    second.start().await.unwrap();
    assert_eq!(broker.subscriber_count("test:channel"), 2);

    let client = Client::new(Arc::new(broker.clone()));
    for i in 0..10 {
        let response = client
            .call(&Request::new("test:channel").with_param("data", i.to_string()))
            .await
            .unwrap();
        assert_eq!(response.result(), Some(i.to_string().as_str()));
    }

    // One replica going away leaves the other answering
    first.stop().await;
    let response = client
        .call(&Request::new("test:channel").with_param("data", "left"))
        .await
        .unwrap();
    assert_eq!(response.result(), Some("left"));

    second.stop().await;
}

#[tokio::test]
async fn health_tracks_broker_loss() {
    let broker = MemoryBroker::new();
    let service = service(&broker);
    service.start().await.unwrap();
    assert!(service.is_healthy().await);

    broker.shutdown();

    let service = &service;
    let unhealthy = common::eventually(move || async move { !service.is_healthy().await }).await;
    assert!(unhealthy);
    service.stop().await;
}

#[tokio::test]
async fn run_until_serves_then_stops() {
    let broker = MemoryBroker::new();
    let service = service(&broker);
    let client = Client::new(Arc::new(broker.clone()));

    let caller = async {
        // Give the service a moment to subscribe
        tokio::time::sleep(Duration::from_millis(20)).await;
        client
            .call(&Request::new("test:channel").with_param("data", "while running"))
            .await
    };
    let (outcome, response) = tokio::join!(service.run_until(caller_done()), caller);

    outcome.unwrap();
    assert_eq!(response.unwrap().result(), Some("while running"));
    assert_eq!(broker.subscriber_count("test:channel"), 0);
}

async fn caller_done() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn queue_group_comes_from_config() {
    let config = RpcConfig::from_toml_str(
        r#"
        queue_group = "greeter"
        request_timeout_ms = 500
        "#,
    )
    .unwrap();
    let broker = config.memory_broker();

    let service = RpcService::from_config(Arc::new(broker.clone()), &config, common::register_test_methods);
    service.start().await.unwrap();

    assert_eq!(service.queue_group(), "greeter");
    let client = Client::from_config(Arc::new(broker.clone()), &config);
    let response = client
        .call(&Request::new("test:channel").with_param("data", "hi"))
        .await
        .unwrap();
    assert_eq!(response.result(), Some("hi"));

    service.stop().await;
}
