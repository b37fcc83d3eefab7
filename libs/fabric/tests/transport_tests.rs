use constellation_fabric::{
    channel::Channel,
    codec::JsonCodec,
    error::Error,
    request::{request, send},
    transport::{Connector, MemoryBroker, Transport},
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestMessage {
    id: u32,
    data: String,
}

/// Helper that answers every request on `subject` with the payload it received
async fn spawn_echo(broker: &MemoryBroker, subject: &str, group: Option<&str>) {
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe(subject, group).await.unwrap();

    tokio::spawn(async move {
        while let Some(Ok(message)) = subscription.next().await {
            if let Some(reply_to) = message.reply_to {
                connection
                    .publish(&reply_to, &message.payload)
                    .await
                    .unwrap();
            }
        }
    });
}

#[tokio::test]
async fn publish_reaches_plain_subscriber() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe("updates", None).await.unwrap();

    connection.publish("updates", b"hello world").await.unwrap();

    let message = subscription.next().await.unwrap().unwrap();
    assert_eq!(message.subject, "updates");
    assert_eq!(message.payload, b"hello world");
    assert!(message.reply_to.is_none());
}

#[tokio::test]
async fn every_plain_subscriber_gets_a_copy() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut first = connection.subscribe("updates", None).await.unwrap();
    let mut second = connection.subscribe("updates", None).await.unwrap();

    connection.publish("updates", b"fan-out").await.unwrap();

    assert_eq!(first.next().await.unwrap().unwrap().payload, b"fan-out");
    assert_eq!(second.next().await.unwrap().unwrap().payload, b"fan-out");
}

#[tokio::test]
async fn queue_group_delivers_each_message_once() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut first = connection.subscribe("work", Some("workers")).await.unwrap();
    let mut second = connection.subscribe("work", Some("workers")).await.unwrap();

    for i in 0..10u8 {
        connection.publish("work", &[i]).await.unwrap();
    }
    connection.close().await.unwrap();

    let mut received = Vec::new();
    while let Some(Ok(message)) = first.next().await {
        received.push(message.payload[0]);
    }
    let first_count = received.len();
    while let Some(Ok(message)) = second.next().await {
        received.push(message.payload[0]);
    }

    received.sort_unstable();
    assert_eq!(received, (0..10).collect::<Vec<u8>>());
    // Round robin spreads the load over both members
    assert_eq!(first_count, 5);
}

#[tokio::test]
async fn request_receives_reply() {
    let broker = MemoryBroker::new();
    spawn_echo(&broker, "echo", Some("echoers")).await;

    let client = broker.connection().unwrap();
    let reply = client
        .request("echo", b"ping", Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(reply.payload, b"ping");
    assert!(reply.subject.starts_with("_INBOX."));
}

#[tokio::test]
async fn request_without_responder_times_out() {
    let broker = MemoryBroker::new();
    let client = broker.connection().unwrap();

    let started = Instant::now();
    let result = client
        .request("nobody-home", b"hello", Duration::from_millis(100))
        .await;

    assert!(started.elapsed() >= Duration::from_millis(100));
    match result.unwrap_err() {
        e @ Error::Timeout { .. } => {
            assert!(e.is_timeout());
            assert!(e.to_string().contains("timed out"));
        }
        e => panic!("Expected timeout error, got {:?}", e),
    }
    // The reply inbox is gone again
    assert_eq!(broker.subscriber_count("nobody-home"), 0);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let broker = MemoryBroker::builder().max_payload(16).build();
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe("limited", None).await.unwrap();

    let result = connection.publish("limited", &[0u8; 17]).await;
    match result.unwrap_err() {
        Error::PayloadTooLarge { size, max } => {
            assert_eq!(size, 17);
            assert_eq!(max, 16);
        }
        e => panic!("Expected PayloadTooLarge, got {:?}", e),
    }

    // Exactly at the limit is fine
    connection.publish("limited", &[1u8; 16]).await.unwrap();
    assert_eq!(subscription.next().await.unwrap().unwrap().payload.len(), 16);
}

#[tokio::test]
async fn invalid_subjects_are_rejected() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();

    assert!(matches!(
        connection.publish("", b"x").await,
        Err(Error::InvalidSubject(_))
    ));
    assert!(matches!(
        connection.subscribe("has space", None).await,
        Err(Error::InvalidSubject(_))
    ));
}

#[tokio::test]
async fn unsubscribe_ends_subscription() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe("topic", None).await.unwrap();
    let other = connection.subscribe("topic", None).await.unwrap();
    assert_eq!(broker.subscriber_count("topic"), 2);
    assert_eq!(subscription.subject(), "topic");
    assert!(other.id().as_u64() > subscription.id().as_u64());
    assert_eq!(
        subscription.id().to_string(),
        format!("sid-{}", subscription.id().as_u64())
    );

    connection.unsubscribe(subscription.id()).await.unwrap();
    connection.unsubscribe(other.id()).await.unwrap();

    assert_eq!(broker.subscriber_count("topic"), 0);
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn closing_connection_releases_everything() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let _subscription = connection.subscribe("topic", Some("group")).await.unwrap();
    assert_eq!(broker.open_connections(), 1);

    connection.close().await.unwrap();
    // Second close is a no-op
    connection.close().await.unwrap();

    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.subscriber_count("topic"), 0);
    assert!(!connection.is_connected());
    assert!(matches!(
        connection.publish("topic", b"late").await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn dropping_connection_releases_it() {
    let broker = MemoryBroker::new();
    {
        let connection = broker.connection().unwrap();
        let _subscription = connection.subscribe("topic", None).await.unwrap();
        assert_eq!(broker.open_connections(), 1);
    }

    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.subscriber_count("topic"), 0);
}

#[tokio::test]
async fn shutdown_reports_fatal_error_to_subscribers() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe("topic", None).await.unwrap();
    assert!(!broker.is_shut_down());

    broker.shutdown();
    assert!(broker.is_shut_down());

    match subscription.next().await {
        Some(Err(Error::ConnectionClosed)) => {}
        other => panic!("Expected fatal ConnectionClosed, got {:?}", other),
    }
    assert!(subscription.next().await.is_none());
    assert!(!connection.is_connected());
    assert!(matches!(broker.connection(), Err(Error::Connect(_))));
}

#[tokio::test]
async fn channel_with_codec_roundtrip() {
    let broker = MemoryBroker::new();
    spawn_echo(&broker, "echo", None).await;

    let expected = TestMessage {
        id: 42,
        data: "test data".to_string(),
    };

    let channel = Channel::connect(&broker, JsonCodec).await.unwrap();
    let response: TestMessage = channel
        .request("echo", &expected, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(response, expected);
    channel.close().await.unwrap();
}

#[tokio::test]
async fn one_off_request_closes_its_connection() {
    let broker = MemoryBroker::new();
    spawn_echo(&broker, "echo", None).await;
    let baseline = broker.open_connections();

    let message = TestMessage {
        id: 7,
        data: "once".to_string(),
    };
    let reply: TestMessage = request(&broker, "echo", &message, JsonCodec, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, message);
    assert_eq!(broker.open_connections(), baseline);

    // The failure path closes the connection too
    let result: Result<TestMessage, Error> = request(
        &broker,
        "silent",
        &message,
        JsonCodec,
        Duration::from_millis(20),
    )
    .await;
    assert!(result.unwrap_err().is_timeout());
    assert_eq!(broker.open_connections(), baseline);
}

#[tokio::test]
async fn fire_and_forget_send() {
    let broker = MemoryBroker::new();
    let connection = broker.connection().unwrap();
    let mut subscription = connection.subscribe("events", None).await.unwrap();

    let message = TestMessage {
        id: 1,
        data: "event".to_string(),
    };
    send(&broker, "events", &message, JsonCodec).await.unwrap();

    let delivered = subscription.next().await.unwrap().unwrap();
    let decoded: TestMessage = serde_json::from_slice(&delivered.payload).unwrap();
    assert_eq!(decoded, message);
}

#[tokio::test]
async fn connector_trait_usage() {
    let broker = MemoryBroker::new();

    // Test that we can use the Connector trait generically
    async fn connect_generic(connector: &dyn Connector) -> Result<Box<dyn Transport>, Error> {
        connector.connect().await
    }

    let transport = connect_generic(&broker).await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(broker.open_connections(), 1);

    transport.close().await.unwrap();
    assert_eq!(broker.open_connections(), 0);
}
