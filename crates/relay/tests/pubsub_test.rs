//! Channel delivery through the relay broker.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;

use collectify_relay::channels;
use collectify_relay::{
    Attach, EventBroker, EventPublisher, EventSubscriber, Message, RelayEndpoints, ZmqPublisher,
    ZmqSubscriber,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn broker_routes_each_channel_and_counts_it() {
    let endpoints = RelayEndpoints::tcp("127.0.0.1", 16200, 16201);
    let (stop, stopped) = oneshot::channel::<()>();
    let broker = {
        let endpoints = endpoints.clone();
        tokio::spawn(async move {
            EventBroker::new(endpoints)
                .run(async {
                    let _ = stopped.await;
                })
                .await
        })
    };
    tokio::time::sleep(SETTLE).await;

    let publisher = ZmqPublisher::open(&endpoints.publishers, Attach::Broker)
        .await
        .unwrap();
    let articles = ZmqSubscriber::follow(&endpoints.subscribers, &["articles:"])
        .await
        .unwrap();
    let errors = ZmqSubscriber::follow(&endpoints.subscribers, &[channels::ERRORS])
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    for guid in ["a", "b"] {
        publisher
            .publish(Message::new(channels::ARTICLES_NEW, &serde_json::json!({ "guid": guid })).unwrap())
            .await
            .unwrap();
    }
    publisher
        .publish(Message::new(channels::ERRORS, &serde_json::json!({ "stage": "poll" })).unwrap())
        .await
        .unwrap();

    for guid in ["a", "b"] {
        let article = timeout(TIMEOUT, articles.recv())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(article.channel, channels::ARTICLES_NEW);
        assert_eq!(article.json().unwrap()["guid"], guid);
    }
    let error = timeout(TIMEOUT, errors.recv())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(error.json().unwrap()["stage"], "poll");

    // The errors message must not leak into the articles follower.
    assert!(timeout(Duration::from_millis(300), articles.recv()).await.is_err());

    stop.send(()).unwrap();
    let stats = timeout(TIMEOUT, broker)
        .await
        .expect("broker did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(stats.forwarded(channels::ARTICLES_NEW), 2);
    assert_eq!(stats.forwarded(channels::ERRORS), 1);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn follower_without_prefixes_sees_every_channel() {
    let endpoints = RelayEndpoints::tcp("127.0.0.1", 16210, 16211);
    let broker = {
        let endpoints = endpoints.clone();
        tokio::spawn(async move { EventBroker::new(endpoints).run(std::future::pending()).await })
    };
    tokio::time::sleep(SETTLE).await;

    let publisher = ZmqPublisher::open(&endpoints.publishers, Attach::Broker)
        .await
        .unwrap();
    let everything = ZmqSubscriber::follow::<&str>(&endpoints.subscribers, &[])
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    for channel in [channels::ARTICLES_UPDATED, channels::ERRORS] {
        publisher
            .publish(Message::new(channel, &channel).unwrap())
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..2 {
        let msg = timeout(TIMEOUT, everything.recv())
            .await
            .expect("timed out")
            .unwrap();
        seen.push(msg.channel);
    }
    seen.sort();
    assert_eq!(seen, vec![channels::ARTICLES_UPDATED, channels::ERRORS]);

    broker.abort();
}
