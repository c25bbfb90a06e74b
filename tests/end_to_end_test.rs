mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mockito::{Matcher, Server};
use serde_json::json;
use settlement_core::domain::TransactionStatus;
use settlement_core::handlers::{create_router, ApiState};
use settlement_core::ports::TransactionRepository;
use settlement_core::queue::publish_json;
use tower::ServiceExt;

#[tokio::test]
async fn test_deposit_settles_and_notifies_client() {
    let mut gateway_server = Server::new_async().await;
    let mut client_server = Server::new_async().await;
    let prefix = "http://localhost:8080/callback";

    let gateway = gateway_server
        .mock("POST", "/deposit")
        .match_body(Matcher::PartialJson(json!({
            "transaction_id": "t1",
            "amount": 100.0,
            "currency": "USD",
            "callback_url": format!("{}/t1", prefix),
            "account": "234556780987"
        })))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let client = client_server
        .mock("POST", "/payments/hook")
        .match_body(Matcher::PartialJson(json!({
            "transaction_id": "t1",
            "amount": 100.0,
            "currency": "USD",
            "status": "successful",
            "type": "deposit"
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let gateway_url = gateway_server.url();
    let h = common::harness(&[
        ("GATEWAY_A_URL", gateway_url.as_str()),
        ("API_CALLBACK_PREFIX", prefix),
    ]);

    let callback = format!("{}/payments/hook", client_server.url());
    let tx = h
        .repository
        .insert(&common::deposit("t1", "a", Some(&callback)))
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.retry_count, 0);

    let roles = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move {
            tokio::try_join!(
                pipeline.run_processor(),
                pipeline.run_correlator(),
                pipeline.run_dispatcher(),
            )
        })
    };
    let bus = &h.bus;
    assert!(
        common::eventually(|| async move {
            ["transactions", "callbacks", "dispatch"]
                .iter()
                .all(|topic| bus.subscriber_count(topic) == 1)
        })
        .await
    );

    // Upstream enqueues the new transaction.
    publish_json(h.pipeline.bus.as_ref(), "transactions", &tx)
        .await
        .unwrap();

    let repository = &h.repository;
    let processing = common::eventually(|| async move {
        let stored = repository.get_by_id("t1").await.unwrap();
        stored.status == TransactionStatus::Processing && stored.retry_count == 1
    })
    .await;
    assert!(processing);
    assert!(common::eventually(|| gateway.matched_async()).await);

    // The gateway calls back through the intake endpoint.
    let app = create_router(ApiState {
        bus: h.pipeline.bus.clone(),
        callback_topic: "callbacks".to_string(),
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/callback/t1")
                .body(Body::from(r#"{"transaction_id":"t1","status":"successful"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let settled = common::eventually(|| async move {
        let stored = repository.get_by_id("t1").await.unwrap();
        stored.status == TransactionStatus::Successful && stored.updated_at.is_some()
    })
    .await;
    assert!(settled);
    assert!(common::eventually(|| client.matched_async()).await);

    h.bus.close();
    roles.await.unwrap().unwrap();

    let stored = h.repository.get_by_id("t1").await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Successful);
    assert_eq!(stored.retry_count, 1);
    gateway.assert_async().await;
    client.assert_async().await;
}
