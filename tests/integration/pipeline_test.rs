use mockito::Matcher;
use serde_json::{json, Value};

use tokengate_lib::{ApiError, ApiRequest, CredentialPair};

use crate::harness::{pair_json, Harness};

#[tokio::test]
async fn expired_access_is_refreshed_and_replayed() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    let rejected = h
        .server
        .mock("GET", "/items")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .with_body(r#"{"message":"Token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = h
        .server
        .mock("GET", "/items")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items":[1,2,3]}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = h
        .server
        .mock("POST", "/auth/refresh")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"refreshToken": "R1"})))
        .with_status(200)
        .with_body(pair_json("A2", "R2"))
        .expect(1)
        .create_async()
        .await;

    //* When
    let body: Value = h.session.client().get("/items").await?;

    //* Then
    rejected.assert_async().await;
    accepted.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(body, json!({"items": [1, 2, 3]}));
    assert_eq!(h.persisted(), Some(CredentialPair::new("A2", "R2")));
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_clears_persisted_pair() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    let items = h
        .server
        .mock("GET", "/items")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = h
        .server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .with_body(r#"{"message":"Refresh token expired"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let result = h.session.client().send(ApiRequest::get("/items")).await;

    //* Then
    items.assert_async().await;
    refresh.assert_async().await;
    assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
    assert!(h.store.get().is_none());
    assert!(h.persisted().is_none());
    assert!(!h.session.snapshot().await.is_authenticated);
    Ok(())
}

#[tokio::test]
async fn server_errors_pass_through_without_refresh() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    let items = h
        .server
        .mock("GET", "/items")
        .with_status(500)
        .with_body(r#"{"message":"Database down"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = h
        .server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    //* When
    let result = h.session.client().send(ApiRequest::get("/items")).await;

    //* Then
    items.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(
        result.unwrap_err(),
        ApiError::Http {
            status: 500,
            message: "Database down".into()
        }
    );
    assert_eq!(h.persisted(), Some(CredentialPair::new("A1", "R1")));
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() -> anyhow::Result<()> {
    //* Given
    let h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    //* When
    let result = h
        .session
        .client()
        .send(ApiRequest::get("http://127.0.0.1:1/unreachable"))
        .await;

    //* Then
    assert!(matches!(result, Err(ApiError::Network { .. })));
    assert!(h.store.get().is_some());
    Ok(())
}
