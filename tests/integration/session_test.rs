use mockito::Matcher;
use serde_json::json;

use tokengate_lib::{AuthProjection, CredentialPair, LoginCredentials};

use crate::harness::{user_json, Harness};

#[tokio::test]
async fn login_persists_pair_and_authorizes_profile() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(None).await?;

    let login = h
        .server
        .mock("POST", "/auth/login")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({
            "email": "ada@example.com",
            "password": "hunter2"
        })))
        .with_status(200)
        .with_body(
            json!({
                "data": {
                    "user": user_json(),
                    "tokens": {"accessToken": "A1", "refreshToken": "R1"}
                },
                "success": true
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let profile = h
        .server
        .mock("GET", "/auth/profile")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_body(user_json().to_string())
        .expect(1)
        .create_async()
        .await;

    //* When
    h.session
        .login(&LoginCredentials {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        })
        .await?;
    let user = h.session.get_profile().await?;

    //* Then
    login.assert_async().await;
    profile.assert_async().await;
    assert_eq!(user.name, "Ada");
    assert_eq!(h.persisted(), Some(CredentialPair::new("A1", "R1")));
    assert!(h.session.snapshot().await.is_authenticated);
    Ok(())
}

#[tokio::test]
async fn cold_start_restores_session_from_disk() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    let profile = h
        .server
        .mock("GET", "/auth/profile")
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_body(json!({"data": user_json()}).to_string())
        .expect(1)
        .create_async()
        .await;

    //* When
    let restored = h.session.restore().await?;

    //* Then
    profile.assert_async().await;
    assert_eq!(restored.map(|u| u.id), Some("u1".to_string()));
    match h.session.projector().projection().await {
        AuthProjection::Authenticated { user } => assert_eq!(user.email, "ada@example.com"),
        other => panic!("expected authenticated, got {}", other),
    }
    Ok(())
}

#[tokio::test]
async fn logout_clears_disk_even_when_server_fails() -> anyhow::Result<()> {
    //* Given
    let mut h = Harness::start(Some(CredentialPair::new("A1", "R1"))).await?;

    let logout = h
        .server
        .mock("POST", "/auth/logout")
        .match_header("authorization", "Bearer A1")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    //* When
    let result = h.session.logout().await;

    //* Then
    logout.assert_async().await;
    assert!(result.is_err());
    assert!(h.store.get().is_none());
    assert!(h.persisted().is_none());
    assert_eq!(
        h.session.projector().projection().await,
        AuthProjection::Anonymous
    );
    Ok(())
}
