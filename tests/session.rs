mod support;

use chezflora_client::state::{CredentialStore, SessionEvent};
use chezflora_client::types::{PasswordChange, ProfileUpdate};
use chezflora_client::ApiError;
use mockito::Matcher;
use reqwest::StatusCode;
use serde_json::json;
use support::{client_for, drain, seed, EXPIRED_BODY};

const PROFILE: &str =
    r#"{"id":"7","username":"rose","email":"rose@example.com","role":"client","is_active":true,"is_banned":false}"#;

#[tokio::test]
async fn login_stores_pair_and_loads_profile() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"username": "rose", "password": "pw"})))
        .with_status(200)
        .with_body(r#"{"access":"a1","refresh":"r1"}"#)
        .expect(1)
        .create_async()
        .await;
    let profile = server
        .mock("GET", "/api/utilisateurs/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_body(PROFILE)
        .expect(1)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    let mut events = client.subscribe();

    let user = client.login("rose", "pw").await.unwrap();
    assert_eq!(user.username, "rose");
    assert!(client.is_authenticated());
    assert_eq!(store.get("access_token").unwrap().as_deref(), Some("a1"));
    assert_eq!(store.get("refresh_token").unwrap().as_deref(), Some("r1"));
    assert!(matches!(
        drain(&mut events).first(),
        Some(SessionEvent::LoggedIn { .. })
    ));

    token.assert_async().await;
    profile.assert_async().await;
}

#[tokio::test]
async fn bad_credentials_never_refresh() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token/")
        .with_status(401)
        .with_body(r#"{"detail":"No active account found with the given credentials"}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .expect(0)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("stale"), Some("r0"));

    let err = client.login("rose", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(
        err.detail(),
        Some("No active account found with the given credentials")
    );
    assert_eq!(store.get("refresh_token").unwrap().as_deref(), Some("r0"));
    refresh.assert_async().await;
}

#[tokio::test]
async fn logout_clears_both_credentials() {
    let server = mockito::Server::new_async().await;
    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));
    let mut events = client.subscribe();

    client.logout().unwrap();
    assert!(!client.is_authenticated());
    assert_eq!(store.get("access_token").unwrap(), None);
    assert_eq!(store.get("refresh_token").unwrap(), None);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::LoggedOut { .. }]
    ));
}

#[tokio::test]
async fn restore_session_without_token_is_none() {
    let mut server = mockito::Server::new_async().await;
    let profile = server
        .mock("GET", "/api/utilisateurs/me/")
        .expect(0)
        .create_async()
        .await;

    let (client, _store) = client_for(&server);
    assert_eq!(client.restore_session().await.unwrap(), None);
    profile.assert_async().await;
}

#[tokio::test]
async fn restore_session_refreshes_expired_token() {
    let mut server = mockito::Server::new_async().await;
    let _expired = server
        .mock("GET", "/api/utilisateurs/me/")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_body(EXPIRED_BODY)
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(200)
        .with_body(r#"{"access":"new"}"#)
        .create_async()
        .await;
    let _renewed = server
        .mock("GET", "/api/utilisateurs/me/")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(PROFILE)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("old"), Some("r1"));

    let user = client.restore_session().await.unwrap().unwrap();
    assert_eq!(user.id, "7");
    assert_eq!(store.get("access_token").unwrap().as_deref(), Some("new"));
}

#[tokio::test]
async fn restore_session_with_dead_refresh_token_is_none() {
    let mut server = mockito::Server::new_async().await;
    let _expired = server
        .mock("GET", "/api/utilisateurs/me/")
        .with_status(401)
        .with_body(EXPIRED_BODY)
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/api/token/refresh/")
        .with_status(401)
        .with_body(r#"{"detail":"Token is invalid or expired","code":"token_not_valid"}"#)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("old"), Some("r1"));
    let mut events = client.subscribe();

    assert_eq!(client.restore_session().await.unwrap(), None);
    assert!(!client.is_authenticated());
    let events = drain(&mut events);
    assert_eq!(events.iter().filter(|e| e.is_invalidated()).count(), 1);
}

#[tokio::test]
async fn restore_session_surfaces_server_errors() {
    let mut server = mockito::Server::new_async().await;
    let _unavailable = server
        .mock("GET", "/api/utilisateurs/me/")
        .with_status(503)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));

    let err = client.restore_session().await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
    ));
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn inactive_account_login_reports_pending_user() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token/")
        .with_status(401)
        .with_body(r#"{"detail":"Utilisateur non actif","user_id":"42"}"#)
        .create_async()
        .await;

    let (client, _store) = client_for(&server);
    let err = client.login("rose", "pw").await.unwrap_err();
    assert_eq!(err.detail(), Some("Utilisateur non actif"));
    assert_eq!(err.pending_user_id().as_deref(), Some("42"));
}

#[tokio::test]
async fn register_returns_pending_user() {
    let mut server = mockito::Server::new_async().await;
    let register = server
        .mock("POST", "/api/register/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({
            "username": "rose",
            "email": "rose@example.com",
            "password": "pw"
        })))
        .with_status(201)
        .with_body(r#"{"user_id":"42","message":"OTP envoyé"}"#)
        .expect(1)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("someone-else"), Some("r0"));

    let registration = client.register("rose", "rose@example.com", "pw").await.unwrap();
    assert_eq!(registration.user_id, "42");
    register.assert_async().await;
}

#[tokio::test]
async fn register_existing_inactive_account_reports_pending_user() {
    let mut server = mockito::Server::new_async().await;
    let _register = server
        .mock("POST", "/api/register/")
        .with_status(400)
        .with_body(r#"{"error":"Utilisateur existe mais non actif","user_id":"42"}"#)
        .create_async()
        .await;

    let (client, _store) = client_for(&server);
    let err = client.register("rose", "rose@example.com", "pw").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.detail(), Some("Utilisateur existe mais non actif"));
    assert_eq!(err.pending_user_id().as_deref(), Some("42"));
}

#[tokio::test]
async fn otp_and_password_reset_go_out_anonymously() {
    let mut server = mockito::Server::new_async().await;
    let verify = server
        .mock("POST", "/api/verify-otp/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"user_id": "42", "code": "123456"})))
        .with_status(200)
        .with_body(r#"{"message":"Compte activé"}"#)
        .expect(1)
        .create_async()
        .await;
    let resend = server
        .mock("POST", "/api/resend-otp/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"user_id": "42"})))
        .with_status(200)
        .with_body(r#"{"message":"Nouveau code envoyé"}"#)
        .expect(1)
        .create_async()
        .await;
    let reset = server
        .mock("POST", "/api/reset_password/")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({"email": "rose@example.com"})))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));

    client.resend_otp("42").await.unwrap();
    client.verify_otp("42", "123456").await.unwrap();
    client.reset_password("rose@example.com").await.unwrap();

    verify.assert_async().await;
    resend.assert_async().await;
    reset.assert_async().await;
}

#[tokio::test]
async fn wrong_otp_never_refreshes() {
    let mut server = mockito::Server::new_async().await;
    let _verify = server
        .mock("POST", "/api/verify-otp/")
        .with_status(401)
        .with_body(r#"{"error":"Code OTP invalide"}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token/refresh/")
        .expect(0)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));

    let err = client.verify_otp("42", "000000").await.unwrap_err();
    assert_eq!(err.detail(), Some("Code OTP invalide"));
    assert!(client.is_authenticated());
    refresh.assert_async().await;
}

#[tokio::test]
async fn profile_and_password_changes_carry_the_session() {
    let mut server = mockito::Server::new_async().await;
    let update = server
        .mock("PATCH", "/api/update-profile/")
        .match_header("authorization", "Bearer a1")
        .match_body(Matcher::Json(json!({"email": "rose@example.com"})))
        .with_status(200)
        .with_body(PROFILE)
        .expect(1)
        .create_async()
        .await;
    let change = server
        .mock("POST", "/api/change-password/")
        .match_header("authorization", "Bearer a1")
        .match_body(Matcher::Json(json!({
            "old_password": "pw",
            "new_password": "pw2",
            "confirm_password": "pw2"
        })))
        .with_status(200)
        .with_body(r#"{"detail":"Mot de passe modifié"}"#)
        .expect(1)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));

    let user = client
        .update_profile(&ProfileUpdate {
            email: Some("rose@example.com".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(user.email, "rose@example.com");
    client
        .change_password(&PasswordChange {
            old_password: "pw",
            new_password: "pw2",
            confirm_password: "pw2",
        })
        .await
        .unwrap();

    update.assert_async().await;
    change.assert_async().await;
}

#[tokio::test]
async fn delete_account_forgets_credentials() {
    let mut server = mockito::Server::new_async().await;
    let delete = server
        .mock("DELETE", "/api/utilisateurs/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));
    let mut events = client.subscribe();

    client.delete_account().await.unwrap();
    assert!(!client.is_authenticated());
    assert_eq!(store.get("refresh_token").unwrap(), None);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::LoggedOut { .. }]
    ));
    delete.assert_async().await;
}

#[tokio::test]
async fn failed_account_deletion_keeps_the_session() {
    let mut server = mockito::Server::new_async().await;
    let _delete = server
        .mock("DELETE", "/api/utilisateurs/me/")
        .with_status(500)
        .create_async()
        .await;

    let (client, store) = client_for(&server);
    seed(&store, Some("a1"), Some("r1"));

    let err = client.delete_account().await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(client.is_authenticated());
}
