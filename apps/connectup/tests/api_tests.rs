//! HTTP integration tests over an in-memory store.
//!
//! Every test builds its own router with memory-backed providers so mail,
//! push and blob side effects can be inspected.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use connectup::api::{self, AppState};
use connectup::config::{Config, Environment};
use connectup::hub::TOPIC_NOTIFICATION;
use connectup::providers::{MemoryBlobStore, MemoryMailer, MemoryPush};
use connectup_core::{Store, UserId};
use serde_json::{Value, json};
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

struct Harness {
    server: TestServer,
    state: AppState,
    mailer: Arc<MemoryMailer>,
    blobs: Arc<MemoryBlobStore>,
}

fn harness_with(config: Config) -> Harness {
    let mailer = Arc::new(MemoryMailer::new());
    let blobs = Arc::new(MemoryBlobStore::new("http://files.test"));
    let state = AppState::new(Store::in_memory().unwrap(), config)
        .with_mailer(mailer.clone())
        .with_push(Arc::new(MemoryPush::new()))
        .with_blobs(blobs.clone());
    let server = TestServer::new(api::router(state.clone())).unwrap();
    Harness {
        server,
        state,
        mailer,
        blobs,
    }
}

fn harness() -> Harness {
    harness_with(Config::default())
}

/// Register a user and return `(token, id)`.
async fn register(server: &TestServer, name: &str, email: &str) -> (String, UserId) {
    let res = server
        .post("/api/register")
        .json(&json!({ "name": name, "email": email, "password": "password123" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    let token = body["token"].as_str().unwrap().to_string();
    let id = UserId(body["userId"].as_u64().unwrap());
    (token, id)
}

async fn create_admin(server: &TestServer) -> String {
    let res = server
        .post("/api/test/create")
        .json(&json!({ "name": "Admin", "email": "admin@example.com", "password": "password123" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["token"].as_str().unwrap().to_string()
}

/// Send a connection request from `a` to `b` and accept it.
async fn connect(server: &TestServer, a_token: &str, b_token: &str, b_id: UserId) {
    let res = server
        .post("/api/user/connection/request/send")
        .authorization_bearer(a_token)
        .json(&json!({ "userId": b_id }))
        .await;
    res.assert_status_ok();
    let request: Value = res.json();
    server
        .put("/api/user/connection/request/status")
        .authorization_bearer(b_token)
        .json(&json!({ "requestId": request["id"], "status": "accepted" }))
        .await
        .assert_status_ok();
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

// =============================================================================
// HEALTH AND AUTH
// =============================================================================

#[tokio::test]
async fn test_health() {
    let h = harness();
    let res = h.server.get("/health").await;
    res.assert_status_ok();
    res.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_register_then_login() {
    let h = harness();
    register(&h.server, "Alice", "alice@example.com").await;

    let res = h
        .server
        .post("/api/login")
        .json(&json!({ "email": "alice@example.com", "password": "password123" }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["role"], "user");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_login_wrong_password_is_unauthorized() {
    let h = harness();
    register(&h.server, "Alice", "alice@example.com").await;

    let res = h
        .server
        .post("/api/login")
        .json(&json!({ "email": "alice@example.com", "password": "wrong-password" }))
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = res.json();
    assert_eq!(body["statusCode"], 401);
    assert!(body["messageToUser"].is_string());
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let h = harness();
    register(&h.server, "Alice", "alice@example.com").await;
    let res = h
        .server
        .post("/api/register")
        .json(&json!({ "name": "Other", "email": "alice@example.com", "password": "password123" }))
        .await;
    res.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = harness();
    let res = h
        .server
        .post("/api/login")
        .json(&json!({ "email": "alice@example.com" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["messageToUser"], "error parsing request");
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_413() {
    let h = harness_with(Config {
        max_upload_mb: 1,
        ..Config::default()
    });
    let padding = "x".repeat(2 * 1024 * 1024);
    let res = h
        .server
        .post("/api/login")
        .json(&json!({ "email": "alice@example.com", "password": padding }))
        .await;
    res.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json();
    assert_eq!(body["statusCode"], 413);
}

#[tokio::test]
async fn test_router_builds_for_every_environment() {
    for env in [Environment::Local, Environment::Dev, Environment::Main] {
        let h = harness_with(Config {
            env,
            ..Config::default()
        });
        h.server.get("/health").await.assert_status_ok();
    }
}

#[tokio::test]
async fn test_user_routes_require_token() {
    let h = harness();
    h.server
        .get("/api/user/info")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/api/user/info")
        .authorization_bearer("not-a-token")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_info_reports_profile_and_flags() {
    let h = harness();
    let (token, id) = register(&h.server, "Alice", "alice@example.com").await;

    let res = h.server.get("/api/user/info").authorization_bearer(&token).await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["id"], id.get());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["isEmailVerified"], false);
    assert!(body["verificationFlows"].is_object());
    assert_eq!(body["isProfileCompleted"], false);
}

#[tokio::test]
async fn test_deleted_account_token_stops_working() {
    let h = harness();
    let (token, _) = register(&h.server, "Alice", "alice@example.com").await;

    h.server
        .delete("/api/user")
        .authorization_bearer(&token)
        .await
        .assert_status_ok();
    h.server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_info_reports_configured_verification_flows() {
    let h = harness_with(Config {
        email_verification_flow: true,
        phone_verification_compulsory: true,
        ..Config::default()
    });
    let (token, _) = register(&h.server, "Alice", "alice@example.com").await;

    let body: Value = h
        .server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .await
        .json();
    let flows = &body["verificationFlows"];
    assert_eq!(flows["isEmailVerificationFlowNeeded"], true);
    assert_eq!(flows["isEmailVerificationCompulsory"], false);
    assert_eq!(flows["isPhoneVerificationFlowNeeded"], false);
    assert_eq!(flows["isPhoneVerificationCompulsory"], true);
}

// =============================================================================
// SESSIONS
// =============================================================================

async fn start_session(server: &TestServer, token: &str, device: &str) -> String {
    let res = server
        .post("/api/user/session")
        .authorization_bearer(token)
        .json(&json!({ "platform": "android", "deviceId": device }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_new_session_on_device_ends_cached_previous_session() {
    let h = harness();
    let (token, _) = register(&h.server, "Alice", "alice@example.com").await;

    let first = start_session(&h.server, &token, "dev-1").await;
    h.server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .add_header("session", first.as_str())
        .await
        .assert_status_ok();

    let second = start_session(&h.server, &token, "dev-1").await;
    assert_ne!(first, second);

    h.server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .add_header("session", first.as_str())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .add_header("session", second.as_str())
        .await
        .assert_status_ok();
}

// =============================================================================
// OTP
// =============================================================================

#[tokio::test]
async fn test_email_otp_verifies_account() {
    let h = harness();
    let (token, _) = register(&h.server, "Alice", "alice@example.com").await;

    h.server
        .post("/api/send_otp")
        .json(&json!({ "target": "alice@example.com", "reason": "verify_email" }))
        .await
        .assert_status_ok();
    let email = h.mailer.last_to("alice@example.com").unwrap();
    let code = email.data.get("otp").unwrap().clone();

    h.server
        .post("/api/verify_otp")
        .json(&json!({ "target": "alice@example.com", "otp": "000000x", "reason": "verify_email" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    h.server
        .post("/api/verify_otp")
        .json(&json!({ "target": "alice@example.com", "otp": code, "reason": "verify_email" }))
        .await
        .assert_status_ok();

    let info: Value = h
        .server
        .get("/api/user/info")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(info["isEmailVerified"], true);
}

#[tokio::test]
async fn test_password_reset_requires_known_email() {
    let h = harness();
    h.server
        .post("/api/send_otp")
        .json(&json!({ "target": "nobody@example.com", "reason": "reset_password" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_send_limit_counts_only_delivered_mail() {
    let h = harness_with(Config {
        email_limit: 2,
        ..Config::default()
    });
    register(&h.server, "Alice", "alice@example.com").await;

    // Rejected requests never reach the mailer and leave the quota alone.
    for _ in 0..3 {
        h.server
            .post("/api/send_otp")
            .json(&json!({ "target": "nobody@example.com", "reason": "reset_password" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        h.server
            .post("/api/send_otp")
            .json(&json!({ "target": "alice@example.com" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    let send = || {
        h.server
            .post("/api/send_otp")
            .json(&json!({ "target": "alice@example.com", "reason": "verify_email" }))
    };
    send().await.assert_status_ok();
    send().await.assert_status_ok();
    send()
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.mailer.sent().len(), 2);
}

// =============================================================================
// CONNECTIONS AND NOTIFICATIONS
// =============================================================================

#[tokio::test]
async fn test_connection_request_notifies_recipient() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    let (bob, bob_id) = register(&h.server, "Bob", "bob@example.com").await;
    let mut inbox = h.state.hub.subscribe(bob_id);

    h.server
        .post("/api/user/connection/request/send")
        .authorization_bearer(&alice)
        .json(&json!({ "userId": bob_id }))
        .await
        .assert_status_ok();

    let event = inbox.try_recv().unwrap();
    assert_eq!(event.topic, TOPIC_NOTIFICATION);

    let count: Value = h
        .server
        .get("/api/user/notifications_count")
        .authorization_bearer(&bob)
        .await
        .json();
    assert_eq!(count["count"], 1);

    let inbound: Value = h
        .server
        .get("/api/user/connection/request/inbound")
        .authorization_bearer(&bob)
        .await
        .json();
    assert_eq!(inbound.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_accepted_request_counts_as_connection() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    let (bob, bob_id) = register(&h.server, "Bob", "bob@example.com").await;
    connect(&h.server, &alice, &bob, bob_id).await;

    let counts: Value = h
        .server
        .get("/api/user/connections_count")
        .authorization_bearer(&alice)
        .await
        .json();
    assert_eq!(counts["connections"], 1);
}

#[tokio::test]
async fn test_connection_list_and_all_recommendations() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    let (bob, bob_id) = register(&h.server, "Bob", "bob@example.com").await;
    let (carol, carol_id) = register(&h.server, "Carol", "carol@example.com").await;
    connect(&h.server, &alice, &bob, bob_id).await;
    connect(&h.server, &bob, &carol, carol_id).await;

    let list: Value = h
        .server
        .get("/api/user/connections_list")
        .authorization_bearer(&bob)
        .await
        .json();
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alice", "Carol"]);

    let recs: Value = h
        .server
        .post("/api/user/all_recommendations")
        .authorization_bearer(&alice)
        .await
        .json();
    let recs = recs.as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["user"]["id"], carol_id.get());
}

#[tokio::test]
async fn test_request_to_self_is_rejected() {
    let h = harness();
    let (alice, alice_id) = register(&h.server, "Alice", "alice@example.com").await;
    let res = h
        .server
        .post("/api/user/connection/request/send")
        .authorization_bearer(&alice)
        .json(&json!({ "userId": alice_id }))
        .await;
    assert!(res.status_code().is_client_error());
}

// =============================================================================
// GROUPS AND POSTS
// =============================================================================

#[tokio::test]
async fn test_group_post_and_like() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;

    let res = h
        .server
        .post("/api/group")
        .authorization_bearer(&alice)
        .json(&json!({ "name": "Founders", "description": "early stage" }))
        .await;
    res.assert_status_ok();
    let group: Value = res.json();
    let group_id = group["id"].as_u64().unwrap();

    let res = h
        .server
        .post(&format!("/api/group/{group_id}/post"))
        .authorization_bearer(&alice)
        .json(&json!({ "body": "hello founders" }))
        .await;
    res.assert_status_ok();
    let post: Value = res.json();
    let post_id = post["id"].as_u64().unwrap();

    let liked: Value = h
        .server
        .post(&format!("/api/group/{group_id}/post/{post_id}/like"))
        .authorization_bearer(&alice)
        .await
        .json();
    assert_eq!(liked["isLiked"], true);

    let page: Value = h
        .server
        .get(&format!("/api/group/{group_id}/post"))
        .authorization_bearer(&alice)
        .await
        .json();
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_feed_group_and_upvote_detail() {
    let h = harness();
    let (alice, alice_id) = register(&h.server, "Alice", "alice@example.com").await;

    let mut group_ids = Vec::new();
    for name in ["Quiet", "Busy"] {
        let group: Value = h
            .server
            .post("/api/group")
            .authorization_bearer(&alice)
            .json(&json!({ "name": name }))
            .await
            .json();
        group_ids.push(group["id"].as_u64().unwrap());
    }
    let busy = group_ids[1];

    let post: Value = h
        .server
        .post(&format!("/api/group/{busy}/post"))
        .authorization_bearer(&alice)
        .json(&json!({ "body": "first" }))
        .await
        .json();
    let post_id = post["id"].as_u64().unwrap();
    h.server
        .post(&format!("/api/group/{busy}/post/{post_id}/like"))
        .authorization_bearer(&alice)
        .await
        .assert_status_ok();

    let feed: Value = h
        .server
        .get("/api/group/feed_group")
        .authorization_bearer(&alice)
        .await
        .json();
    let order: Vec<u64> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![busy, group_ids[0]]);

    let detail: Value = h
        .server
        .get(&format!("/api/group/{busy}/post/{post_id}/upvote_detail"))
        .authorization_bearer(&alice)
        .await
        .json();
    assert_eq!(detail["likeCount"], 1);
    assert_eq!(detail["likedByMe"], true);
    assert_eq!(detail["likedBy"][0]["id"], alice_id.get());
}

#[tokio::test]
async fn test_non_member_cannot_post() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    let (bob, _) = register(&h.server, "Bob", "bob@example.com").await;

    let group: Value = h
        .server
        .post("/api/group")
        .authorization_bearer(&alice)
        .json(&json!({ "name": "Founders" }))
        .await
        .json();
    let group_id = group["id"].as_u64().unwrap();

    h.server
        .post(&format!("/api/group/{group_id}/post"))
        .authorization_bearer(&bob)
        .json(&json!({ "body": "let me in" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

// =============================================================================
// CHAT
// =============================================================================

#[tokio::test]
async fn test_chat_message_reaches_participant() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    let (bob, bob_id) = register(&h.server, "Bob", "bob@example.com").await;
    connect(&h.server, &alice, &bob, bob_id).await;

    let chat: Value = h
        .server
        .post("/api/chat/chat_group")
        .authorization_bearer(&alice)
        .json(&json!({ "participants": [bob_id] }))
        .await
        .json();
    let chat_id = chat["id"].as_u64().unwrap();

    let mut inbox = h.state.hub.subscribe(bob_id);
    h.server
        .post(&format!("/api/chat/chat_group/{chat_id}/message/send"))
        .authorization_bearer(&alice)
        .json(&json!({ "body": "hi bob" }))
        .await
        .assert_status_ok();

    let event = inbox.try_recv().unwrap();
    assert_eq!(event.topic, "chat");
    assert_eq!(event.headers.get("chatGroupId").unwrap(), &chat_id.to_string());

    let page: Value = h
        .server
        .get(&format!("/api/chat/chat_group/{chat_id}/message"))
        .authorization_bearer(&bob)
        .await
        .json();
    assert_eq!(page["items"][0]["body"], "hi bob");
}

// =============================================================================
// UPLOADS
// =============================================================================

#[tokio::test]
async fn test_upload_image_stores_blob() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;

    let form = MultipartForm::new()
        .add_text("upload_binary_type", "image")
        .add_text("type", "profile")
        .add_part(
            "file",
            Part::bytes(png_bytes())
                .file_name("me.png")
                .mime_type("image/png"),
        );
    let res = h
        .server
        .post("/api/user/upload_image")
        .authorization_bearer(&alice)
        .multipart(form)
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert!(body["imageUID"].is_string());
    assert!(body["url"].as_str().unwrap().starts_with("http://files.test"));
    assert_eq!(h.blobs.len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_non_image_bytes() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;

    let form = MultipartForm::new()
        .add_text("upload_binary_type", "image")
        .add_part("file", Part::text("plain text").file_name("fake.png"));
    h.server
        .post("/api/user/upload_image")
        .authorization_bearer(&alice)
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert!(h.blobs.is_empty());
}

// =============================================================================
// SHOWCASE
// =============================================================================

#[tokio::test]
async fn test_all_questions_nests_replies() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;

    let company: Value = h
        .server
        .post("/api/showcase/create_profile")
        .authorization_bearer(&alice)
        .json(&json!({ "name": "Acme" }))
        .await
        .json();
    let company_id = company["id"].as_u64().unwrap();

    let question: Value = h
        .server
        .post(&format!("/api/showcase/profile/{company_id}/question"))
        .authorization_bearer(&alice)
        .json(&json!({ "body": "Roadmap?" }))
        .await
        .json();
    h.server
        .post(&format!("/api/showcase/profile/{company_id}/question_reply"))
        .authorization_bearer(&alice)
        .json(&json!({ "questionId": question["id"], "body": "Soon" }))
        .await
        .assert_status_ok();

    let threads: Value = h
        .server
        .get(&format!("/api/showcase/profile/{company_id}/all_questions"))
        .authorization_bearer(&alice)
        .await
        .json();
    let threads = threads.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["body"], "Roadmap?");
    assert_eq!(threads[0]["replies"][0]["body"], "Soon");
}

// =============================================================================
// ADMIN
// =============================================================================

#[tokio::test]
async fn test_admin_routes_reject_regular_users() {
    let h = harness();
    let (alice, _) = register(&h.server, "Alice", "alice@example.com").await;
    h.server
        .get("/api/admin/users")
        .authorization_bearer(&alice)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_login_refuses_users() {
    let h = harness();
    register(&h.server, "Alice", "alice@example.com").await;
    h.server
        .post("/api/admin/login")
        .json(&json!({ "email": "alice@example.com", "password": "password123" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_faq_lifecycle() {
    let h = harness();
    let admin = create_admin(&h.server).await;

    let faq: Value = h
        .server
        .post("/api/admin/faqs")
        .authorization_bearer(&admin)
        .json(&json!({ "question": "What is it?", "answer": "A network." }))
        .await
        .json();

    let list: Value = h.server.get("/api/faqs").await.json();
    assert_eq!(list.as_array().unwrap().len(), 1);

    h.server
        .delete(&format!("/api/admin/faqs/{}", faq["id"]))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
    let list: Value = h.server.get("/api/faqs").await.json();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_users_csv_export() {
    let h = harness();
    let admin = create_admin(&h.server).await;
    register(&h.server, "Alice", "alice@example.com").await;

    let res = h
        .server
        .get("/api/admin/users/downloads")
        .authorization_bearer(&admin)
        .await;
    res.assert_status_ok();
    assert!(
        res.header("content-type")
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    assert!(res.text().contains("alice@example.com"));
}

#[tokio::test]
async fn test_local_routes_only_in_local_env() {
    let h = harness_with(Config {
        env: Environment::Dev,
        ..Config::default()
    });
    let res = h
        .server
        .post("/api/test/create")
        .json(&json!({ "name": "Admin", "email": "admin@example.com", "password": "password123" }))
        .await;
    assert!(res.status_code().is_client_error());
    assert_ne!(res.status_code(), StatusCode::OK);
}
