mod support;

use reqwest::{header, StatusCode};
use serde_json::{json, Value};

use support::{next_json, send_json, test_config, TestServer};

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::start().await;
    let response = server.http.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_credentials() {
    let server = TestServer::start().await;

    let response = server
        .http
        .get(server.url("/api/block-status?userId=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .http
        .get(server.url("/api/block-status?userId=1"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn cookie_credentials_are_accepted() {
    let server = TestServer::start().await;
    let (_, token) = server.user("alice").await;
    let (bob, _) = server.user("bob").await;

    let response = server
        .http
        .get(server.url(&format!("/api/block-status?userId={}", bob.id.value())))
        .header(header::COOKIE, format!("jwt_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn block_and_unblock_round_trip() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.user("alice").await;
    let (bob, _) = server.user("bob").await;
    let status_url = server.url(&format!("/api/block-status?userId={}", bob.id.value()));

    let blocked: Value = server
        .http
        .post(server.url("/api/block"))
        .bearer_auth(&alice_token)
        .json(&json!({"userId": bob.id.value()}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(blocked["isBlocked"], true);
    assert_eq!(blocked["blockerCount"], 1);
    assert!(blocked["accountBlockedUntil"].is_null());

    let status: Value = server
        .http
        .get(&status_url)
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["blockedByCaller"], true);
    assert_eq!(status["isBlocked"], false);

    let response = server
        .http
        .post(server.url("/api/unblock"))
        .bearer_auth(&alice_token)
        .json(&json!({"userId": bob.id.value()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status: Value = server
        .http
        .get(&status_url)
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["blockedByCaller"], false);
}

#[tokio::test]
async fn block_accepts_string_user_id() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.user("alice").await;
    let (bob, _) = server.user("bob").await;
    let id = bob.id.value().to_string();

    let response = server
        .http
        .post(server.url("/api/block"))
        .bearer_auth(&alice_token)
        .json(&json!({"userId": id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["blockerCount"], 1);

    let response = server
        .http
        .post(server.url("/api/unblock"))
        .bearer_auth(&alice_token)
        .json(&json!({"userId": id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .http
        .post(server.url("/api/block"))
        .bearer_auth(&alice_token)
        .json(&json!({"userId": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn block_status_reports_account_level_block() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.user("alice").await;
    let (_, carol_token) = server.user("carol").await;
    let (_, dave_token) = server.user("dave").await;
    let (bob, _) = server.user("bob").await;

    for token in [&alice_token, &carol_token] {
        server
            .http
            .post(server.url("/api/block"))
            .bearer_auth(token)
            .json(&json!({"userId": bob.id.value()}))
            .send()
            .await
            .unwrap();
    }

    // dave 没有拉黑 bob，但 bob 已达到封禁阈值
    let status: Value = server
        .http
        .get(server.url(&format!("/api/block-status?userId={}", bob.id.value())))
        .bearer_auth(&dave_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isBlocked"], true);
    assert_eq!(status["blockedByCaller"], false);
    assert!(status["blockedUntil"].is_string());
}

#[tokio::test]
async fn block_status_for_unknown_user_is_not_found() {
    let server = TestServer::start().await;
    let (_, token) = server.user("alice").await;

    let response = server
        .http
        .get(server.url("/api/block-status?userId=999"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn profile_update_changes_mail_name_and_bio() {
    let server = TestServer::start().await;
    let (alice, token) = server.user("alice").await;

    let response = server
        .http
        .put(server.url("/api/profile"))
        .bearer_auth(&token)
        .json(&json!({"Mail": " alice@example.com ", "UserName": "alice2", "Biom": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], alice.id.value());
    assert_eq!(body["UserName"], "alice2");
    assert_eq!(body["Bio"], "hello");
    assert_eq!(body["Mail"], "alice@example.com");
}

#[tokio::test]
async fn profile_update_rejects_taken_mail_and_bad_input() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.user("alice").await;
    let (_, bob_token) = server.user("bob").await;

    let response = server
        .http
        .put(server.url("/api/profile"))
        .bearer_auth(&alice_token)
        .json(&json!({"Mail": "shared@example.com", "UserName": "alice", "Biom": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .http
        .put(server.url("/api/profile"))
        .bearer_auth(&bob_token)
        .json(&json!({"Mail": "shared@example.com", "UserName": "bob", "Biom": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = server
        .http
        .put(server.url("/api/profile"))
        .bearer_auth(&bob_token)
        .json(&json!({"Mail": "not-a-mail", "UserName": "bob", "Biom": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn self_block_is_a_bad_request() {
    let server = TestServer::start().await;
    let (alice, token) = server.user("alice").await;

    let response = server
        .http
        .post(server.url("/api/block"))
        .bearer_auth(&token)
        .json(&json!({"userId": alice.id.value()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blocked_account_is_forbidden_at_gateway() {
    let server = TestServer::start().await;
    let (_, alice_token) = server.user("alice").await;
    let (_, carol_token) = server.user("carol").await;
    let (bob, bob_token) = server.user("bob").await;

    for token in [&alice_token, &carol_token] {
        server
            .http
            .post(server.url("/api/block"))
            .bearer_auth(token)
            .json(&json!({"userId": bob.id.value()}))
            .send()
            .await
            .unwrap();
    }

    let response = server
        .http
        .get(server.url(&format!("/api/online-status?userId={}", bob.id.value())))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn mutual_block_reflects_either_direction() {
    let server = TestServer::start().await;
    let (alice, alice_token) = server.user("alice").await;
    let (bob, bob_token) = server.user("bob").await;

    let mut ws = server.connect(&alice_token).await;
    server.wait_online(alice.id).await;
    send_json(
        &mut ws,
        json!({"method":"CreateChat","query":{"user2": bob.id.value()}}),
    )
    .await;
    let created = next_json(&mut ws).await;
    let chat_id = created["data"]["chatId"].as_i64().unwrap();
    let url = server.url(&format!("/api/mutual-block?chatId={chat_id}"));

    let status: Value = server
        .http
        .get(&url)
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isMutuallyBlocked"], false);

    server
        .http
        .post(server.url("/api/block"))
        .bearer_auth(&bob_token)
        .json(&json!({"userId": alice.id.value()}))
        .send()
        .await
        .unwrap();

    let status: Value = server
        .http
        .get(&url)
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["isMutuallyBlocked"], true);
}

#[tokio::test]
async fn mutual_block_for_foreign_chat_is_forbidden() {
    let server = TestServer::start().await;
    let (alice, alice_token) = server.user("alice").await;
    let (bob, _) = server.user("bob").await;
    let (_, eve_token) = server.user("eve").await;

    let mut ws = server.connect(&alice_token).await;
    server.wait_online(alice.id).await;
    send_json(
        &mut ws,
        json!({"method":"CreateChat","query":{"user2": bob.id.value()}}),
    )
    .await;
    let chat_id = next_json(&mut ws).await["data"]["chatId"].as_i64().unwrap();

    let response = server
        .http
        .get(server.url(&format!("/api/mutual-block?chatId={chat_id}")))
        .bearer_auth(&eve_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_CHAT_MEMBER");
}

#[tokio::test]
async fn online_status_for_unknown_user_is_not_found() {
    let server = TestServer::start().await;
    let (_, token) = server.user("alice").await;

    let response = server
        .http
        .get(server.url("/api/online-status?userId=999"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authenticated_limit_rejects_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.authenticated.burst = 2;
    config.rate_limit.authenticated.refill_ms = 60_000;
    let server = TestServer::start_with(config).await;
    let (_, token) = server.user("alice").await;
    let (bob, bob_token) = server.user("bob").await;
    let url = server.url(&format!("/api/block-status?userId={}", bob.id.value()));

    for _ in 0..2 {
        let response = server.http.get(&url).bearer_auth(&token).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = server.http.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    // 按用户计数，其他用户不受影响
    let response = server.http.get(&url).bearer_auth(&bob_token).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_limit_recovers_after_refill() {
    let mut config = test_config();
    config.rate_limit.public.burst = 1;
    config.rate_limit.public.refill_ms = 100;
    let server = TestServer::start_with(config).await;
    let url = server.url("/health");

    assert_eq!(server.http.get(&url).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        server.http.get(&url).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(server.http.get(&url).send().await.unwrap().status(), StatusCode::OK);
}
