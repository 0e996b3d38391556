//! End-to-end request flows through the full router and middleware stack.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use wraith_gateway::domain::config::{AutoconfConfig, ManagerAccountConfig};
use wraith_gateway::{
    build_router, hash_password, obfuscate, register_baseline, Cipher, EnvelopeCipher, Gateway,
    GatewayConfig, InMemoryStateStore, ManualClock, ProtocolRegistry,
};

const PASSWORD: &str = "hunter2-but-longer";
const INITIAL_KEY: &str = "initial-agent-key";

struct Harness {
    router: Router,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    let mut config = GatewayConfig::default();
    config.autoconf = AutoconfConfig::immediate();
    config.housekeeping.enabled = false;
    config.defaults.wraith_initial_crypt_key = Some(INITIAL_KEY.into());
    config.managers.push(ManagerAccountConfig {
        username: "alice".into(),
        password_hash: hash_password(PASSWORD).unwrap(),
    });

    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let mut protocols = ProtocolRegistry::new();
    register_baseline(&mut protocols).unwrap();

    let gateway = Arc::new(Gateway::new(
        &config,
        Arc::new(InMemoryStateStore::new()),
        Arc::new(EnvelopeCipher),
        clock.clone(),
        protocols,
    ));
    gateway.initialize(&config).await.unwrap();

    Harness {
        router: build_router(gateway, &config),
        clock,
    }
}

fn peer() -> SocketAddr {
    "198.51.100.23:41000".parse().unwrap()
}

fn request(method: &str, uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "c2.example")
        .extension(ConnectInfo(peer()))
        .body(Body::from(body.into()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn seal(value: &Value, key: &str) -> String {
    EnvelopeCipher
        .encrypt(value.to_string().as_bytes(), key)
        .unwrap()
}

fn unseal(text: &str, key: &str) -> Value {
    let plain = EnvelopeCipher.decrypt(text, key).unwrap();
    serde_json::from_slice(&plain).unwrap()
}

#[tokio::test]
async fn test_discovery_returns_url_without_query() {
    let h = harness().await;
    let (status, body) = send(&h.router, request("GET", "/c2/gate.php?probe=1", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "http://c2.example/c2/gate.php");
}

#[tokio::test]
async fn test_discovery_scheme_from_trusted_proxy_only() {
    let h = harness().await;

    let mut spoofed = request("GET", "/gate", "");
    spoofed
        .headers_mut()
        .insert("x-forwarded-proto", "https".parse().unwrap());
    let (_, body) = send(&h.router, spoofed).await;
    assert_eq!(body, "http://c2.example/gate");

    let proxied = Request::builder()
        .method("GET")
        .uri("/gate")
        .header(header::HOST, "c2.example")
        .header("x-forwarded-proto", "https")
        .extension(ConnectInfo::<SocketAddr>(
            "127.0.0.1:52000".parse().unwrap(),
        ))
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&h.router, proxied).await;
    assert_eq!(body, "https://c2.example/gate");
}

#[tokio::test]
async fn test_unsupported_method() {
    let h = harness().await;
    let response = h
        .router
        .clone()
        .oneshot(request("DELETE", "/", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(header::ALLOW).unwrap(),
        "GET, PUT, POST"
    );
}

#[tokio::test]
async fn test_manager_login_then_heartbeat() {
    let h = harness().await;

    let login = obfuscate(&EnvelopeCipher, "alice", PASSWORD).unwrap();
    let (_, body) = send(&h.router, request("PUT", "/", login)).await;
    let response = unseal(&body, PASSWORD);
    assert_eq!(response["status"], "SUCCESS");

    let config = &response["config"];
    assert_eq!(config["updateInterval"], json!(4));
    let session_id = config["sessionID"].as_str().unwrap();
    let token = config["sessionToken"].as_str().unwrap();
    let first_layer = config["firstLayerEncryptionKey"].as_str().unwrap();
    let prefix = config["APIPrefix"].as_str().unwrap();

    let inner = seal(&json!({"reqType": "heartbeat", "sessionToken": token}), token);
    let outer = seal(&json!([session_id, inner]), first_layer);
    let (_, body) = send(
        &h.router,
        request("POST", "/", format!("{prefix}21{outer}")),
    )
    .await;

    let sealed = body.strip_prefix(prefix).unwrap();
    assert_eq!(unseal(sealed, token), json!({"status": "SUCCESS"}));
}

#[tokio::test]
async fn test_manager_with_wrong_token_is_rejected() {
    let h = harness().await;

    let login = obfuscate(&EnvelopeCipher, "alice", PASSWORD).unwrap();
    let (_, body) = send(&h.router, request("PUT", "/", login)).await;
    let config = unseal(&body, PASSWORD)["config"].clone();
    let session_id = config["sessionID"].as_str().unwrap();
    let token = config["sessionToken"].as_str().unwrap();
    let first_layer = config["firstLayerEncryptionKey"].as_str().unwrap();

    // Sealed with the real token but claiming another one
    let inner = seal(
        &json!({"reqType": "heartbeat", "sessionToken": "forged"}),
        token,
    );
    let outer = seal(&json!([session_id, inner]), first_layer);
    let (_, body) = send(&h.router, request("POST", "/", format!("WRAITH21{outer}"))).await;

    let sealed = body.strip_prefix("WRAITH").unwrap();
    assert_eq!(
        unseal(sealed, token),
        json!({"status": "ERROR", "message": "invalid session data"})
    );
}

#[tokio::test]
async fn test_agent_handshake_then_switch_key_heartbeat() {
    let h = harness().await;

    let hello = seal(&json!({"reqType": "handshake"}), INITIAL_KEY);
    let (_, body) = send(&h.router, request("POST", "/", format!("WRAITH11{hello}"))).await;
    let response = unseal(body.strip_prefix("WRAITH").unwrap(), INITIAL_KEY);
    assert_eq!(response["status"], "SUCCESS");

    let agent_id = response["agentID"].as_str().unwrap();
    let switch_key = response["switchKey"].as_str().unwrap();

    let beat = seal(
        &json!({"reqType": "heartbeat", "agentID": agent_id}),
        switch_key,
    );
    let (_, body) = send(&h.router, request("POST", "/", format!("WRAITH31{beat}"))).await;
    assert_eq!(
        unseal(body.strip_prefix("WRAITH").unwrap(), switch_key),
        json!({"status": "SUCCESS"})
    );
}

#[tokio::test]
async fn test_autoconf_separator_rules() {
    let h = harness().await;
    for body in ["alice", "alice|x|y"] {
        let (_, text) = send(&h.router, request("PUT", "/", body)).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"status": "ERROR", "message": "incorrectly formatted request"})
        );
    }
}

#[tokio::test]
async fn test_zero_identification_is_malformed() {
    let h = harness().await;
    for body in ["WRAITH01anything", "WRAITH0Zanything"] {
        let (_, text) = send(&h.router, request("POST", "/", body)).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap()["message"],
            "incorrectly formatted request"
        );
    }
}

#[tokio::test]
async fn test_unregistered_version_lists_supported() {
    let h = harness().await;
    let (_, text) = send(&h.router, request("POST", "/", "WRAITH19payload")).await;
    assert_eq!(
        serde_json::from_str::<Value>(&text).unwrap(),
        json!({
            "status": "ERROR",
            "message": "unsupported protocol version",
            "supportedProtocolVersions": ["1"]
        })
    );
}

#[tokio::test]
async fn test_repeated_login_failures_block_the_address() {
    let h = harness().await;
    let bad = obfuscate(&EnvelopeCipher, "alice", "not-it").unwrap();

    for _ in 0..3 {
        let (_, text) = send(&h.router, request("PUT", "/", bad.clone())).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap()["message"],
            "incorrect credentials"
        );
    }

    // Rejected before credentials are looked at, on every verb
    let good = obfuscate(&EnvelopeCipher, "alice", PASSWORD).unwrap();
    for req in [
        request("PUT", "/", good.clone()),
        request("GET", "/", ""),
        request("POST", "/", "WRAITH11x"),
    ] {
        let (_, text) = send(&h.router, req).await;
        let response: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(response["status"], "ERROR");
        assert!(response["message"]
            .as_str()
            .unwrap()
            .starts_with("You have been blocked from accessing this resource."));
    }

    h.clock.advance(299);
    let (_, text) = send(&h.router, request("GET", "/", "")).await;
    assert!(text.contains("blocked"));

    h.clock.advance(1);
    let (_, body) = send(&h.router, request("PUT", "/", good)).await;
    assert_eq!(unseal(&body, PASSWORD)["status"], "SUCCESS");
}
