#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end behaviour of the call gateway with fake host collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autorepo_gateway::transport::{OutboundRequest, RelayChannel, RelayEnvelope};
use autorepo_gateway::{
    CallDescriptor, CallGateway, ConfirmationDialog, Credential, DialogChoice, DialogError,
    DialogPrompt, EnvironmentName, ErrorKind, GatewayBuilder, GatewayConfig, KeyValueStorage,
    LoginError, LoginExchange, MemoryStorage, NavigationReset, OPENID_KEY, TOKEN_KEY, Transport,
    TransportError, TransportResponse,
};
use httpmock::prelude::*;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct ScriptedDialog {
    choice: Option<DialogChoice>,
    shown: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedDialog {
    fn new(choice: Option<DialogChoice>) -> Self {
        Self {
            choice,
            shown: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationDialog for ScriptedDialog {
    async fn confirm(&self, _prompt: &DialogPrompt) -> Result<DialogChoice, DialogError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.choice.ok_or_else(|| DialogError::new("dialog closed"))
    }
}

struct FixedExchange {
    credential: Option<Credential>,
    calls: AtomicUsize,
}

impl FixedExchange {
    fn issuing(token: &str, user_id: &str) -> Self {
        Self {
            credential: Some(Credential::new(token, user_id)),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            credential: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LoginExchange for FixedExchange {
    async fn exchange(&self) -> Result<Credential, LoginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credential
            .clone()
            .ok_or(LoginError::Rejected { status: 400 })
    }
}

#[derive(Default)]
struct CountingNavigation {
    resets: AtomicUsize,
}

impl NavigationReset for CountingNavigation {
    fn reset_to_landing(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers `200 []` to `Bearer abc` and `401` to everything else.
#[derive(Default)]
struct TokenCheckingTransport {
    seen_authorization: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl Transport for TokenCheckingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let auth = request
            .headers
            .get(http::header::AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_owned());
        let authorized = auth.as_deref() == Some("Bearer abc");
        self.seen_authorization.lock().push(auth);
        tokio::task::yield_now().await;
        Ok(if authorized {
            TransportResponse::new(200, json!([]))
        } else {
            TransportResponse::new(401, json!({"detail": "Not authenticated"}))
        })
    }

    fn name(&self) -> &'static str {
        "token-checking"
    }
}

/// Fails every attempt with the error produced by `fail`.
struct FailingTransport {
    attempts: AtomicUsize,
    fail: fn() -> TransportError,
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err((self.fail)())
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct Host {
    dialog: Arc<ScriptedDialog>,
    exchange: Arc<FixedExchange>,
    navigation: Arc<CountingNavigation>,
    storage: Arc<MemoryStorage>,
}

impl Host {
    fn new(dialog: ScriptedDialog, exchange: FixedExchange) -> Self {
        Self {
            dialog: Arc::new(dialog),
            exchange: Arc::new(exchange),
            navigation: Arc::new(CountingNavigation::default()),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    fn confirming() -> Self {
        Self::new(
            ScriptedDialog::new(Some(DialogChoice::Confirmed)),
            FixedExchange::issuing("abc", "u1"),
        )
    }

    fn builder(&self, config: GatewayConfig) -> GatewayBuilder {
        CallGateway::builder(config)
            .storage(self.storage.clone())
            .dialog(self.dialog.clone())
            .login_exchange(self.exchange.clone())
            .navigation(self.navigation.clone())
    }

    fn resets(&self) -> usize {
        self.navigation.resets.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Success and status mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_resolves_body_without_retry() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/repos")
            .header("authorization", "Bearer tok")
            .header("content-type", "application/json");
        then.status(200)
            .json_body(json!([{"_id": "r1", "name": "Civic"}]));
    });

    let host = Host::confirming();
    host.storage.set(TOKEN_KEY, "tok").unwrap();
    host.storage.set(OPENID_KEY, "u0").unwrap();
    let gateway = host
        .builder(GatewayConfig::for_testing(server.url("/api")))
        .build()
        .unwrap();

    let repos: Value = gateway.get("/repos").await.unwrap();

    assert_eq!(repos[0]["name"], "Civic");
    mock.assert_calls(1);
    assert_eq!(host.dialog.shown(), 0);
}

#[tokio::test]
async fn validation_detail_becomes_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/repos");
        then.status(422).json_body(json!({"detail": [
            {"loc": ["body", "name"], "msg": "field required", "type": "value_error.missing"}
        ]}));
    });

    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing(server.url("/api")))
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::post("/repos", json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RequestFailed);
    assert_eq!(err.message(), "field required");
    assert_eq!(err.status_code(), Some(422));
}

#[tokio::test]
async fn status_codes_are_classified() {
    let server = MockServer::start();
    for (path, status) in [("/api/a", 403), ("/api/b", 404), ("/api/c", 429), ("/api/d", 502)] {
        server.mock(|when, then| {
            when.path(path);
            then.status(status).json_body(json!({"detail": "nope"}));
        });
    }

    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing(server.url("/api")))
        .build()
        .unwrap();

    let expected = [
        ("/a", ErrorKind::Forbidden, 403),
        ("/b", ErrorKind::NotFound, 404),
        ("/c", ErrorKind::RateLimited, 429),
        ("/d", ErrorKind::ServerError, 502),
    ];
    for (path, kind, status) in expected {
        let err = gateway.call(CallDescriptor::get(path)).await.unwrap_err();
        assert_eq!(err.kind(), kind, "{path}");
        assert_eq!(err.status_code(), Some(status));
        assert_eq!(err.message(), "nope");
    }
    assert_eq!(host.dialog.shown(), 0);
}

#[tokio::test]
async fn undecodable_body_is_unknown_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/repos");
        then.status(200).json_body(json!({"not": "a list"}));
    });

    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing(server.url("/api")))
        .build()
        .unwrap();

    let err = gateway.get::<Vec<Value>>("/repos").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownError);
}

// ---------------------------------------------------------------------------
// Re-authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthenticated_list_prompts_logs_in_and_replays() {
    let server = MockServer::start();
    // Specific mock first: httpmock serves the first matching definition.
    let authorized = server.mock(|when, then| {
        when.method(GET)
            .path("/api/repos")
            .header("authorization", "Bearer abc");
        then.status(200)
            .json_body(json!([{"_id": "r1", "name": "Civic"}]));
    });
    let anonymous = server.mock(|when, then| {
        when.method(GET)
            .path("/api/repos")
            .header_missing("authorization");
        then.status(401).json_body(json!({"detail": "Not authenticated"}));
    });

    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing(server.url("/api")))
        .build()
        .unwrap();
    assert!(!gateway.is_authenticated());

    let repos: Vec<Value> = gateway.get("/repos").await.unwrap();

    assert_eq!(repos.len(), 1);
    anonymous.assert_calls(1);
    authorized.assert_calls(1);
    assert_eq!(host.dialog.shown(), 1);
    assert_eq!(host.exchange.calls.load(Ordering::SeqCst), 1);
    assert_eq!(host.storage.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));
    assert_eq!(host.storage.get(OPENID_KEY).unwrap().as_deref(), Some("u1"));
    assert!(!gateway.reauth().is_active());
}

#[tokio::test]
async fn second_401_during_flow_fails_fast() {
    let gate = Arc::new(Notify::new());
    let host = Host::new(
        ScriptedDialog {
            gate: Some(gate.clone()),
            ..ScriptedDialog::new(Some(DialogChoice::Confirmed))
        },
        FixedExchange::issuing("abc", "u1"),
    );
    let transport = Arc::new(TokenCheckingTransport::default());
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(transport.clone())
        .build()
        .unwrap();

    let first = gateway.call(CallDescriptor::get("/repos"));
    let second = async {
        // Let the first call reach the dialog before this one starts.
        while host.dialog.shown() == 0 {
            tokio::task::yield_now().await;
        }
        let outcome = gateway.call(CallDescriptor::get("/issues")).await;
        gate.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), json!([]));
    let err = second.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnauthorizedInProgress);
    assert_eq!(host.dialog.shown(), 1);
    assert_eq!(host.exchange.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.seen_authorization.lock().len(), 3);
}

#[tokio::test]
async fn declining_resets_navigation_and_clears_credential() {
    let host = Host::new(
        ScriptedDialog::new(Some(DialogChoice::Declined)),
        FixedExchange::issuing("abc", "u1"),
    );
    host.storage.set(TOKEN_KEY, "expired").unwrap();
    host.storage.set(OPENID_KEY, "u0").unwrap();
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(Arc::new(TokenCheckingTransport::default()))
        .build()
        .unwrap();
    assert!(gateway.is_authenticated());

    let err = gateway
        .call(CallDescriptor::get("/repos"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "user cancelled login");
    assert_eq!(host.resets(), 1);
    assert_eq!(host.exchange.calls.load(Ordering::SeqCst), 0);
    assert!(!gateway.is_authenticated());
    assert_eq!(host.storage.get(TOKEN_KEY).unwrap(), None);
    assert!(!gateway.reauth().is_active());
}

#[tokio::test]
async fn failed_exchange_is_unauthorized_and_releases_guard() {
    let host = Host::new(
        ScriptedDialog::new(Some(DialogChoice::Confirmed)),
        FixedExchange::failing(),
    );
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(Arc::new(TokenCheckingTransport::default()))
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.message(), "re-login failed");
    assert_eq!(host.resets(), 0);
    assert!(!gateway.reauth().is_active());

    // The guard is free again: a later 401 opens a new dialog.
    let _ = gateway.call(CallDescriptor::get("/repos")).await;
    assert_eq!(host.dialog.shown(), 2);
}

#[tokio::test]
async fn replay_401_is_terminal() {
    let host = Host::new(
        ScriptedDialog::new(Some(DialogChoice::Confirmed)),
        FixedExchange::issuing("still-wrong", "u1"),
    );
    let transport = Arc::new(TokenCheckingTransport::default());
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(transport.clone())
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(host.dialog.shown(), 1);
    assert_eq!(transport.seen_authorization.lock().len(), 2);
    assert!(!gateway.is_authenticated());
}

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeouts_are_resubmitted_until_budget_is_spent() {
    let transport = Arc::new(FailingTransport {
        attempts: AtomicUsize::new(0),
        fail: || TransportError::Timeout(Duration::from_secs(30)),
    });
    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(transport.clone())
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos").with_retries(2))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn connect_failures_are_never_retried() {
    let transport = Arc::new(FailingTransport {
        attempts: AtomicUsize::new(0),
        fail: || TransportError::Connect(Box::new(std::io::Error::other("refused"))),
    });
    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .transport(transport.clone())
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos").with_retries(3))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refused_connection_over_http_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing(format!("http://127.0.0.1:{port}/api")))
        .build()
        .unwrap();

    let err = gateway.get::<Value>("/repos").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/slow");
        then.status(200).delay(Duration::from_millis(800));
    });

    let host = Host::confirming();
    let config = GatewayConfig {
        request_timeout: Duration::from_millis(100),
        timeout_retries: 1,
        ..GatewayConfig::for_testing(server.url("/api"))
    };
    let gateway = host.builder(config).build().unwrap();

    let err = gateway.get::<Value>("/slow").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn relative_direct_address_is_config_error() {
    let host = Host::confirming();
    let config = GatewayConfig {
        base_address: Some("/api".to_owned()),
        ..GatewayConfig::for_environment(EnvironmentName::Dev)
    };
    let gateway = host.builder(config).build().unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(host.dialog.shown(), 0);
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_without_capability_is_system_unavailable() {
    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_environment(EnvironmentName::Prod))
        .build()
        .unwrap();

    let err = gateway
        .call(CallDescriptor::get("/repos"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SystemUnavailable);
    assert_eq!(host.dialog.shown(), 0);
}

#[derive(Default)]
struct RecordingRelay {
    envelopes: Mutex<Vec<RelayEnvelope>>,
}

#[async_trait]
impl RelayChannel for RecordingRelay {
    async fn call_container(
        &self,
        envelope: RelayEnvelope,
    ) -> Result<TransportResponse, TransportError> {
        let authorized = envelope.header.get("authorization").map(String::as_str)
            == Some("Bearer abc");
        self.envelopes.lock().push(envelope);
        Ok(if authorized {
            TransportResponse::new(201, json!({"_id": "c1"}))
        } else {
            TransportResponse::new(401, Value::Null)
        })
    }
}

#[tokio::test]
async fn relay_carries_env_id_and_replays_after_login() {
    let relay = Arc::new(RecordingRelay::default());
    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_environment(EnvironmentName::Prod))
        .relay_channel(relay.clone())
        .build()
        .unwrap();

    let created: Value = gateway
        .post("/commits", &json!({"repo_id": "r1", "title": "Oil change"}))
        .await
        .unwrap();

    assert_eq!(created["_id"], "c1");
    let envelopes = relay.envelopes.lock();
    assert_eq!(envelopes.len(), 2);
    for envelope in envelopes.iter() {
        assert_eq!(envelope.config.env, autorepo_gateway::DEFAULT_RELAY_ENV_ID);
        assert_eq!(envelope.path, "/api/commits");
        assert_eq!(envelope.data, Some(json!({"repo_id": "r1", "title": "Oil change"})));
        assert_eq!(envelope.header["content-type"], "application/json");
    }
    assert!(!envelopes[0].header.contains_key("authorization"));
}

/// Accepts envelopes and never answers.
#[derive(Default)]
struct StalledRelay {
    envelopes: AtomicUsize,
}

#[async_trait]
impl RelayChannel for StalledRelay {
    async fn call_container(
        &self,
        _envelope: RelayEnvelope,
    ) -> Result<TransportResponse, TransportError> {
        self.envelopes.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_relay_times_out_after_spending_the_retry_budget() {
    let relay = Arc::new(StalledRelay::default());
    let host = Host::confirming();
    let config = GatewayConfig {
        request_timeout: Duration::from_millis(50),
        timeout_retries: 2,
        ..GatewayConfig::for_environment(EnvironmentName::Prod)
    };
    let gateway = host
        .builder(config)
        .relay_channel(relay.clone())
        .build()
        .unwrap();

    let err = gateway.get::<Value>("/repos").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(relay.envelopes.load(Ordering::SeqCst), 3);
    assert_eq!(host.dialog.shown(), 0);
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn explicit_login_and_logout() {
    let host = Host::confirming();
    let gateway = host
        .builder(GatewayConfig::for_testing("http://unused.invalid/api"))
        .build()
        .unwrap();

    let credential = gateway.ensure_logged_in().await.unwrap();
    assert_eq!(credential.user_id, "u1");
    gateway.ensure_logged_in().await.unwrap();
    assert_eq!(host.exchange.calls.load(Ordering::SeqCst), 1);

    gateway.logout();
    assert!(!gateway.is_authenticated());
    assert_eq!(host.storage.get(OPENID_KEY).unwrap(), None);
}
