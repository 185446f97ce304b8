#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use ::common::{util, CartridgeInfo, Contest, RuleInfo, VerificationOutput};
use client::testing::MemoryBackend;
use server::api::{build_router, ApiState};
use server::ServerConfig;

pub const INVITE_CODE: &str = "AB12CD";
pub const SECOND_CODE: &str = "EF34GH";
pub const PLAYER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const OTHER_PLAYER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const ROM: &[u8] = b"RIVCART rom image";

/// Macro to wrap test functions with a timeout to prevent hanging tests
#[macro_export]
macro_rules! timeout_test {
    ($duration:expr, $body:expr) => {
        tokio::time::timeout($duration, $body)
            .await
            .map_err(|_| anyhow::anyhow!("Test timed out after {:?}", $duration))?
    };
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config(protected_paths: &[&str]) -> Result<ServerConfig> {
    let vars = HashMap::from([
        ("CARTESI_NODE_URL", "http://127.0.0.1:8080".to_string()),
        ("DAPP_ADDR", "0xab7528bb862fb57e8a2bcd567a2e929a0be56a5e".to_string()),
        ("NFT_ADDR", "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string()),
        ("CHAIN_ID", "31337".to_string()),
        ("INVITE_CODE_KEY", "test-invite-key".to_string()),
        ("CONTESTS", "{}".to_string()),
        ("RIVES_INVITE_CODES", format!("{},{}", INVITE_CODE, SECOND_CODE)),
        ("RIVES_PROTECTED_PATHS", protected_paths.join(",")),
    ]);
    ServerConfig::from_lookup(|name| vars.get(name).cloned()).context("test config")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).context("response body is not json")
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every `Set-Cookie` value for the session cookie.
    pub fn session_set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter(|v| v.starts_with("session="))
            .map(str::to_string)
            .collect()
    }

    /// `session=<token>`, ready to send back as a `Cookie` header.
    pub fn session_cookie(&self) -> Option<String> {
        self.session_set_cookies()
            .into_iter()
            .filter_map(|v| v.split(';').next().map(str::to_string))
            .find(|pair| pair.len() > "session=".len())
    }
}

pub struct TestApp {
    pub backend: Arc<MemoryBackend>,
    pub state: ApiState,
    router: Router,
}

impl TestApp {
    /// App with nothing behind the session guard.
    pub fn new() -> Result<Self> {
        Self::with_protected(&[])
    }

    pub fn with_protected(protected_paths: &[&str]) -> Result<Self> {
        Self::build(protected_paths, HashMap::new())
    }

    pub fn with_contests(contests: HashMap<String, Contest>) -> Result<Self> {
        Self::build(&[], contests)
    }

    fn build(protected_paths: &[&str], contests: HashMap<String, Contest>) -> Result<Self> {
        init_tracing();
        let backend = Arc::new(MemoryBackend::new());
        Self::on_backend(backend, protected_paths, contests)
    }

    pub fn on_backend(
        backend: Arc<MemoryBackend>,
        protected_paths: &[&str],
        contests: HashMap<String, Contest>,
    ) -> Result<Self> {
        let config = test_config(protected_paths)?;
        let mut state = ApiState::from_config(&config, backend.clone());
        state.contests = Arc::new(contests);
        // An empty RIVES_PROTECTED_PATHS falls back to the defaults.
        state.protected_paths = Arc::new(protected_paths.iter().map(|p| p.to_string()).collect());
        let router = build_router(state.clone());
        Ok(Self {
            backend,
            state,
            router,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(TestResponse { status, headers, body })
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Result<TestResponse> {
        self.request(Method::GET, uri, cookie, None).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Result<TestResponse> {
        self.request(Method::POST, uri, cookie, Some(body)).await
    }

    /// Validates `code` and logs `address` in, returning the session cookie.
    pub async fn login(&self, code: &str, address: &str) -> Result<String> {
        let validated = self
            .post_json("/api/auth/code", serde_json::json!({ "code": code }), None)
            .await?;
        let cookie = validated.session_cookie().context("no session after code validation")?;
        let logged_in = self
            .post_json(
                "/api/auth/login",
                serde_json::json!({ "code": code, "user_address": address }),
                Some(&cookie),
            )
            .await?;
        logged_in.session_cookie().context("no session after login")
    }

    pub fn seed_cartridge(&self) -> (CartridgeInfo, RuleInfo) {
        let cartridge = self.backend.add_cartridge("Antcopter", ROM);
        let rule = self.backend.add_rule(&cartridge.id, "default", "score");
        (cartridge, rule)
    }
}

pub fn verification(cartridge: &CartridgeInfo, rule: &RuleInfo, player: &str, score: i64) -> VerificationOutput {
    let log = format!("tape of {} scoring {}", player, score);
    VerificationOutput {
        version: util::content_id(b"version"),
        cartridge_id: cartridge.id.clone(),
        cartridge_input_index: 0,
        user_address: player.to_string(),
        timestamp: 1_700_000_000 + score as u64,
        score,
        rule_id: rule.id.clone(),
        rule_input_index: -1,
        tape_hash: util::content_id(log.as_bytes()),
        tape_input_index: 1,
        error_code: 0,
    }
}
