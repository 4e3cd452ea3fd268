//! Scripted transport and fixtures for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::session::SessionManager;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

pub const API_ENDPOINT: &str = "https://confluent.test";
pub const CLUSTER_API_ENDPOINT: &str = "https://pkac-1.eu-west-1.aws.confluent.test";
pub const SESSION_TOKEN: &str = "session-token";
pub const ACCESS_TOKEN: &str = "access-token";

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(String),
}

impl Reply {
    pub fn status(code: u16) -> Self {
        Reply::Status(code, String::new())
    }

    pub fn json(code: u16, body: Value) -> Self {
        Reply::Status(code, body.to_string())
    }

    pub fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }

    fn render(&self) -> Result<HttpResponse> {
        match self {
            Reply::Status(code, body) => Ok(HttpResponse::new(*code, body.clone().into_bytes())),
            Reply::Fail(message) => Err(Error::transport(message.clone())),
        }
    }
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from per-route reply queues.
///
/// Each route pops its replies in order; the last one repeats forever.
/// Unrouted requests get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

/// Path part of a URL, without scheme, host or query
pub fn path_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme
        .find('/')
        .map(|idx| &without_scheme[idx..])
        .unwrap_or("/");
    path.split('?').next().unwrap_or(path)
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn on(&self, method: Method, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && path_of(&r.url) == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    /// JSON body of the most recent request to a route
    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.requests_to(method, path)
            .last()
            .and_then(|r| r.body.as_deref().map(|b| serde_json::from_str(b).unwrap()))
    }

    fn next_reply(&self, request: &HttpRequest) -> Reply {
        let path = path_of(&request.url);
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == path)
        else {
            return Reply::Status(404, format!("no route for {} {}", request.method, path));
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route.replies.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let reply = self.next_reply(&request);
        self.requests.lock().unwrap().push(request);
        reply.render()
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn test_config() -> ProviderConfig {
    ProviderConfig::new("ops@example.com", "hunter2")
        .with_api_endpoint(API_ENDPOINT)
        .with_retry(fast_retry())
}

pub fn session_manager(transport: &Arc<FakeTransport>) -> SessionManager {
    SessionManager::new(&test_config(), Arc::clone(transport) as Arc<dyn HttpTransport>)
}

pub fn identity_json() -> Value {
    json!({
        "user": {"id": 7, "email": "ops@example.com", "organization_id": 99},
        "account": {"id": "a-primary", "name": "primary", "organization_id": 99},
        "organization": {"id": 99, "name": "acme"},
        "accounts": [
            {"id": "a-primary", "name": "primary", "organization_id": 99},
            {"id": "a-staging", "name": "staging", "organization_id": 99}
        ]
    })
}

/// Script a successful three-stage login
pub fn mock_login(transport: &FakeTransport) {
    transport.on(
        Method::POST,
        "/api/sessions",
        Reply::json(200, json!({"token": SESSION_TOKEN, "user": {"id": 7}, "error": null})),
    );
    transport.on(Method::GET, "/api/me", Reply::json(200, identity_json()));
    transport.on(
        Method::POST,
        "/api/access_tokens",
        Reply::json(200, json!({"token": ACCESS_TOKEN, "error": null})),
    );
}

pub fn cluster_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "account_id": "a-primary",
        "organization_id": 99,
        "network_ingress": 100,
        "network_egress": 100,
        "storage": 5000,
        "durability": "LOW",
        "status": "UP",
        "endpoint": "SASL_SSL://pkc-1.eu-west-1.aws.confluent.test:9092",
        "api_endpoint": CLUSTER_API_ENDPOINT,
        "region": "eu-west-1",
        "service_provider": "aws"
    })
}

pub fn cluster_list_json(clusters: Vec<Value>) -> Value {
    json!({ "clusters": clusters, "error": null })
}
