// In-process client driving a deployment without a socket

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use trellis_core::{Deployment, Disconnect, Error, HttpMethod, HttpRequest, HttpResponse, Result};

/// Sends requests straight into a [`Deployment`].
#[derive(Clone)]
pub struct TestClient {
    deployment: Arc<Deployment>,
}

impl TestClient {
    pub fn new(deployment: impl Into<Arc<Deployment>>) -> Self {
        Self {
            deployment: deployment.into(),
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path).send().await
    }

    pub async fn head(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::HEAD, path).send().await
    }

    pub async fn options(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::OPTIONS, path).send().await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::DELETE, path).send().await
    }

    /// POST with a JSON body.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        match self.request(HttpMethod::POST, path).json(body) {
            Ok(request) => request.send().await,
            Err(err) => panic!("failed to encode request body: {}", err),
        }
    }

    /// Start building a request.
    pub fn request(&self, method: HttpMethod, path: &str) -> TestRequest {
        TestRequest {
            client: self.clone(),
            request: HttpRequest::new(method.as_str(), path),
        }
    }

    /// Start building a request with a method the router may not know.
    pub fn raw(&self, method: &str, path: &str) -> TestRequest {
        TestRequest {
            client: self.clone(),
            request: HttpRequest::new(method, path),
        }
    }

    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.deployment.handle(request).await)
    }

    /// Send with a disconnect signal; fails when the signal fires while
    /// the request is suspended.
    pub async fn send_with(&self, request: HttpRequest, disconnect: Disconnect) -> Result<TestResponse> {
        self.deployment
            .handle_with(request, disconnect)
            .await
            .map(TestResponse::new)
    }
}

/// Request under construction.
pub struct TestRequest {
    client: TestClient,
    request: HttpRequest,
}

impl TestRequest {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    pub fn accept(self, value: &str) -> Self {
        self.header("Accept", value)
    }

    pub fn content_type(self, value: &str) -> Self {
        self.header("Content-Type", value)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    /// JSON body with a matching `Content-Type`.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.content_type("application/json").body(body))
    }

    /// Append a query parameter, percent-encoded.
    pub fn query(mut self, name: &str, value: &str) -> Self {
        let pair = format!(
            "{}={}",
            urlencoding::encode(name),
            urlencoding::encode(value)
        );
        self.request.query = Some(match self.request.query.take() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, pair),
            _ => pair,
        });
        self
    }

    pub fn build(self) -> HttpRequest {
        self.request
    }

    pub async fn send(self) -> TestResponse {
        let TestRequest { client, request } = self;
        client.send(request).await
    }
}

/// A response with test-friendly accessors.
#[derive(Debug, Clone)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Header value, ignoring name case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.response.body).into_owned()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> std::result::Result<T, String> {
        serde_json::from_slice(&self.response.body).map_err(|e| format!("invalid JSON body: {}", e))
    }

    /// Methods listed in `Allow`, in header order.
    pub fn allow(&self) -> Vec<String> {
        self.header("Allow")
            .map(|allow| {
                allow
                    .split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }
}
