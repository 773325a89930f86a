// Application endpoints and the invocation data they receive
//
// An endpoint never sees the request context itself. The invocation handler
// takes an owned snapshot of what the endpoint may read, so the endpoint
// future is 'static and can run on any task while the chain is suspended.

use crate::entity::Reply;
use crate::extensions::Extensions;
use crate::media_type::MediaType;
use crate::path::PathParams;
use crate::{Error, HttpMethod, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Application code bound to a route.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use trellis_core::{Endpoint, Invocation, Reply, Result};
///
/// struct Hello;
///
/// #[async_trait]
/// impl Endpoint for Hello {
///     async fn invoke(&self, inv: Invocation) -> Result<Reply> {
///         let name = inv.param("name").unwrap_or("world");
///         Ok(Reply::text(format!("hello {}", name)))
///     }
/// }
/// ```
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn invoke(&self, invocation: Invocation) -> Result<Reply>;
}

/// Endpoint backed by an async function or closure.
pub struct FnEndpoint<F> {
    f: F,
}

impl<F> FnEndpoint<F> {
    #[inline]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Endpoint for FnEndpoint<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    #[inline]
    async fn invoke(&self, invocation: Invocation) -> Result<Reply> {
        (self.f)(invocation).await
    }
}

/// Endpoint whose synchronous body runs on tokio's blocking pool.
pub struct BlockingEndpoint<F> {
    f: Arc<F>,
}

impl<F> BlockingEndpoint<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> Endpoint for BlockingEndpoint<F>
where
    F: Fn(Invocation) -> Result<Reply> + Send + Sync + 'static,
{
    async fn invoke(&self, invocation: Invocation) -> Result<Reply> {
        let f = self.f.clone();
        tokio::task::spawn_blocking(move || f(invocation))
            .await
            .map_err(|e| Error::Internal(format!("blocking endpoint failed: {}", e)))?
    }
}

/// Owned view of a matched request handed to an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: HttpMethod,
    pub path: String,
    pub params: PathParams,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Request `Content-Type`, when one was sent.
    pub consumes: Option<MediaType>,
    /// Response type chosen by negotiation, when the route declares any.
    pub produces: Option<MediaType>,
    pub extensions: Extensions,
}

impl Invocation {
    /// Path parameter by template name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.named(name)
    }

    /// Path parameter by position.
    pub fn param_at(&self, index: usize) -> Option<&str> {
        self.params.get(index)
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        crate::http::find_header(&self.headers, name)
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| Error::BadRequest(format!("body is not valid UTF-8: {}", e)))
    }

    /// Body deserialized from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Body deserialized from `application/x-www-form-urlencoded`.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_bytes(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}
