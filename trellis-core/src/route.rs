// Route declarations and the immutable routes built from them

use crate::chain::Chain;
use crate::endpoint::{BlockingEndpoint, Endpoint, FnEndpoint, Invocation};
use crate::entity::Reply;
use crate::media_type::MediaType;
use crate::path::{self, PathTemplate};
use crate::{Error, HttpMethod, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Declarative description of one endpoint, turned into a [`Route`] when
/// the deployment is built.
#[derive(Clone)]
pub struct RouteSpec {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) consumes: Vec<String>,
    pub(crate) produces: Vec<String>,
    pub(crate) name: Option<String>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
}

impl RouteSpec {
    /// Route served by any [`Endpoint`] implementation.
    pub fn new<E: Endpoint>(method: HttpMethod, path: impl Into<String>, endpoint: E) -> Self {
        Self {
            method,
            path: path.into(),
            consumes: Vec::new(),
            produces: Vec::new(),
            name: None,
            endpoint: Arc::new(endpoint),
        }
    }

    /// Route served by an async function or closure.
    pub fn to<F, Fut>(method: HttpMethod, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::new(method, path, FnEndpoint::new(f))
    }

    /// Route whose synchronous body runs on the blocking thread pool.
    pub fn blocking<F>(method: HttpMethod, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::new(method, path, BlockingEndpoint::new(f))
    }

    pub fn get<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::to(HttpMethod::GET, path, f)
    }

    pub fn post<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::to(HttpMethod::POST, path, f)
    }

    pub fn put<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::to(HttpMethod::PUT, path, f)
    }

    pub fn delete<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::to(HttpMethod::DELETE, path, f)
    }

    pub fn patch<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Self::to(HttpMethod::PATCH, path, f)
    }

    /// Media type this route reads; may be called repeatedly.
    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes.push(media_type.into());
        self
    }

    /// Media type this route writes; may be called repeatedly.
    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn prefixed(mut self, base: &str) -> Self {
        self.path = path::join(base, &self.path);
        self
    }
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

/// A group of routes under a common base path.
///
/// Media types declared on the resource apply to every route that does not
/// declare its own.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    base: String,
    consumes: Vec<String>,
    produces: Vec<String>,
    routes: Vec<RouteSpec>,
}

impl Resource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes.push(media_type.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }

    pub fn route(mut self, route: RouteSpec) -> Self {
        self.routes.push(route);
        self
    }

    pub(crate) fn into_routes(self) -> Vec<RouteSpec> {
        let Resource {
            base,
            consumes,
            produces,
            routes,
        } = self;

        routes
            .into_iter()
            .map(|mut route| {
                if route.consumes.is_empty() {
                    route.consumes = consumes.clone();
                }
                if route.produces.is_empty() {
                    route.produces = produces.clone();
                }
                route.prefixed(&base)
            })
            .collect()
    }
}

/// An assembled route. Immutable once built and shared read-only by every
/// request that dispatches to it.
pub struct Route {
    pub method: HttpMethod,
    pub template: PathTemplate,
    pub consumes: Vec<MediaType>,
    pub produces: Vec<MediaType>,
    pub name: String,
    /// Registration order, used as the final tie-break
    pub index: usize,
    pub(crate) chain: Chain,
}

impl Route {
    pub(crate) fn build(spec: &RouteSpec, index: usize, chain: Chain) -> Result<Self> {
        let template = PathTemplate::parse(&spec.path)?;
        let consumes = parse_media_types(&spec.consumes, &spec.path)?;
        let produces = parse_media_types(&spec.produces, &spec.path)?;
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{} {}", spec.method, template.as_str()));

        Ok(Self {
            method: spec.method,
            template,
            consumes,
            produces,
            name,
            index,
            chain,
        })
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("template", &self.template.as_str())
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

fn parse_media_types(values: &[String], path: &str) -> Result<Vec<MediaType>> {
    values
        .iter()
        .map(|value| {
            MediaType::parse(value).ok_or_else(|| {
                Error::InvalidRoute(format!("bad media type `{}` on `{}`", value, path))
            })
        })
        .collect()
}
