//! Application assembly.
//!
//! A [`DeploymentBuilder`] collects routes, filters, mappers and writers;
//! [`build`](DeploymentBuilder::build) validates them and wires the four
//! chains every request can walk:
//!
//! - **initial**: pre-match request filters, then route dispatch
//! - **route** (one per route): post-match request filters, invocation,
//!   then the respond chain
//! - **respond**: response filters, then the response writer
//! - **abort**: exception mapping, then the respond chain
//!
//! The result is immutable and shared by every connection.

use crate::chain::{self, Chain, Disconnect, RestHandler};
use crate::context::RequestContext;
use crate::entity::{EntityWriter, EntityWriters};
use crate::exception::ExceptionMapper;
use crate::extensions::Extensions;
use crate::filter::{ordered, FilterPhase, Prioritized, RequestFilter, ResponseFilter, USER_PRIORITY};
use crate::handlers::{
    ExceptionMapperHandler, InvocationHandler, RequestFilterHandler, ResponseFilterHandler,
    ResponseWriteHandler, RouteDispatchHandler,
};
use crate::route::{Resource, Route, RouteSpec};
use crate::route_table::RouteTable;
use crate::{HttpRequest, HttpResponse, Result};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// An assembled application, ready to handle requests.
pub struct Deployment {
    table: Arc<RouteTable>,
    initial: Chain,
    abort: Chain,
    respond: Chain,
    extensions: Extensions,
}

impl Deployment {
    pub fn builder() -> DeploymentBuilder {
        DeploymentBuilder::default()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    /// Run a request to completion. Never fails: anything that goes wrong
    /// becomes a response.
    ///
    /// ```
    /// use trellis_core::{Deployment, HttpRequest, Reply, RouteSpec};
    ///
    /// # tokio_test::block_on(async {
    /// let deployment = Deployment::builder()
    ///     .route(RouteSpec::get("/users/{id}", |inv| async move {
    ///         Ok(Reply::text(format!("user {}", inv.param("id").unwrap_or("?"))))
    ///     }))
    ///     .build()
    ///     .unwrap();
    ///
    /// let response = deployment.handle(HttpRequest::new("GET", "/users/7")).await;
    /// assert_eq!(response.status, 200);
    /// assert_eq!(response.body_str(), Some("user 7"));
    ///
    /// let response = deployment.handle(HttpRequest::new("DELETE", "/users/7")).await;
    /// assert_eq!(response.status, 405);
    /// # });
    /// ```
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.handle_with(request, Disconnect::never()).await {
            Ok(response) => response,
            Err(err) => HttpResponse::new(err.status_code()),
        }
    }

    /// Run a request, giving up when `disconnect` fires while the request
    /// is suspended.
    pub async fn handle_with(
        &self,
        request: HttpRequest,
        disconnect: Disconnect,
    ) -> Result<HttpResponse> {
        let span = info_span!("request", method = %request.method, path = %request.path);

        async move {
            let ctx = RequestContext::new(
                request,
                self.initial.clone(),
                self.abort.clone(),
                self.respond.clone(),
                self.extensions.clone(),
            );
            let response = chain::execute(ctx, disconnect).await?;
            debug!(status = response.status, "Request handled");
            Ok(response)
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("routes", &self.table.len())
            .field("initial", &self.initial.len())
            .field("abort", &self.abort.len())
            .finish()
    }
}

/// Collects the parts of a [`Deployment`].
#[derive(Default)]
pub struct DeploymentBuilder {
    routes: Vec<RouteSpec>,
    request_filters: Vec<(FilterPhase, Prioritized<dyn RequestFilter>)>,
    response_filters: Vec<Prioritized<dyn ResponseFilter>>,
    mappers: Vec<Arc<dyn ExceptionMapper>>,
    writers: EntityWriters,
    extensions: Extensions,
}

impl DeploymentBuilder {
    pub fn route(mut self, route: RouteSpec) -> Self {
        self.routes.push(route);
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.routes.extend(resource.into_routes());
        self
    }

    /// Request filter run before route matching.
    pub fn pre_match_filter<F: RequestFilter>(self, filter: F) -> Self {
        self.add_request_filter(FilterPhase::PreMatch, USER_PRIORITY, filter)
    }

    /// Request filter run after route matching, at the default priority.
    pub fn request_filter<F: RequestFilter>(self, filter: F) -> Self {
        self.add_request_filter(FilterPhase::PostMatch, USER_PRIORITY, filter)
    }

    pub fn request_filter_with_priority<F: RequestFilter>(self, priority: i32, filter: F) -> Self {
        self.add_request_filter(FilterPhase::PostMatch, priority, filter)
    }

    pub fn response_filter<F: ResponseFilter>(self, filter: F) -> Self {
        self.response_filter_with_priority(USER_PRIORITY, filter)
    }

    pub fn response_filter_with_priority<F: ResponseFilter>(
        mut self,
        priority: i32,
        filter: F,
    ) -> Self {
        self.response_filters.push(Prioritized {
            priority,
            filter: Arc::new(filter),
        });
        self
    }

    pub fn exception_mapper<M: ExceptionMapper>(mut self, mapper: M) -> Self {
        self.mappers.push(Arc::new(mapper));
        self
    }

    pub fn entity_writer<W: EntityWriter>(mut self, writer: W) -> Self {
        self.writers.register(writer);
        self
    }

    /// Application state visible to every filter and endpoint.
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    fn add_request_filter<F: RequestFilter>(
        mut self,
        phase: FilterPhase,
        priority: i32,
        filter: F,
    ) -> Self {
        self.request_filters.push((
            phase,
            Prioritized {
                priority,
                filter: Arc::new(filter),
            },
        ));
        self
    }

    /// Validate every route and assemble the chains.
    pub fn build(self) -> Result<Deployment> {
        let DeploymentBuilder {
            routes,
            request_filters,
            response_filters,
            mappers,
            writers,
            extensions,
        } = self;

        let (pre_match, post_match): (Vec<_>, Vec<_>) = request_filters
            .into_iter()
            .partition(|(phase, _)| *phase == FilterPhase::PreMatch);
        let pre_match = filter_handlers(pre_match);
        let post_match = filter_handlers(post_match);

        let mut respond: Vec<Arc<dyn RestHandler>> = ordered(response_filters, true)
            .into_iter()
            .map(|filter| Arc::new(ResponseFilterHandler::new(filter)) as Arc<dyn RestHandler>)
            .collect();
        respond.push(Arc::new(ResponseWriteHandler::new(Arc::new(writers))));

        let mut table = RouteTable::builder();
        for (index, spec) in routes.iter().enumerate() {
            let mut handlers = post_match.clone();
            handlers.push(Arc::new(InvocationHandler::new(spec.endpoint.clone())));
            handlers.extend(respond.iter().cloned());

            let route = Route::build(spec, index, Arc::from(handlers))?;
            debug!(route = %route.name, handlers = route.chain_len(), "Route registered");
            table.add(route);
        }
        let table = Arc::new(table.build());

        let mut abort: Vec<Arc<dyn RestHandler>> =
            vec![Arc::new(ExceptionMapperHandler::new(Arc::from(mappers)))];
        abort.extend(respond.iter().cloned());

        let mut initial = pre_match;
        initial.push(Arc::new(RouteDispatchHandler::new(table.clone())));

        info!(
            routes = table.len(),
            paths = table.entries().len(),
            "Deployment built"
        );

        Ok(Deployment {
            table,
            initial: Arc::from(initial),
            abort: Arc::from(abort),
            respond: Arc::from(respond),
            extensions,
        })
    }
}

fn filter_handlers(
    filters: Vec<(FilterPhase, Prioritized<dyn RequestFilter>)>,
) -> Vec<Arc<dyn RestHandler>> {
    let filters = filters.into_iter().map(|(_, filter)| filter).collect();
    ordered(filters, false)
        .into_iter()
        .map(|filter| Arc::new(RequestFilterHandler::new(filter)) as Arc<dyn RestHandler>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Invocation;
    use crate::entity::Reply;

    async fn hello(_: Invocation) -> Result<Reply> {
        Ok(Reply::text("hello"))
    }

    #[test]
    fn test_build_rejects_invalid_route() {
        let err = Deployment::builder()
            .route(RouteSpec::get("/users/{id", hello))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidRoute(_)));
    }

    #[tokio::test]
    async fn test_handle_simple_route() {
        let deployment = Deployment::builder()
            .route(RouteSpec::get("/hello", hello))
            .build()
            .unwrap();
        let response = deployment.handle(HttpRequest::new("GET", "/hello")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), Some("hello"));
        assert_eq!(
            response.header("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_route_chain_layout() {
        let deployment = Deployment::builder()
            .request_filter(|_: &mut RequestContext| -> Result<crate::FilterOutcome> {
                Ok(crate::FilterOutcome::Continue)
            })
            .response_filter(|_: &mut RequestContext| -> Result<()> { Ok(()) })
            .route(RouteSpec::get("/hello", hello))
            .build()
            .unwrap();

        let route = deployment.routes().routes().next().unwrap();
        // filter, invoke, response filter, write
        assert_eq!(route.chain_len(), 4);
    }
}
