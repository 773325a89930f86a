// Built-in chain steps: dispatch, filters, invocation, error mapping and
// response writing

use crate::chain::{Flow, RestHandler, Suspension};
use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use crate::entity::{EntityWriters, Reply};
use crate::exception::{default_reply, ExceptionMapper};
use crate::filter::{FilterOutcome, RequestFilter, ResponseFilter};
use crate::http::{find_header, set_header};
use crate::media_type::MediaType;
use crate::route_table::{Resolution, RouteTable};
use crate::{Error, HttpResponse, HttpStatus, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Resolves the request against the route table and jumps into the
/// matched route's chain. `OPTIONS` without a route of its own is answered
/// here with the path's `Allow` set.
pub struct RouteDispatchHandler {
    table: Arc<RouteTable>,
}

impl RouteDispatchHandler {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }
}

impl RestHandler for RouteDispatchHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        let request = ctx.request();
        let resolution = self.table.resolve(
            &request.method,
            ctx.path(),
            request.content_type(),
            request.accept(),
        )?;

        match resolution {
            Resolution::Route(matched) => {
                let chain = matched.route.chain.clone();
                ctx.set_match(matched);
                ctx.restart(chain);
            }
            Resolution::Options { allow } => {
                debug!(allow = ?allow, "Answering OPTIONS");
                ctx.set_reply(Reply::ok().with_header("Allow", allow.join(", ")));
                let chain = ctx.respond_chain();
                ctx.restart(chain);
            }
        }
        Ok(Flow::Next)
    }

    fn name(&self) -> &'static str {
        "dispatch"
    }
}

pub struct RequestFilterHandler {
    filter: Arc<dyn RequestFilter>,
}

impl RequestFilterHandler {
    pub fn new(filter: Arc<dyn RequestFilter>) -> Self {
        Self { filter }
    }
}

impl RestHandler for RequestFilterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        match self.filter.filter(ctx)? {
            FilterOutcome::Continue => Ok(Flow::Next),
            FilterOutcome::Respond(reply) => {
                debug!(status = reply.status, "Request filter answered the request");
                ctx.set_reply(reply);
                let chain = ctx.respond_chain();
                ctx.restart(chain);
                Ok(Flow::Next)
            }
            FilterOutcome::Suspend(suspension) => Ok(Flow::Suspend(suspension)),
        }
    }

    fn name(&self) -> &'static str {
        "request-filter"
    }
}

/// Calls the route's endpoint. The endpoint future runs while the chain is
/// suspended; its reply becomes the context's reply.
pub struct InvocationHandler {
    endpoint: Arc<dyn Endpoint>,
}

impl InvocationHandler {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self { endpoint }
    }
}

impl RestHandler for InvocationHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        let invocation = ctx.invocation()?;
        let endpoint = self.endpoint.clone();

        Ok(Flow::Suspend(Suspension::then(
            async move { endpoint.invoke(invocation).await },
            |ctx, reply| {
                ctx.set_reply(reply);
                Ok(())
            },
        )))
    }

    fn name(&self) -> &'static str {
        "invoke"
    }
}

pub struct ResponseFilterHandler {
    filter: Arc<dyn ResponseFilter>,
}

impl ResponseFilterHandler {
    pub fn new(filter: Arc<dyn ResponseFilter>) -> Self {
        Self { filter }
    }
}

impl RestHandler for ResponseFilterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        if ctx.reply().is_some() {
            self.filter.filter(ctx)?;
        }
        Ok(Flow::Next)
    }

    fn name(&self) -> &'static str {
        "response-filter"
    }
}

/// First step of the abort chain: turns the context's error into a reply.
pub struct ExceptionMapperHandler {
    mappers: Arc<[Arc<dyn ExceptionMapper>]>,
}

impl ExceptionMapperHandler {
    pub fn new(mappers: Arc<[Arc<dyn ExceptionMapper>]>) -> Self {
        Self { mappers }
    }
}

impl RestHandler for ExceptionMapperHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        let error = ctx
            .take_error()
            .unwrap_or_else(|| Error::Internal("abort chain entered without an error".into()));

        let mapped = if error.is_dispatch_failure() {
            None
        } else {
            self.mappers.iter().find_map(|mapper| mapper.map(&error, &*ctx))
        };

        let reply = match mapped {
            Some(reply) => {
                debug!(error = %error, status = reply.status, "Error mapped");
                reply
            }
            None => {
                let status = error.http_status();
                if status.is_server_error() {
                    error!(error = %error, path = ctx.path(), "Request failed");
                } else if error.is_dispatch_failure() {
                    debug!(error = %error, status = status.code(), "Dispatch failed");
                } else {
                    warn!(error = %error, status = status.code(), "Request rejected");
                }
                default_reply(&error)
            }
        };

        ctx.set_error(error);
        ctx.set_reply(reply);
        Ok(Flow::Next)
    }

    fn name(&self) -> &'static str {
        "exception-mapper"
    }
}

/// Last step of every chain: serializes the reply into the response.
///
/// The target media type is the reply's own `Content-Type` when set, else
/// the negotiated produces type, else the writer's default. `HEAD` keeps
/// the headers (including `Content-Length`) but drops the body.
pub struct ResponseWriteHandler {
    writers: Arc<EntityWriters>,
}

impl ResponseWriteHandler {
    pub fn new(writers: Arc<EntityWriters>) -> Self {
        Self { writers }
    }
}

impl RestHandler for ResponseWriteHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        let Reply {
            status,
            mut headers,
            entity,
        } = ctx
            .take_reply()
            .ok_or_else(|| Error::Internal("no reply to write".into()))?;

        let forbids_body = HttpStatus::from_code(status).is_some_and(|s| s.forbids_body());
        let mut body = Vec::new();

        if !entity.is_empty() && !forbids_body {
            let explicit = find_header(&headers, "Content-Type")
                .and_then(MediaType::parse)
                .filter(|media_type| !media_type.is_wildcard());

            // a wildcard left by negotiation is filled in by the writer default
            let media_type = match explicit.or_else(|| ctx.produces().cloned()) {
                Some(media_type) if !media_type.is_wildcard() => media_type,
                range => {
                    let range = range.unwrap_or_else(MediaType::any);
                    self.writers
                        .default_media_type_within(&entity, &range)
                        .ok_or_else(|| Error::NoEntityWriter {
                            entity: entity.kind().to_string(),
                            media_type: range.essence(),
                        })?
                }
            };

            body = self.writers.write(&entity, &media_type)?;
            set_header(&mut headers, "Content-Type", media_type.to_header_value());
        }

        if !forbids_body {
            set_header(&mut headers, "Content-Length", body.len().to_string());
        }
        if ctx.is_head() {
            body.clear();
        }

        ctx.set_response(HttpResponse {
            status,
            headers,
            body,
        });
        Ok(Flow::Next)
    }

    fn name(&self) -> &'static str {
        "write"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{execute, Chain, Disconnect};
    use crate::entity::Entity;
    use crate::extensions::Extensions;
    use crate::http::HttpRequest;
    use serde_json::json;

    fn writer() -> Arc<dyn RestHandler> {
        Arc::new(ResponseWriteHandler::new(Arc::new(EntityWriters::new())))
    }

    struct SetReply(Reply);

    impl RestHandler for SetReply {
        fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
            ctx.set_reply(self.0.clone());
            Ok(Flow::Next)
        }
    }

    async fn write(method: &str, reply: Reply) -> HttpResponse {
        let chain: Chain = Arc::from(vec![Arc::new(SetReply(reply)) as Arc<dyn RestHandler>, writer()]);
        let ctx = RequestContext::new(
            HttpRequest::new(method, "/"),
            chain,
            Arc::from(Vec::new()),
            Arc::from(Vec::new()),
            Extensions::new(),
        );
        execute(ctx, Disconnect::never()).await.unwrap()
    }

    #[tokio::test]
    async fn test_writer_uses_default_media_type() {
        let response = write("GET", Reply::json(&json!({"a": 1})).unwrap()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header("Content-Length"), Some("7"));
        assert_eq!(response.body_str(), Some(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_writer_respects_explicit_content_type() {
        let reply = Reply::text("<p>hi</p>").with_header("content-type", "text/html");
        let response = write("GET", reply).await;
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.headers.len(), 2);
    }

    #[tokio::test]
    async fn test_head_drops_body_keeps_length() {
        let response = write("HEAD", Reply::text("hello")).await;
        assert_eq!(response.header("Content-Length"), Some("5"));
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_no_content_has_no_body_headers() {
        let response = write("GET", Reply::no_content().with_entity(Entity::Text("x".into()))).await;
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
        assert_eq!(response.header("Content-Length"), None);
    }

    #[tokio::test]
    async fn test_unwritable_entity_is_500() {
        let reply = Reply::json(&json!(1)).unwrap().with_header("Content-Type", "text/plain");
        let chain: Chain = Arc::from(vec![Arc::new(SetReply(reply)) as Arc<dyn RestHandler>, writer()]);
        let mapper: Arc<[Arc<dyn ExceptionMapper>]> = Arc::from(Vec::new());
        let abort: Chain = Arc::from(vec![
            Arc::new(ExceptionMapperHandler::new(mapper)) as Arc<dyn RestHandler>,
            writer(),
        ]);
        let ctx = RequestContext::new(
            HttpRequest::new("GET", "/"),
            chain,
            abort,
            Arc::from(Vec::new()),
            Extensions::new(),
        );
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&response.body).unwrap(),
            json!({"error": "Internal Server Error", "status": 500})
        );
    }
}
