// Per-request state carried through the handler chains

use crate::chain::{Chain, RestHandler};
use crate::endpoint::Invocation;
use crate::entity::Reply;
use crate::extensions::Extensions;
use crate::http::HttpRequest;
use crate::media_type::MediaType;
use crate::path::{self, PathParams};
use crate::route::Route;
use crate::route_table::RouteMatch;
use crate::{Error, HttpMethod, HttpResponse, Result};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Lifecycle of a request's handler chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Initial,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Completed | ChainState::Failed)
    }
}

/// Runs once when the request reaches a terminal state.
pub type CompletionCallback = Box<dyn FnOnce(ChainState) + Send>;

/// Mutable state of one request.
///
/// Owned by the task executing the request; handlers borrow it mutably one
/// at a time. Dropping a context that never reached a terminal state (the
/// request future was dropped) moves it to [`ChainState::Failed`] and runs
/// the completion callbacks.
pub struct RequestContext {
    request: HttpRequest,
    method: Option<HttpMethod>,
    path: String,
    head: bool,

    route: Option<Arc<Route>>,
    params: PathParams,
    consumes: Option<MediaType>,
    produces: Option<MediaType>,

    reply: Option<Reply>,
    response: Option<HttpResponse>,
    error: Option<Error>,
    extensions: Extensions,

    state: ChainState,
    chain: Chain,
    position: usize,
    abort_chain: Chain,
    respond_chain: Chain,
    aborting: bool,
    completion: Vec<CompletionCallback>,
}

impl RequestContext {
    /// Context positioned at the start of `initial`.
    pub fn new(
        request: HttpRequest,
        initial: Chain,
        abort_chain: Chain,
        respond_chain: Chain,
        extensions: Extensions,
    ) -> Self {
        let method = HttpMethod::from_str(&request.method);
        let path = path::normalize(&request.path);

        Self {
            head: method == Some(HttpMethod::HEAD),
            method,
            path,
            request,
            route: None,
            params: PathParams::default(),
            consumes: None,
            produces: None,
            reply: None,
            response: None,
            error: None,
            extensions,
            state: ChainState::Initial,
            chain: initial,
            position: 0,
            abort_chain,
            respond_chain,
            aborting: false,
            completion: Vec::new(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// Parsed request method; `None` for methods the router does not know.
    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    /// Normalized request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the response body must be suppressed.
    pub fn is_head(&self) -> bool {
        self.head
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn consumes(&self) -> Option<&MediaType> {
        self.consumes.as_ref()
    }

    pub fn produces(&self) -> Option<&MediaType> {
        self.produces.as_ref()
    }

    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    pub fn reply_mut(&mut self) -> Option<&mut Reply> {
        self.reply.as_mut()
    }

    pub fn set_reply(&mut self, reply: Reply) {
        self.reply = Some(reply);
    }

    pub fn take_reply(&mut self) -> Option<Reply> {
        self.reply.take()
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: HttpResponse) {
        self.response = Some(response);
    }

    /// The error being handled by the abort chain.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub(crate) fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Index of the next handler to run in the current chain.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_aborting(&self) -> bool {
        self.aborting
    }

    /// Replace the current chain and continue from its first handler.
    pub fn restart(&mut self, chain: Chain) {
        trace!(
            from = self.chain.len(),
            to = chain.len(),
            "Restarting handler chain"
        );
        self.chain = chain;
        self.position = 0;
    }

    /// Chain that filters and writes the current reply.
    pub fn respond_chain(&self) -> Chain {
        self.respond_chain.clone()
    }

    /// Register a callback run with the terminal state of the request.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(ChainState) + Send + 'static,
    {
        self.completion.push(Box::new(callback));
    }

    pub(crate) fn set_match(&mut self, matched: RouteMatch) {
        self.route = Some(matched.route);
        self.params = matched.params;
        self.consumes = matched.consumes;
        self.produces = matched.produces;
    }

    /// Owned snapshot handed to the endpoint. Moves the request body.
    pub(crate) fn invocation(&mut self) -> Result<Invocation> {
        let method = self
            .method
            .ok_or_else(|| Error::Internal("invocation without a known method".into()))?;

        Ok(Invocation {
            method,
            path: self.path.clone(),
            params: self.params.clone(),
            query: self.request.query_pairs(),
            headers: self.request.headers.clone(),
            body: std::mem::take(&mut self.request.body),
            consumes: self.consumes.clone(),
            produces: self.produces.clone(),
            extensions: self.extensions.clone(),
        })
    }

    pub(crate) fn next_handler(&mut self) -> Option<Arc<dyn RestHandler>> {
        let handler = self.chain.get(self.position)?.clone();
        self.position += 1;
        Some(handler)
    }

    pub(crate) fn set_state(&mut self, state: ChainState) {
        self.state = state;
    }

    /// Switch to the abort chain for `error`. Returns `false` when the
    /// context is already aborting, in which case nothing is changed.
    pub(crate) fn begin_abort(&mut self, error: Error) -> bool {
        if self.aborting {
            return false;
        }
        self.aborting = true;
        self.reply = None;
        self.response = None;
        self.error = Some(error);
        let chain = self.abort_chain.clone();
        self.restart(chain);
        true
    }

    pub(crate) fn take_response(&mut self) -> Option<HttpResponse> {
        self.response.take()
    }

    /// Enter a terminal state and run the completion callbacks once.
    pub(crate) fn finish(&mut self, state: ChainState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        for callback in self.completion.drain(..) {
            callback(state);
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.finish(ChainState::Failed);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.request.method)
            .field("path", &self.path)
            .field("route", &self.route.as_ref().map(|r| r.name.as_str()))
            .field("state", &self.state)
            .field("position", &self.position)
            .field("aborting", &self.aborting)
            .finish()
    }
}
