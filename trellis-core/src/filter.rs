//! Request and response filters.
//!
//! Request filters run before the endpoint, either before route matching
//! (pre-match) or after it. They may let the request through, answer it
//! directly, or suspend on asynchronous work. Response filters see every
//! reply, including replies produced by exception mappers and by request
//! filters that answered early.
//!
//! Filters are ordered by priority: request filters ascending, response
//! filters descending, registration order on ties.
//!
//! ```
//! use trellis_core::{Deployment, FilterOutcome, Reply, RequestContext, Result};
//!
//! let deployment = Deployment::builder()
//!     .request_filter(|ctx: &mut RequestContext| -> Result<FilterOutcome> {
//!         if ctx.request().header("Authorization").is_none() {
//!             return Ok(FilterOutcome::Respond(Reply::new(401)));
//!         }
//!         Ok(FilterOutcome::Continue)
//!     })
//!     .build()
//!     .unwrap();
//! # drop(deployment);
//! ```

use crate::chain::Suspension;
use crate::context::RequestContext;
use crate::entity::Reply;
use crate::Result;
use std::sync::Arc;

/// Default filter priority.
pub const USER_PRIORITY: i32 = 5000;
/// Priority band for authentication filters.
pub const AUTHENTICATION_PRIORITY: i32 = 1000;
/// Priority band for authorization filters.
pub const AUTHORIZATION_PRIORITY: i32 = 2000;
/// Priority band for header decorators.
pub const HEADER_DECORATOR_PRIORITY: i32 = 3000;

/// What a request filter decided.
pub enum FilterOutcome {
    Continue,
    /// Skip the endpoint and answer with this reply.
    Respond(Reply),
    /// Wait for asynchronous work before continuing.
    Suspend(Suspension),
}

pub trait RequestFilter: Send + Sync + 'static {
    fn filter(&self, ctx: &mut RequestContext) -> Result<FilterOutcome>;
}

impl<F> RequestFilter for F
where
    F: Fn(&mut RequestContext) -> Result<FilterOutcome> + Send + Sync + 'static,
{
    fn filter(&self, ctx: &mut RequestContext) -> Result<FilterOutcome> {
        self(ctx)
    }
}

/// Runs on the reply before it is written. The reply is available through
/// [`RequestContext::reply_mut`].
pub trait ResponseFilter: Send + Sync + 'static {
    fn filter(&self, ctx: &mut RequestContext) -> Result<()>;
}

impl<F> ResponseFilter for F
where
    F: Fn(&mut RequestContext) -> Result<()> + Send + Sync + 'static,
{
    fn filter(&self, ctx: &mut RequestContext) -> Result<()> {
        self(ctx)
    }
}

/// When a request filter runs relative to route matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    PreMatch,
    PostMatch,
}

pub(crate) struct Prioritized<T: ?Sized> {
    pub priority: i32,
    pub filter: Arc<T>,
}

/// Stable sort: ascending priority, registration order on ties.
pub(crate) fn ordered<T: ?Sized>(mut filters: Vec<Prioritized<T>>, descending: bool) -> Vec<Arc<T>> {
    if descending {
        filters.sort_by(|a, b| b.priority.cmp(&a.priority));
    } else {
        filters.sort_by(|a, b| a.priority.cmp(&b.priority));
    }
    filters.into_iter().map(|p| p.filter).collect()
}
