//! Handler chains and the executor that drives them.
//!
//! A request runs through a sequence of [`RestHandler`]s. Each handler
//! either lets the chain continue, ends it, or suspends it on a future.
//! While suspended the executor awaits the future on a separate task and
//! then applies the handler's continuation, so the next handler starts
//! exactly where the chain stopped.
//!
//! Errors returned by a handler (or by a continuation) switch the request
//! to the abort chain, which turns the error into a reply and writes it.
//! An error raised while the abort chain itself is running ends the
//! request with a bare 500.

use crate::context::{ChainState, RequestContext};
use crate::{Error, HttpResponse, Result};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn, Instrument};

/// An immutable, shareable sequence of handlers.
pub type Chain = Arc<[Arc<dyn RestHandler>]>;

/// One step of request processing.
pub trait RestHandler: Send + Sync + 'static {
    fn handle(&self, ctx: &mut RequestContext) -> Result<Flow>;

    /// Name used in trace output.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// What the executor does after a handler returns.
pub enum Flow {
    /// Run the next handler of the current chain.
    Next,
    /// Wait for the suspension, apply its continuation, then continue.
    Suspend(Suspension),
    /// Stop running handlers.
    Done,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Next => f.write_str("Next"),
            Flow::Suspend(_) => f.write_str("Suspend"),
            Flow::Done => f.write_str("Done"),
        }
    }
}

/// Continuation applied to the context when a suspension resolves.
pub type Resume = Box<dyn FnOnce(&mut RequestContext) -> Result<()> + Send>;

/// An asynchronous hand-off point.
///
/// The future owns everything it needs; it cannot touch the context. Its
/// output is a [`Resume`] continuation that can.
pub struct Suspension {
    future: BoxFuture<'static, Result<Resume>>,
}

impl Suspension {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Resume>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Await `future`, then hand its value to `resume` together with the
    /// context.
    pub fn then<F, T, R>(future: F, resume: R) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
        R: FnOnce(&mut RequestContext, T) -> Result<()> + Send + 'static,
    {
        Self::new(async move {
            let value = future.await?;
            let resume: Resume = Box::new(move |ctx: &mut RequestContext| resume(ctx, value));
            Ok(resume)
        })
    }
}

/// Signalled when the client connection goes away.
#[derive(Debug, Clone, Default)]
pub struct Disconnect {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending half of a [`Disconnect`].
#[derive(Debug)]
pub struct DisconnectHandle {
    tx: watch::Sender<bool>,
}

impl DisconnectHandle {
    pub fn disconnect(&self) {
        self.tx.send_replace(true);
    }
}

impl Disconnect {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn channel() -> (DisconnectHandle, Disconnect) {
        let (tx, rx) = watch::channel(false);
        (DisconnectHandle { tx }, Disconnect { rx: Some(rx) })
    }

    pub fn is_disconnected(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the connection is gone. Stays pending forever when the
    /// handle is dropped without signalling.
    pub async fn closed(&mut self) {
        let fired = match self.rx.as_mut() {
            Some(rx) => rx.wait_for(|closed| *closed).await.is_ok(),
            None => false,
        };
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

/// Drive `ctx` through its chains until a response is produced.
///
/// Returns `Err(Error::ConnectionClosed)` only when `disconnect` fires while
/// the chain is suspended; every other failure is turned into a response.
pub async fn execute(mut ctx: RequestContext, mut disconnect: Disconnect) -> Result<HttpResponse> {
    ctx.set_state(ChainState::Running);

    while let Some(handler) = ctx.next_handler() {
        trace!(
            handler = handler.name(),
            position = ctx.position() - 1,
            "Running handler"
        );

        let outcome = match handler.handle(&mut ctx) {
            Ok(Flow::Next) => Ok(()),
            Ok(Flow::Done) => break,
            Ok(Flow::Suspend(suspension)) => {
                ctx.set_state(ChainState::Suspended);
                trace!(handler = handler.name(), "Chain suspended");

                // the task is detached if the client goes away; its result is dropped
                let mut task = tokio::spawn(suspension.future.in_current_span());
                let resumed = tokio::select! {
                    joined = &mut task => joined
                        .map_err(|e| Error::Internal(format!("suspended task failed: {}", e)))
                        .and_then(|result| result),
                    _ = disconnect.closed() => {
                        warn!("Client disconnected while the request was suspended");
                        ctx.finish(ChainState::Failed);
                        return Err(Error::ConnectionClosed);
                    }
                };

                ctx.set_state(ChainState::Running);
                trace!("Chain resumed");
                resumed.and_then(|resume| resume(&mut ctx))
            }
            Err(err) => Err(err),
        };

        if let Err(err) = outcome {
            if !abort(&mut ctx, err) {
                break;
            }
        }
    }

    let response = match ctx.take_response() {
        Some(response) => response,
        None => {
            error!("Handler chain finished without a response");
            HttpResponse::internal_server_error()
        }
    };

    let state = if ctx.is_aborting() {
        ChainState::Failed
    } else {
        ChainState::Completed
    };
    debug!(status = response.status, state = ?state, "Handler chain finished");
    ctx.finish(state);

    Ok(response)
}

/// Returns whether the chain should keep running.
fn abort(ctx: &mut RequestContext, err: Error) -> bool {
    if ctx.is_aborting() {
        error!(error = %err, "Error raised while handling a previous error");
        ctx.set_response(HttpResponse::internal_server_error());
        return false;
    }

    if err.is_server_error() {
        debug!(error = %err, "Aborting request");
    } else {
        trace!(error = %err, "Aborting request");
    }
    ctx.begin_abort(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extensions;
    use crate::http::HttpRequest;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Appends a mark to the response body, optionally after a suspension.
    struct Mark {
        mark: &'static str,
        suspend: bool,
    }

    fn append(ctx: &mut RequestContext, mark: &str) {
        let mut response = ctx.take_response().unwrap_or_else(HttpResponse::ok);
        response.body.extend_from_slice(mark.as_bytes());
        ctx.set_response(response);
    }

    impl RestHandler for Mark {
        fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
            let mark = self.mark;
            if self.suspend {
                Ok(Flow::Suspend(Suspension::then(
                    async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(mark)
                    },
                    |ctx, mark| {
                        append(ctx, mark);
                        Ok(())
                    },
                )))
            } else {
                append(ctx, mark);
                Ok(Flow::Next)
            }
        }
    }

    struct Fail(&'static str);

    impl RestHandler for Fail {
        fn handle(&self, _ctx: &mut RequestContext) -> Result<Flow> {
            Err(Error::Handler(self.0.to_string()))
        }
    }

    /// Abort-chain step writing the error message as a 500 body.
    struct MapError;

    impl RestHandler for MapError {
        fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
            let message = ctx.error().map(|e| e.to_string()).unwrap_or_default();
            ctx.set_response(HttpResponse::new(500).with_body(message));
            Ok(Flow::Next)
        }
    }

    fn chain(handlers: Vec<Arc<dyn RestHandler>>) -> Chain {
        Arc::from(handlers)
    }

    fn mark(mark: &'static str, suspend: bool) -> Arc<dyn RestHandler> {
        Arc::new(Mark { mark, suspend })
    }

    fn context(initial: Chain, abort: Chain) -> RequestContext {
        RequestContext::new(
            HttpRequest::new("GET", "/"),
            initial,
            abort,
            chain(vec![]),
            Extensions::new(),
        )
    }

    #[tokio::test]
    async fn test_runs_handlers_in_order() {
        let ctx = context(
            chain(vec![mark("a", false), mark("b", false), mark("c", false)]),
            chain(vec![]),
        );
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.body, b"abc");
    }

    #[tokio::test]
    async fn test_suspension_matches_synchronous_chain() {
        let sync = context(
            chain(vec![mark("a", false), mark("b", false), mark("c", false)]),
            chain(vec![]),
        );
        let suspended = context(
            chain(vec![mark("a", false), mark("b", true), mark("c", false)]),
            chain(vec![]),
        );

        let expected = execute(sync, Disconnect::never()).await.unwrap();
        let actual = execute(suspended, Disconnect::never()).await.unwrap();
        assert_eq!(expected, actual);
    }

    #[tokio::test]
    async fn test_error_walks_abort_chain() {
        let ctx = context(
            chain(vec![mark("a", false), Arc::new(Fail("boom")), mark("never", false)]),
            chain(vec![Arc::new(MapError)]),
        );
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body_str(), Some("Handler error: boom"));
    }

    #[tokio::test]
    async fn test_error_in_abort_chain_is_bare_500() {
        let ctx = context(
            chain(vec![Arc::new(Fail("first"))]),
            chain(vec![mark("partial", false), Arc::new(Fail("second"))]),
        );
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response, HttpResponse::internal_server_error());
    }

    #[tokio::test]
    async fn test_suspension_error_aborts() {
        struct FailLater;

        impl RestHandler for FailLater {
            fn handle(&self, _ctx: &mut RequestContext) -> Result<Flow> {
                Ok(Flow::Suspend(Suspension::new(async {
                    Err(Error::Handler("late".into()))
                })))
            }
        }

        let ctx = context(chain(vec![Arc::new(FailLater)]), chain(vec![Arc::new(MapError)]));
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.body_str(), Some("Handler error: late"));
    }

    #[tokio::test]
    async fn test_missing_response_is_500() {
        let ctx = context(chain(vec![]), chain(vec![]));
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_done_stops_chain() {
        struct Stop;

        impl RestHandler for Stop {
            fn handle(&self, _ctx: &mut RequestContext) -> Result<Flow> {
                Ok(Flow::Done)
            }
        }

        let ctx = context(
            chain(vec![mark("a", false), Arc::new(Stop), mark("b", false)]),
            chain(vec![]),
        );
        let response = execute(ctx, Disconnect::never()).await.unwrap();
        assert_eq!(response.body, b"a");
    }

    #[tokio::test]
    async fn test_disconnect_while_suspended_fails_request() {
        struct Slow {
            finished: Arc<Mutex<bool>>,
        }

        impl RestHandler for Slow {
            fn handle(&self, _ctx: &mut RequestContext) -> Result<Flow> {
                let finished = self.finished.clone();
                Ok(Flow::Suspend(Suspension::then(
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        *finished.lock().unwrap() = true;
                        Ok(())
                    },
                    |_, ()| Ok(()),
                )))
            }
        }

        let finished = Arc::new(Mutex::new(false));
        let states = Arc::new(Mutex::new(Vec::new()));

        let mut ctx = context(
            chain(vec![Arc::new(Slow {
                finished: finished.clone(),
            })]),
            chain(vec![]),
        );
        let sink = states.clone();
        ctx.on_complete(move |state| sink.lock().unwrap().push(state));

        let (handle, disconnect) = Disconnect::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.disconnect();
        });

        let err = execute(ctx, disconnect).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(*states.lock().unwrap(), vec![ChainState::Failed]);

        // the detached work still runs to completion
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(*finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_completion_state() {
        let states = Arc::new(Mutex::new(Vec::new()));

        let mut ok = context(chain(vec![mark("a", false)]), chain(vec![]));
        let sink = states.clone();
        ok.on_complete(move |state| sink.lock().unwrap().push(state));
        execute(ok, Disconnect::never()).await.unwrap();

        let mut failed = context(chain(vec![Arc::new(Fail("x"))]), chain(vec![Arc::new(MapError)]));
        let sink = states.clone();
        failed.on_complete(move |state| sink.lock().unwrap().push(state));
        execute(failed, Disconnect::never()).await.unwrap();

        assert_eq!(
            *states.lock().unwrap(),
            vec![ChainState::Completed, ChainState::Failed]
        );
    }

    #[test]
    fn test_disconnect_flag() {
        let (handle, disconnect) = Disconnect::channel();
        assert!(!disconnect.is_disconnected());
        handle.disconnect();
        assert!(disconnect.is_disconnected());
        assert!(!Disconnect::never().is_disconnected());
    }
}
