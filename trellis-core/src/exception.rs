//! Mapping errors to replies.
//!
//! When a request aborts, the registered [`ExceptionMapper`]s are asked in
//! registration order; the first one returning a reply wins. Errors no
//! mapper claims, and dispatch failures (404, 405, 406, 415), get the
//! [`default_reply`].

use crate::context::RequestContext;
use crate::entity::{Entity, Reply};
use crate::Error;
use serde_json::json;

pub trait ExceptionMapper: Send + Sync + 'static {
    fn map(&self, error: &Error, ctx: &RequestContext) -> Option<Reply>;
}

impl<F> ExceptionMapper for F
where
    F: Fn(&Error, &RequestContext) -> Option<Reply> + Send + Sync + 'static,
{
    fn map(&self, error: &Error, ctx: &RequestContext) -> Option<Reply> {
        self(error, ctx)
    }
}

/// JSON error body carrying the error's status.
///
/// Server errors only expose the reason phrase; the error itself is logged
/// by the caller. 405 replies carry the `Allow` header.
pub fn default_reply(error: &Error) -> Reply {
    let status = error.http_status();
    let message = if status.is_server_error() {
        status.reason().to_string()
    } else {
        error.to_string()
    };

    let mut reply = Reply::new(status.code())
        .with_header("Content-Type", "application/json")
        .with_entity(Entity::Json(json!({
            "error": message,
            "status": status.code(),
        })));

    if let Some(allow) = error.allow_header() {
        reply = reply.with_header("Allow", allow);
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpStatus;

    #[test]
    fn test_default_reply_client_error() {
        let reply = default_reply(&Error::NotAcceptable("application/xml".into()));
        assert_eq!(reply.status, 406);
        assert_eq!(reply.header("content-type"), Some("application/json"));
        assert_eq!(
            reply.entity,
            Entity::Json(json!({"error": "Not Acceptable: application/xml", "status": 406}))
        );
    }

    #[test]
    fn test_default_reply_hides_server_error_detail() {
        let reply = default_reply(&Error::Handler("db password wrong".into()));
        assert_eq!(reply.status, 500);
        assert_eq!(
            reply.entity,
            Entity::Json(json!({"error": "Internal Server Error", "status": 500}))
        );
    }

    #[test]
    fn test_default_reply_allow() {
        let reply = default_reply(&Error::MethodNotAllowed {
            method: "PUT".into(),
            path: "/users".into(),
            allow: vec!["GET".into(), "HEAD".into(), "OPTIONS".into()],
        });
        assert_eq!(reply.status, 405);
        assert_eq!(reply.header("Allow"), Some("GET, HEAD, OPTIONS"));
    }

    #[test]
    fn test_explicit_status() {
        let reply = default_reply(&Error::status(HttpStatus::Conflict, "taken"));
        assert_eq!(reply.status, 409);
    }
}
