//! Trellis - REST request dispatch for Rust
//!
//! Routes requests to endpoints by path template, HTTP method and media
//! type, then runs them through resumable handler chains with filters,
//! exception mapping and entity writing.
//!
//! ```
//! use trellis::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let deployment = Deployment::builder()
//!     .route(
//!         RouteSpec::get("/hello", |_| async { Reply::json(&serde_json::json!({"hello": "world"})) })
//!             .produces("application/json"),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let response = deployment
//!     .handle(HttpRequest::new("GET", "/hello").with_header("Accept", "text/html"))
//!     .await;
//! assert_eq!(response.status, 406);
//! # });
//! ```

// Re-export core functionality
pub use trellis_core::*;

pub use trellis_config;

#[cfg(feature = "testing")]
pub use trellis_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ChainState,
        Deployment,
        Disconnect,
        Error,
        FilterOutcome,
        Flow,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        HttpStatus,
        Invocation,
        MediaType,
        Reply,
        RequestContext,
        Resource,
        RestHandler,
        Result,
        RouteSpec,
        Server,
        ServerConfig,
        Suspension,
    };
    pub use trellis_config::{ConfigManager, Validate};
}
