//! Testing utilities for Trellis deployments.
//!
//! [`TestClient`] sends requests through a [`Deployment`](trellis_core::Deployment)
//! in-process, running the same handler chains a live server would, and the
//! [`assertions`] module checks the resulting responses.
//!
//! ```
//! use trellis_core::{Deployment, Reply, RouteSpec};
//! use trellis_testing::{TestClient, assert_status};
//!
//! # tokio_test::block_on(async {
//! let deployment = Deployment::builder()
//!     .route(RouteSpec::get("/ping", |_| async { Ok(Reply::text("pong")) }))
//!     .build()
//!     .unwrap();
//!
//! let client = TestClient::new(deployment);
//! let response = client.get("/ping").await;
//! assert_status(&response, 200);
//! assert_eq!(response.body_string(), "pong");
//! # });
//! ```

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::{TestClient, TestRequest, TestResponse};
