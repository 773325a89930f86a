// Core library for the Trellis REST framework
// Route matching, content negotiation and the handler-chain executor that
// runs every request, plus the HTTP/1.1 server in front of them.

pub mod chain;
pub mod context;
pub mod deployment;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod exception;
pub mod extensions;
pub mod filter;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod media_type;
pub mod path;
pub mod route;
pub mod route_table;
pub mod server;
pub mod status;

// Re-export commonly used types
pub use chain::{Chain, Disconnect, DisconnectHandle, Flow, RestHandler, Resume, Suspension};
pub use context::{ChainState, RequestContext};
pub use deployment::{Deployment, DeploymentBuilder};
pub use endpoint::{BlockingEndpoint, Endpoint, FnEndpoint, Invocation};
pub use entity::{Entity, EntityWriter, EntityWriters, Reply};
pub use error::*;
pub use exception::{default_reply, ExceptionMapper};
pub use extensions::Extensions;
pub use filter::{FilterOutcome, FilterPhase, RequestFilter, ResponseFilter};
pub use http::*;
pub use media_type::{Accept, MediaType};
pub use path::{PathParams, PathTemplate};
pub use route::{Resource, Route, RouteSpec};
pub use route_table::{Resolution, RouteMatch, RouteTable};
pub use server::Server;
pub use status::*;
pub use trellis_config::ServerConfig;
