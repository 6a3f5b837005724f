//! Shared building blocks for the Nagios MCP server.
//!
//! Everything here is transport-free: turning validated tool parameters into
//! CGI queries, and turning CGI JSON documents back into tool payloads.

pub mod config;
pub mod error;
pub mod normalize;
pub mod params;
pub mod query;

pub use config::{ConfigError, ConnectionConfig, ConnectionSettings, Credentials};
pub use error::{ErrorPayload, NagiosError};
pub use params::{ParamKind, ParamSpec, ToolArgs};
pub use query::{Endpoint, UpstreamQuery};
