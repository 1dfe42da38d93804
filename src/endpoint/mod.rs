//! Endpoint configuration and transport.
//!
//! [`EndpointConfig`] describes how to reach a Substreams provider
//! (address, TLS, credentials, extra headers). [`GrpcConnector`] turns it
//! into one `Blocks` stream per session; the [`BlockStreamConnector`] seam
//! lets tests and alternative transports slot in.

mod auth;
mod config;
mod connector;

pub use auth::{Authenticator, AuthKind, DEFAULT_API_KEY_ENV_VAR, DEFAULT_API_TOKEN_ENV_VAR};
pub use config::EndpointConfig;
pub use connector::{BlockStreamConnector, GrpcConnector, ResponseStream};
