//! gpcp: a generic, bidirectional, command-oriented RPC system over TCP.
//!
//! A process acts as one or both of two endpoint roles — requester
//! (issues commands) and responder (serves commands through a declarative
//! handler registry) — on a shared framed transport. The wire framing and
//! type registry live in the [`gpcp_protocol`] crate this one depends on;
//! this crate builds the dispatcher, handler registry, endpoint state
//! machine, and the server/client facades on top of it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gpcp::{HandlerBuilder, Role, Server, ServerConfig, ArgumentSpec};
//! use gpcp::handler::ConnectionLifecycle;
//! use gpcp_protocol::TypeId;
//! use serde_json::json;
//!
//! struct ConnState;
//! impl ConnectionLifecycle for ConnState {}
//!
//! #[tokio::main]
//! async fn main() -> gpcp::Result<()> {
//!     let registry = HandlerBuilder::<ConnState>::new()
//!         .command(
//!             "echo",
//!             Some("echoes its argument, uppercased"),
//!             vec![ArgumentSpec::new("text", TypeId(3))],
//!             TypeId(3),
//!             |_state, args| async move {
//!                 let text = args[0].as_str().unwrap_or_default().to_uppercase();
//!                 Ok(json!(text))
//!             },
//!         )
//!         .build()?;
//!
//!     let server = Server::bind(
//!         ServerConfig::default(),
//!         Role::Responder,
//!         registry,
//!         gpcp::handler::factory(|| ConnState),
//!     )
//!     .await?;
//!
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod registry;
pub mod role;
pub mod server;

pub use client::{connect, ClientConfig};
pub use endpoint::{CloseMode, Endpoint, EndpointConfig, RemoteArgument, RemoteCommand, RemoteInterface};
pub use error::{Error, Result};
pub use handler::{factory, ConnectionLifecycle, StateFactory};
pub use registry::{ArgumentSpec, CommandEntry, HandlerBuilder, HandlerRegistry, ENDPOINT_NOT_STARTED};
pub use role::{negotiate, NegotiatedRoles, Role};
pub use server::{Server, ServerConfig};

pub use gpcp_protocol;
