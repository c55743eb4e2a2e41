//! Client facade: opens an outgoing connection and wraps it with
//! [`Endpoint::negotiate`].

use std::sync::Arc;

use tokio::net::TcpStream;

use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{Error, Result};
use crate::handler::ConnectionLifecycle;
use crate::registry::HandlerRegistry;
use crate::role::Role;

/// Construction-time configuration for an outgoing connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: EndpointConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            endpoint: EndpointConfig::default(),
        }
    }
}

/// Connect to a server and negotiate roles.
pub async fn connect<S: Send + Sync + ConnectionLifecycle + 'static>(
    config: ClientConfig,
    role: Role,
    registry: Arc<HandlerRegistry<S>>,
    state: Arc<S>,
) -> Result<Arc<Endpoint<S>>> {
    let addr = format!("{}:{}", config.host, config.port);
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Configuration(format!("failed to connect to {addr}: {e}")))?;

    Endpoint::negotiate(stream, role, registry, state, config.endpoint).await
}
