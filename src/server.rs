//! Server facade: binds a listening socket and accepts connections,
//! constructing one [`Endpoint`] and one freshly-built state value `S` per
//! accepted socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;

use crate::endpoint::{Endpoint, EndpointConfig};
use crate::error::{Error, Result};
use crate::handler::{ConnectionLifecycle, StateFactory};
use crate::registry::HandlerRegistry;
use crate::role::Role;

/// Construction-time configuration, validated in [`Server::bind`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    /// Whether to set `SO_REUSEADDR` on the listening socket before
    /// binding, so a restarted server can rebind a port still lingering
    /// in `TIME_WAIT`.
    pub reuse_addr: bool,
    pub accept_timeout: Duration,
    pub endpoint: EndpointConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            backlog: 128,
            reuse_addr: true,
            accept_timeout: Duration::from_millis(250),
            endpoint: EndpointConfig::default(),
        }
    }
}

/// Build a listening socket with the requested `SO_REUSEADDR` and backlog
/// settings applied before `listen()`, using `tokio::net::TcpSocket`
/// directly rather than binding through `TcpListener::bind` (which offers
/// no hook for either).
fn bind_listener(addr: std::net::SocketAddr, backlog: u32, reuse_addr: bool) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(reuse_addr)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// A running (or stopped) listener plus the endpoints it has accepted.
pub struct Server<S> {
    listener: TcpListener,
    role: Role,
    registry: Arc<HandlerRegistry<S>>,
    state_factory: StateFactory<S>,
    config: ServerConfig,
    endpoints: Mutex<Vec<Arc<Endpoint<S>>>>,
    stopped: AtomicBool,
}

impl<S: Send + Sync + ConnectionLifecycle + 'static> Server<S> {
    /// Bind the listening socket. Fails with `Error::Configuration` on a
    /// bad host/port or if the socket cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        role: Role,
        registry: Arc<HandlerRegistry<S>>,
        state_factory: StateFactory<S>,
    ) -> Result<Self> {
        let addr_str = format!("{}:{}", config.host, config.port);
        let addr: std::net::SocketAddr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::Configuration(format!("failed to resolve {addr_str}: {e}")))?
            .next()
            .ok_or_else(|| Error::Configuration(format!("no addresses resolved for {addr_str}")))?;

        let listener = bind_listener(addr, config.backlog, config.reuse_addr)
            .map_err(|e| Error::Configuration(format!("failed to bind {addr_str}: {e}")))?;

        Ok(Self {
            listener,
            role,
            registry,
            state_factory,
            config,
            endpoints: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept-loop with a short per-iteration timeout, so [`Server::stop`]
    /// (setting the stop flag from another task) is noticed promptly
    /// instead of blocking forever in `accept()`.
    pub async fn run(&self) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let accepted =
                tokio::time::timeout(self.config.accept_timeout, self.listener.accept()).await;

            let (stream, peer_addr) = match accepted {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
                Err(_elapsed) => {
                    self.prune_stopped_endpoints().await;
                    continue;
                }
            };

            tracing::info!(%peer_addr, "accepted connection");
            let state = Arc::new((self.state_factory)());
            match Endpoint::negotiate(
                stream,
                self.role,
                self.registry.clone(),
                state,
                self.config.endpoint,
            )
            .await
            {
                Ok(endpoint) => self.endpoints.lock().await.push(endpoint),
                Err(err) => tracing::warn!(%peer_addr, error = %err, "negotiation failed"),
            }

            self.prune_stopped_endpoints().await;
        }
    }

    async fn prune_stopped_endpoints(&self) {
        let mut endpoints = self.endpoints.lock().await;
        endpoints.retain(|e| !e.is_closed());
    }

    /// Close every live endpoint, then mark the accept loop to stop on its
    /// next iteration. Does not close the listening socket itself — it is
    /// dropped along with `self`.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let endpoints: Vec<_> = self.endpoints.lock().await.drain(..).collect();
        for endpoint in endpoints {
            endpoint.close(false).await;
        }
    }
}
