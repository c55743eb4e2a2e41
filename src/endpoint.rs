//! The endpoint state machine: role negotiation, the request-serving main
//! loop, and outbound `command_request` calls, all multiplexed over one
//! socket with the [`crate::dispatcher::Dispatcher`] as the sole reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gpcp_protocol::{decode_request, decode_response, encode_request, send_frame, PacketType};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::dispatcher::{Dispatcher, Inbound};
use crate::error::{Error, Result};
use crate::handler::ConnectionLifecycle;
use crate::registry::HandlerRegistry;
use crate::role::{self, negotiate, NegotiatedRoles, Role};

/// How long the main loop and dispatcher each wait on their queue before
/// re-checking the stop flag. Exposed so tests can tighten it.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// One declared argument of a command in a peer's `requestCommands` schema.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: u8,
}

/// One schema entry as reported by a peer's `requestCommands`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteCommand {
    pub name: String,
    pub arguments: Vec<RemoteArgument>,
    pub return_type: u8,
    pub description: Option<String>,
}

/// The typed-proxy replacement for the distilled spec's dynamic
/// `loadInterface`: a snapshot of the peer's schema plus a `call` method,
/// since Rust endpoints cannot grow methods named after remote commands
/// at runtime.
pub struct RemoteInterface<'a, S> {
    pub commands: Vec<RemoteCommand>,
    endpoint: &'a Endpoint<S>,
}

impl<'a, S: Send + Sync + 'static> RemoteInterface<'a, S> {
    /// Serialize `args` through the declared argument descriptors, issue
    /// the request, then deserialize the result through the declared
    /// return descriptor — the typed-proxy form of `endpoint.py`'s
    /// `argumentTypes[i].serialize(arg)` / `returnType.deserialize(...)`.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let command = self.commands.iter().find(|c| c.name == name).ok_or_else(|| {
            Error::UnmetPrecondition(format!("'{name}' is not in the loaded remote interface"))
        })?;

        let mut serialized = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let value = match command.arguments.get(i) {
                Some(spec) => {
                    let descriptor = gpcp_protocol::from_id(gpcp_protocol::TypeId(spec.type_id))?;
                    descriptor.serialize(&arg)?
                }
                None => arg,
            };
            serialized.push(value);
        }

        let raw = self.endpoint.command_request(name, serialized).await?;
        let return_descriptor = gpcp_protocol::from_id(gpcp_protocol::TypeId(command.return_type))?;
        return_descriptor.deserialize(&raw).map_err(Error::Protocol)
    }
}

/// One connection's negotiated state and running tasks.
pub struct Endpoint<S> {
    config: EndpointConfig,
    negotiated: NegotiatedRoles,
    locked: AtomicBool,
    registry: Arc<HandlerRegistry<S>>,
    state: Arc<S>,
    write_half: Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    request_lock: Mutex<()>,
    dispatcher: Dispatcher,
    response_rx: Mutex<UnboundedReceiver<Inbound>>,
    main_loop: Mutex<Option<JoinHandle<()>>>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: Send + Sync + ConnectionLifecycle + 'static> Endpoint<S> {
    /// Negotiate roles over `stream`, then spawn the dispatcher and main
    /// loop tasks. Returns only once both tasks have started, mirroring
    /// the distilled spec's synchronous-construction guarantee.
    pub async fn negotiate(
        stream: TcpStream,
        role: Role,
        registry: Arc<HandlerRegistry<S>>,
        state: Arc<S>,
        config: EndpointConfig,
    ) -> Result<Arc<Self>> {
        let _ = stream.set_nodelay(true);
        let (mut read_half, mut write_half) = stream.into_split();

        write_half.write_all(&role::encode_handshake(role)).await?;
        write_half.flush().await?;

        let mut header_probe = [0u8; 1024];
        let n = tokio::io::AsyncReadExt::read(&mut read_half, &mut header_probe).await?;
        if n == 0 {
            return Err(Error::PeerClosed);
        }
        let remote_role = role::decode_handshake(&header_probe[..n])?;

        let negotiated = negotiate(role, remote_role)?;

        let (dispatcher, request_rx, response_rx, dispatcher_handle) =
            Dispatcher::spawn(read_half, config.poll_interval);

        let write_half = Arc::new(Mutex::new(write_half));

        let endpoint = Arc::new(Self {
            config,
            negotiated,
            locked: AtomicBool::new(role == Role::Requester),
            registry,
            state,
            write_half,
            request_lock: Mutex::new(()),
            dispatcher,
            response_rx: Mutex::new(response_rx),
            main_loop: Mutex::new(None),
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
            closed: AtomicBool::new(false),
        });

        let main_loop_endpoint = endpoint.clone();
        let handle = tokio::spawn(async move {
            main_loop_endpoint.run_main_loop(request_rx).await;
        });
        *endpoint.main_loop.lock().await = Some(handle);

        Ok(endpoint)
    }

    /// Whether this endpoint will ever accept a command from the peer.
    pub fn may_serve(&self) -> bool {
        self.negotiated.may_serve
    }

    /// Whether this endpoint will ever issue a command to the peer.
    pub fn may_request(&self) -> bool {
        self.negotiated.may_request
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn run_main_loop(self: Arc<Self>, mut request_rx: UnboundedReceiver<Inbound>) {
        loop {
            let next = tokio::time::timeout(self.config.poll_interval, request_rx.recv()).await;
            let frame = match next {
                Ok(Some(Some(frame))) => frame,
                Ok(Some(None)) | Ok(None) => break,
                Err(_elapsed) => {
                    if self.is_closed() {
                        break;
                    }
                    continue;
                }
            };

            let (body, _packet_type) = frame;
            let (name, args) = match decode_request(&body) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(error = %err, "malformed request payload, ignoring");
                    continue;
                }
            };

            let locked = self.locked.load(Ordering::SeqCst);
            let response = match self
                .registry
                .dispatch(self.state.clone(), locked, &name, args)
                .await
            {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(command = %name, error = %err, "command handler failed");
                    serde_json::to_vec(&format!("error: {err}")).unwrap_or_default()
                }
            };

            let mut write_half = self.write_half.lock().await;
            if let Err(err) = send_frame(&mut *write_half, &response, PacketType::Response).await {
                tracing::warn!(error = %err, "failed to send response, closing");
                break;
            }
        }

        self.clone().close(true).await;
    }

    /// Issue `name(args)` to the peer and await its response. Outbound
    /// calls on one endpoint are serialized through `request_lock` because
    /// the wire format carries no correlation id — see the design note on
    /// this in the project documentation.
    pub async fn command_request(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if !self.negotiated.may_request {
            return Err(Error::UnmetPrecondition(
                "this endpoint did not negotiate permission to issue requests".to_string(),
            ));
        }

        let _guard = self.request_lock.lock().await;

        let body = encode_request(name, &args);
        {
            let mut write_half = self.write_half.lock().await;
            send_frame(&mut *write_half, &body, PacketType::Request).await?;
        }

        let mut response_rx = self.response_rx.lock().await;
        let frame = tokio::time::timeout(self.config.request_timeout, response_rx.recv())
            .await
            .map_err(|_| Error::Timeout(format!("waiting for response to {name}")))?;

        match frame {
            Some(Some((body, _packet_type))) => decode_response(&body).map_err(Error::Protocol),
            _ => Err(Error::PeerClosed),
        }
    }

    /// Fetch the peer's command schema and return a typed proxy over it.
    pub async fn load_interface(&self) -> Result<RemoteInterface<'_, S>> {
        let raw = self.command_request("requestCommands", vec![]).await?;
        let commands: Vec<RemoteCommand> = serde_json::from_value(raw)
            .map_err(|e| Error::Protocol(gpcp_protocol::ProtocolError::Json(e)))?;
        Ok(RemoteInterface {
            commands,
            endpoint: self,
        })
    }

    /// Idempotently tear the endpoint down. `from_main_loop` tracks which
    /// task is calling, so `close` never awaits its own caller's
    /// `JoinHandle`.
    pub async fn close(self: Arc<Self>, from_main_loop: bool) {
        self.close_with_mode(from_main_loop, CloseMode::Both).await;
    }

    /// Like [`Endpoint::close`], but lets the caller choose which half of
    /// the socket actually gets an OS-level shutdown (distilled spec
    /// §4.6's "read, write, or read+write per caller choice").
    ///
    /// The read half is owned exclusively by the dispatcher task and is
    /// dropped when that task exits, so `CloseMode::Read` stops the
    /// dispatcher (it reads no further frames) without issuing a
    /// half-close on the wire; tokio's split `TcpStream` halves expose no
    /// safe way to shut down only the read side of the underlying socket.
    /// `CloseMode::Write`/`Both` issue a real FIN on the write half.
    pub async fn close_with_mode(self: Arc<Self>, from_main_loop: bool, mode: CloseMode) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.dispatcher.stop();
        if let Some(handle) = self.dispatcher_handle.lock().await.take() {
            let _ = handle.await;
        }
        if !from_main_loop {
            if let Some(handle) = self.main_loop.lock().await.take() {
                let _ = handle.await;
            }
        }

        let mut write_half = self.write_half.lock().await;
        if let Some(final_message) = self.state.on_disconnected() {
            let _ = send_frame(&mut *write_half, &final_message, PacketType::Response).await;
        }
        if matches!(mode, CloseMode::Write | CloseMode::Both) {
            let _ = write_half.shutdown().await;
        }
    }
}

/// Which half of the socket [`Endpoint::close_with_mode`] shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    Read,
    Write,
    Both,
}
