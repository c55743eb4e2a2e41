//! Dispatcher: the sole reader of a connection's socket. It demultiplexes
//! inbound frames into a request queue and a response queue so the main
//! loop (serving requests) and `command_request` callers (awaiting
//! responses) never contend over the read half.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gpcp_protocol::{receive_frame, PacketType};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// An inbound frame handed to the main loop or a `command_request` waiter.
/// `None` is the shutdown sentinel pushed to both queues on peer close or
/// a forced stop — generalizing the distilled spec's Python-`None`
/// sentinel without a separate terminal enum variant.
pub type Inbound = Option<(Vec<u8>, PacketType)>;

/// Owns the read half and the loop that empties it. Dropping the returned
/// `JoinHandle` does not stop the task — call [`Dispatcher::stop`].
pub struct Dispatcher {
    stopped: Arc<AtomicBool>,
    request_tx: UnboundedSender<Inbound>,
    response_tx: UnboundedSender<Inbound>,
}

impl Dispatcher {
    /// Spawn the read loop. Returns the handle used to signal stop, the
    /// two receivers the endpoint consumes, and the task's `JoinHandle`.
    pub fn spawn(
        read_half: OwnedReadHalf,
        poll_interval: Duration,
    ) -> (
        Self,
        UnboundedReceiver<Inbound>,
        UnboundedReceiver<Inbound>,
        JoinHandle<()>,
    ) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let task_stopped = stopped.clone();
        let task_request_tx = request_tx.clone();
        let task_response_tx = response_tx.clone();
        let handle = tokio::spawn(async move {
            run(read_half, poll_interval, task_stopped, task_request_tx, task_response_tx).await;
        });

        (
            Self {
                stopped,
                request_tx,
                response_tx,
            },
            request_rx,
            response_rx,
            handle,
        )
    }

    /// Signal the read loop to stop and wake anything blocked waiting on
    /// either queue. The loop itself notices `stopped` on its next timeout
    /// tick; the sentinel guarantees waiters do not have to wait for that.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.request_tx.send(None);
        let _ = self.response_tx.send(None);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

async fn run(
    mut read_half: OwnedReadHalf,
    poll_interval: Duration,
    stopped: Arc<AtomicBool>,
    request_tx: UnboundedSender<Inbound>,
    response_tx: UnboundedSender<Inbound>,
) {
    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let frame = match tokio::time::timeout(poll_interval, receive_frame(&mut read_half)).await
        {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!("peer closed the connection");
                break;
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "frame decode error, closing connection");
                break;
            }
            Err(_elapsed) => continue,
        };

        match frame.1 {
            PacketType::KeepAlive => continue,
            PacketType::Request => {
                let _ = request_tx.send(Some(frame));
            }
            PacketType::Response | PacketType::Error => {
                let _ = response_tx.send(Some(frame));
            }
            PacketType::ConnShutdown => {
                tracing::info!("peer sent CONN_SHUTDOWN");
                break;
            }
            PacketType::Push => {
                tracing::debug!(len = frame.0.len(), "discarding PUSH frame (unimplemented)");
            }
        }
    }

    stopped.store(true, Ordering::SeqCst);
    let _ = request_tx.send(None);
    let _ = response_tx.send(None);
}
