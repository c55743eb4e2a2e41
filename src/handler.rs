//! Convenience constructors for per-connection handler state.
//!
//! The distilled spec's handler classes carry both the command table and
//! arbitrary per-connection fields (`onDisconnected`, a final message to
//! send at close). This port splits those: the command table lives in
//! [`crate::registry::HandlerRegistry`] (shared, immutable, built once),
//! while per-connection state is the user's own `S`, constructed fresh for
//! every accepted/connected socket by a `handler_factory` closure.

use std::sync::Arc;

/// Produces one fresh `S` per connection. Kept as a type alias so
/// `Server`/`Client` signatures read the same way the distilled spec
/// describes "a freshly instantiated handler" per accepted socket.
pub type StateFactory<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// Wrap a plain factory function into a [`StateFactory`].
pub fn factory<S, F>(f: F) -> StateFactory<S>
where
    F: Fn() -> S + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-connection teardown hook, matching the distilled spec's handler
/// classes carrying an `onDisconnected` method and an optional final
/// message sent to the peer as the connection closes. Implement this for
/// connection state `S` that needs to react to disconnection; the default
/// does nothing and sends no final message.
pub trait ConnectionLifecycle {
    /// Called once, after the dispatcher and main loop have both stopped
    /// but before the socket is shut down. Returning `Some(bytes)` sends
    /// one best-effort final RESPONSE frame carrying `bytes` to the peer.
    fn on_disconnected(&self) -> Option<Vec<u8>> {
        None
    }
}
