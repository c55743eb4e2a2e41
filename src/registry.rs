//! Handler registry: the explicit builder API this port uses in place of
//! the distilled spec's reflection/decorator-based command discovery (Rust
//! has no runtime introspection over methods, so registration is explicit
//! and validated at `build()` time instead of at class-definition time).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gpcp_protocol::TypeId;
use serde_json::Value;

use crate::error::{Error, Result};

/// Command names the registry itself reserves. `requestCommands` is
/// installed automatically by [`HandlerBuilder::build`]; a caller
/// registering it by hand is a `HandlerLoading` error.
const RESERVED_WORDS: &[&str] = &["requestCommands"];

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One declared argument of a registered command: its name (for
/// `requestCommands` introspection) and the wire type it is decoded
/// through.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub type_id: TypeId,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
        }
    }
}

/// A boxed, type-erased async command handler bound to connection state `S`.
pub trait CommandHandler<S>: Send + Sync {
    fn call(&self, state: Arc<S>, args: Vec<Value>) -> BoxFuture<Result<Value>>;
}

impl<S, F, Fut> CommandHandler<S> for F
where
    F: Fn(Arc<S>, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, state: Arc<S>, args: Vec<Value>) -> BoxFuture<Result<Value>> {
        Box::pin(self(state, args))
    }
}

/// A boxed, type-erased fallback invoked for names the registry does not
/// recognize. Its return is already raw response bytes — the registry does
/// not re-encode it, matching the distilled spec's requirement that an
/// unknown-command handler itself be responsible for wire-safe output.
pub trait UnknownCommandHandler<S>: Send + Sync {
    fn call(&self, state: Arc<S>, name: String, args: Vec<Value>) -> BoxFuture<Result<Vec<u8>>>;
}

impl<S, F, Fut> UnknownCommandHandler<S> for F
where
    F: Fn(Arc<S>, String, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    fn call(&self, state: Arc<S>, name: String, args: Vec<Value>) -> BoxFuture<Result<Vec<u8>>> {
        Box::pin(self(state, name, args))
    }
}

/// One registered command: its schema plus the handler invoked for it.
pub struct CommandEntry<S> {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<ArgumentSpec>,
    pub return_type: TypeId,
    handler: Arc<dyn CommandHandler<S>>,
}

/// Accumulates `CommandEntry`s and at most one unknown-command fallback,
/// then validates and freezes them into a [`HandlerRegistry`].
pub struct HandlerBuilder<S> {
    commands: HashMap<String, CommandEntry<S>>,
    duplicate_names: Vec<String>,
    unknown: Option<Arc<dyn UnknownCommandHandler<S>>>,
    unknown_registered_twice: bool,
}

impl<S> Default for HandlerBuilder<S> {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            duplicate_names: Vec::new(),
            unknown: None,
            unknown_registered_twice: false,
        }
    }
}

impl<S: Send + Sync + 'static> HandlerBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Fails at [`build`](Self::build) time, not here,
    /// if `name` is malformed or already taken — `command` itself only
    /// records the entry so registration order never matters.
    pub fn command<H, Fut>(
        mut self,
        name: impl Into<String>,
        description: Option<&str>,
        arguments: Vec<ArgumentSpec>,
        return_type: TypeId,
        handler: H,
    ) -> Self
    where
        H: Fn(Arc<S>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        if self.commands.contains_key(&name) {
            // Flagged as a build-time HandlerLoadingError below, same as
            // the reserved-word and duplicate-unknown-command checks, so
            // `command` stays infallible until `build()`.
            self.duplicate_names.push(name.clone());
        }
        self.commands.insert(
            name.clone(),
            CommandEntry {
                name,
                description: description.map(str::to_string),
                arguments,
                return_type,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Register the fallback invoked for names not otherwise registered.
    /// At most one may be set; a second call replaces the schema the
    /// builder has recorded so far and is rejected at `build()` time.
    pub fn unknown_command<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(Arc<S>, String, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        if self.unknown.is_some() {
            // Flagged as a build-time error below rather than panicking
            // here, so `HandlerBuilder` stays infallible until `build()`.
            self.unknown_registered_twice = true;
        }
        self.unknown = Some(Arc::new(handler));
        self
    }

    /// Validate every registered name and freeze the registry.
    pub fn build(self) -> Result<Arc<HandlerRegistry<S>>> {
        if self.unknown_registered_twice {
            return Err(Error::HandlerLoading(
                "at most one unknown-command handler may be registered".to_string(),
            ));
        }
        if let Some(name) = self.duplicate_names.first() {
            return Err(Error::HandlerLoading(format!(
                "command '{name}' is already registered"
            )));
        }

        let mut commands = self.commands;
        for name in commands.keys() {
            validate_identifier(name)?;
        }

        // `requestCommands` must list itself, the way the original's
        // `@command`-decorated `requestCommands` method registers into
        // the same `commandFunctions` table it then iterates. Insert a
        // placeholder first so the schema computed from `commands`
        // includes its own entry, then replace it with the real handler
        // closing over that now-complete schema.
        commands.insert(
            "requestCommands".to_string(),
            request_commands_placeholder(),
        );
        let schema = command_schema(&commands);
        commands.insert("requestCommands".to_string(), request_commands_entry(schema));

        Ok(Arc::new(HandlerRegistry {
            commands,
            unknown: self.unknown,
        }))
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !first_ok || !rest_ok {
        return Err(Error::Annotation(format!(
            "'{name}' is not a valid command identifier"
        )));
    }
    if RESERVED_WORDS.contains(&name) {
        return Err(Error::HandlerLoading(format!(
            "'{name}' is reserved and installed automatically"
        )));
    }
    Ok(())
}

/// Build the `requestCommands` introspection payload from every entry
/// currently in `commands` — including `requestCommands` itself, once a
/// placeholder for it has been inserted.
fn command_schema<S>(commands: &HashMap<String, CommandEntry<S>>) -> Value {
    let schema: Vec<Value> = commands
        .values()
        .map(|entry| {
            serde_json::json!({
                "name": entry.name,
                "arguments": entry.arguments.iter().map(|a| serde_json::json!({
                    "name": a.name,
                    "type": a.type_id.0,
                })).collect::<Vec<_>>(),
                "return_type": entry.return_type.0,
                "description": entry.description,
            })
        })
        .collect();
    Value::Array(schema)
}

/// A `requestCommands` entry with correct metadata but a handler that is
/// never called — inserted only so [`command_schema`] sees its own
/// name/description/arguments/return type before the real handler exists.
fn request_commands_placeholder<S: Send + Sync + 'static>() -> CommandEntry<S> {
    CommandEntry {
        name: "requestCommands".to_string(),
        description: Some("Lists every command this endpoint serves.".to_string()),
        arguments: Vec::new(),
        return_type: TypeId(2), // JsonArray
        handler: Arc::new(|_state: Arc<S>, _args: Vec<Value>| async { Ok(Value::Array(Vec::new())) }),
    }
}

fn request_commands_entry<S: Send + Sync + 'static>(schema: Value) -> CommandEntry<S> {
    CommandEntry {
        name: "requestCommands".to_string(),
        description: Some("Lists every command this endpoint serves.".to_string()),
        arguments: Vec::new(),
        return_type: TypeId(2), // JsonArray
        handler: Arc::new(move |_state: Arc<S>, _args: Vec<Value>| {
            let schema = schema.clone();
            async move { Ok(schema) }
        }),
    }
}

/// The immutable, validated command table produced by
/// [`HandlerBuilder::build`]. Shared read-only between every endpoint
/// serving connections of the same handler type.
pub struct HandlerRegistry<S> {
    commands: HashMap<String, CommandEntry<S>>,
    unknown: Option<Arc<dyn UnknownCommandHandler<S>>>,
}

/// Distinguished response returned instead of running any command when
/// the local handler is locked (role A — requester only). Matches the
/// distilled spec's literal string.
pub const ENDPOINT_NOT_STARTED: &str = "ENDPOINT NOT STARTED TO THIS SCOPE";

impl<S: Send + Sync + 'static> HandlerRegistry<S> {
    /// Look up a command's schema, e.g. to validate caller-supplied
    /// arguments against its declared descriptors before invoking it.
    pub fn entry(&self, name: &str) -> Option<&CommandEntry<S>> {
        self.commands.get(name)
    }

    /// Run `name(args)` against `state` and return the JSON-encoded
    /// response body. `locked` is read once per call (it only ever
    /// transitions false→true during negotiation, never back).
    pub async fn dispatch(
        &self,
        state: Arc<S>,
        locked: bool,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Vec<u8>> {
        if locked {
            tracing::warn!(command = name, "request received on a locked (requester-only) endpoint");
            return Ok(serde_json::to_vec(ENDPOINT_NOT_STARTED)?);
        }

        match self.commands.get(name) {
            Some(entry) => {
                let mut deserialized = Vec::with_capacity(args.len());
                for (i, raw) in args.into_iter().enumerate() {
                    match entry.arguments.get(i) {
                        Some(spec) => {
                            let descriptor = gpcp_protocol::from_id(spec.type_id)?;
                            deserialized.push(descriptor.deserialize(&raw)?);
                        }
                        None => deserialized.push(raw),
                    }
                }

                let result = entry.handler.call(state, deserialized).await?;
                let descriptor = gpcp_protocol::from_id(entry.return_type)?;
                let serialized = descriptor.serialize(&result)?;
                Ok(serde_json::to_vec(&serialized)?)
            }
            None => match &self.unknown {
                Some(fallback) => fallback.call(state, name.to_string(), args).await,
                None => {
                    tracing::warn!(command = name, "no handler and no unknown-command fallback");
                    Ok(Vec::new())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoState;

    #[tokio::test]
    async fn build_rejects_invalid_identifier() {
        let result = HandlerBuilder::<NoState>::new()
            .command("9bad", None, vec![], TypeId(3), |_s, _a| async { Ok(json!(null)) })
            .build();
        assert!(matches!(result, Err(Error::Annotation(_))));
    }

    #[tokio::test]
    async fn build_rejects_duplicate_command_name() {
        let result = HandlerBuilder::<NoState>::new()
            .command("dup", None, vec![], TypeId(3), |_s, _a| async { Ok(json!("first")) })
            .command("dup", None, vec![], TypeId(3), |_s, _a| async { Ok(json!("second")) })
            .build();
        assert!(matches!(result, Err(Error::HandlerLoading(_))));
    }

    #[tokio::test]
    async fn build_rejects_reserved_request_commands() {
        let result = HandlerBuilder::<NoState>::new()
            .command("requestCommands", None, vec![], TypeId(2), |_s, _a| async {
                Ok(json!([]))
            })
            .build();
        assert!(matches!(result, Err(Error::HandlerLoading(_))));
    }

    #[tokio::test]
    async fn echo_command_dispatches() {
        let registry = HandlerBuilder::<NoState>::new()
            .command(
                "echo",
                Some("echoes its argument"),
                vec![ArgumentSpec::new("text", TypeId(3))],
                TypeId(3),
                |_s, args| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) },
            )
            .build()
            .unwrap();

        let state = Arc::new(NoState);
        let body = registry
            .dispatch(state, false, "echo", vec![json!("hi")])
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!("hi"));
    }

    #[tokio::test]
    async fn locked_handler_returns_distinguished_string() {
        let registry = HandlerBuilder::<NoState>::new().build().unwrap();
        let state = Arc::new(NoState);
        let body = registry
            .dispatch(state, true, "anything", vec![])
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!(ENDPOINT_NOT_STARTED));
    }

    #[tokio::test]
    async fn unknown_command_without_fallback_is_empty() {
        let registry = HandlerBuilder::<NoState>::new().build().unwrap();
        let state = Arc::new(NoState);
        let body = registry
            .dispatch(state, false, "nope", vec![])
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_uses_fallback() {
        let registry = HandlerBuilder::<NoState>::new()
            .unknown_command(|_s, name, _args| async move {
                Ok(format!("no such command: {name}").into_bytes())
            })
            .build()
            .unwrap();
        let state = Arc::new(NoState);
        let body = registry
            .dispatch(state, false, "nope", vec![])
            .await
            .unwrap();
        assert_eq!(body, b"no such command: nope");
    }

    #[tokio::test]
    async fn request_commands_lists_registered_commands() {
        let registry = HandlerBuilder::<NoState>::new()
            .command(
                "echo",
                Some("echoes"),
                vec![ArgumentSpec::new("text", TypeId(3))],
                TypeId(3),
                |_s, args| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) },
            )
            .build()
            .unwrap();
        let state = Arc::new(NoState);
        let body = registry
            .dispatch(state, false, "requestCommands", vec![])
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        let entries = value.as_array().unwrap();
        assert!(entries.iter().any(|e| e["name"] == "echo"));
        assert!(entries.iter().any(|e| e["name"] == "requestCommands"));
    }

    #[tokio::test]
    async fn bytes_argument_is_deserialized_from_base64_before_the_handler_runs() {
        let registry = HandlerBuilder::<NoState>::new()
            .command(
                "first_byte",
                None,
                vec![ArgumentSpec::new("data", TypeId(7))],
                TypeId(5),
                |_s, args| async move {
                    let bytes = args[0].as_array().expect("handler receives a decoded byte array");
                    Ok(json!(bytes[0].as_u64().unwrap_or(0)))
                },
            )
            .build()
            .unwrap();

        let state = Arc::new(NoState);
        use base64::Engine;
        let wire_arg = json!(base64::engine::general_purpose::STANDARD.encode([0xAB, 0xCD]));
        let body = registry
            .dispatch(state, false, "first_byte", vec![wire_arg])
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!(0xAB));
    }
}
