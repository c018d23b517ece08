//! Method registry and per-request dispatch.
//!
//! A request moves through `deserialize -> dispatch -> handle -> serialize`
//! and always ends in exactly one response document:
//!
//! | outcome                    | response                                   |
//! |----------------------------|--------------------------------------------|
//! | body fails to parse        | fault `-32700`                             |
//! | method not registered      | `MissHook`, else fault `-32601`            |
//! | handler returns a value    | success                                    |
//! | handler returns a `Fault`  | that fault                                 |
//! | handler fails or panics    | `ErrorHook`, else fault `-32500`           |
//!
//! # Example
//!
//! ```ignore
//! async fn echo(params: Vec<Value>, _ctx: Arc<()>) -> HandlerResult {
//!     Ok(params.into_iter().next().unwrap_or(Value::Nil))
//! }
//!
//! let mut registry = Registry::new();
//! registry.register("echo", echo)?;
//!
//! let dispatcher = Dispatcher::new(registry, ());
//! let body = dispatcher.handle(request_bytes).await;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::debug;

use crate::decoding::{self, DecodeOptions};
use crate::error::{HandlerError, RegistryError};
use crate::hooks::{ErrorHook, LogObserver, MissHook, Observer};
use crate::protocol::{MethodCall, MethodResponse, INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::value::Value;

/// Result type for handler functions.
pub type HandlerResult = Result<Value, HandlerError>;

/// A method implementation.
///
/// Handlers receive the call parameters and the dispatcher's shared context.
/// The context is handed out as a shared `Arc`; any interior mutability
/// inside it is synchronized by the application, not by the dispatcher.
pub trait Handler<C>: Send + Sync + 'static {
    fn call(&self, params: Vec<Value>, context: Arc<C>) -> BoxFuture<'static, HandlerResult>;
}

impl<C, F, Fut> Handler<C> for F
where
    C: Send + Sync + 'static,
    F: Fn(Vec<Value>, Arc<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: Vec<Value>, context: Arc<C>) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(params, context))
    }
}

/// Registry mapping method names to handlers.
pub struct Registry<C> {
    methods: HashMap<String, Box<dyn Handler<C>>>,
}

impl<C: Send + Sync + 'static> Registry<C> {
    pub fn new() -> Self {
        Registry {
            methods: HashMap::new(),
        }
    }

    /// Register a method handler. Names are unique; registering one twice
    /// is an error and leaves the first handler in place.
    pub fn register<H: Handler<C>>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.methods.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.methods.insert(name, Box::new(handler));
        Ok(self)
    }

    /// Builder form of [`Registry::register`].
    pub fn with_method<H: Handler<C>>(mut self, name: impl Into<String>, handler: H) -> Result<Self, RegistryError> {
        self.register(name, handler)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Handler<C>> {
        self.methods.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<C: Send + Sync + 'static> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds parsed calls to registered handlers. Read-only once built, so one
/// instance can serve any number of concurrent requests.
pub struct Dispatcher<C> {
    registry: Registry<C>,
    context: Arc<C>,
    on_error: Option<Box<dyn ErrorHook<C>>>,
    on_miss: Option<Box<dyn MissHook<C>>>,
    observer: Arc<dyn Observer>,
    options: DecodeOptions,
}

impl<C: Send + Sync + 'static> Dispatcher<C> {
    pub fn new(registry: Registry<C>, context: C) -> Self {
        Self::with_shared_context(registry, Arc::new(context))
    }

    pub fn with_shared_context(registry: Registry<C>, context: Arc<C>) -> Self {
        Dispatcher {
            registry,
            context,
            on_error: None,
            on_miss: None,
            observer: Arc::new(LogObserver),
            options: DecodeOptions::default(),
        }
    }

    pub fn on_error<H: ErrorHook<C> + 'static>(mut self, hook: H) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn on_miss<H: MissHook<C> + 'static>(mut self, hook: H) -> Self {
        self.on_miss = Some(Box::new(hook));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Runs the whole pipeline on a raw request body and returns the
    /// response document.
    pub async fn handle(&self, body: &[u8]) -> String {
        match decoding::parse_method_call(body, &self.options) {
            Ok(call) => self.dispatch(call).await.to_xml(),
            Err(error) => {
                self.observer.deserialize_error(&error);
                MethodResponse::fault(PARSE_ERROR, "parse error: not well formed").to_xml()
            }
        }
    }

    /// Invokes the handler for `call` and maps its outcome to a response.
    pub async fn dispatch(&self, call: MethodCall) -> MethodResponse {
        let handler = match self.registry.get(&call.method_name) {
            Some(handler) => handler,
            None => return self.miss(&call),
        };

        self.observer.incoming_request(&call);

        // handlers may panic while building their future, not only when polled
        let params = call.params.clone();
        let context = self.context.clone();
        let outcome = AssertUnwindSafe(async move { handler.call(params, context).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic))));

        let response = match outcome {
            Ok(value) => match value.validate() {
                Ok(()) => MethodResponse::Success(value),
                Err(e) => self.failed(&call, HandlerError::from(e)),
            },
            Err(HandlerError::Fault(fault)) => {
                debug!("method '{}' answered with {}", call.method_name, fault);
                MethodResponse::Fault(fault)
            }
            Err(error) => self.failed(&call, error),
        };
        self.checked(&call, response)
    }

    fn failed(&self, call: &MethodCall, error: HandlerError) -> MethodResponse {
        if let Some(ref hook) = self.on_error {
            return match panic::catch_unwind(AssertUnwindSafe(|| hook.on_error(&error, call, &self.context))) {
                Ok(response) => response,
                Err(panic) => {
                    self.observer
                        .request_error(call, &HandlerError::Panicked(panic_message(panic)));
                    internal_error(call)
                }
            };
        }
        self.observer.request_error(call, &error);
        internal_error(call)
    }

    fn miss(&self, call: &MethodCall) -> MethodResponse {
        let response = match self.on_miss {
            Some(ref hook) => match panic::catch_unwind(AssertUnwindSafe(|| hook.on_miss(call, &self.context))) {
                Ok(response) => response,
                Err(panic) => {
                    self.observer
                        .request_error(call, &HandlerError::Panicked(panic_message(panic)));
                    internal_error(call)
                }
            },
            None => MethodResponse::fault(
                METHOD_NOT_FOUND,
                format!("requested method '{}' not found", call.method_name),
            ),
        };
        self.checked(call, response)
    }

    /// Replaces a response that would not serialize to a well-formed
    /// document, so every request still gets one.
    fn checked(&self, call: &MethodCall, response: MethodResponse) -> MethodResponse {
        match response.validate() {
            Ok(()) => response,
            Err(e) => {
                self.observer.request_error(call, &HandlerError::from(e));
                MethodResponse::fault(INTERNAL_ERROR, "error serializing response")
            }
        }
    }
}

fn internal_error(call: &MethodCall) -> MethodResponse {
    MethodResponse::fault(
        INTERNAL_ERROR,
        format!("error calling method '{}'", call.method_name),
    )
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
