//! Collaborators injected into a `Dispatcher`.
//!
//! `ErrorHook` and `MissHook` take over the response for failed handlers and
//! unknown methods. An `Observer` is notified at each pipeline stage; the
//! default `LogObserver` writes through the `log` facade.

use log::{debug, error, info, warn};

use crate::error::{DeserializeError, HandlerError};
use crate::protocol::{MethodCall, MethodResponse};

/// Replaces the default `-32500` fault when a handler fails.
pub trait ErrorHook<C>: Send + Sync {
    fn on_error(&self, error: &HandlerError, call: &MethodCall, context: &C) -> MethodResponse;
}

impl<C, F> ErrorHook<C> for F
where
    F: Fn(&HandlerError, &MethodCall, &C) -> MethodResponse + Send + Sync,
{
    fn on_error(&self, error: &HandlerError, call: &MethodCall, context: &C) -> MethodResponse {
        self(error, call, context)
    }
}

/// Replaces the default `-32601` fault when no handler matches.
pub trait MissHook<C>: Send + Sync {
    fn on_miss(&self, call: &MethodCall, context: &C) -> MethodResponse;
}

impl<C, F> MissHook<C> for F
where
    F: Fn(&MethodCall, &C) -> MethodResponse + Send + Sync,
{
    fn on_miss(&self, call: &MethodCall, context: &C) -> MethodResponse {
        self(call, context)
    }
}

pub trait Observer: Send + Sync {
    fn deserialize_error(&self, _error: &DeserializeError) {}

    fn incoming_request(&self, _call: &MethodCall) {}

    /// Called once for a failed handler when no `ErrorHook` is set.
    fn request_error(&self, _call: &MethodCall, _error: &HandlerError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn deserialize_error(&self, error: &DeserializeError) {
        warn!("failed to deserialize method call from body: {}", error);
    }

    fn incoming_request(&self, call: &MethodCall) {
        info!("calling method '{}' with {} params", call.method_name, call.params.len());
        debug!("params of '{}': {:?}", call.method_name, call.params);
    }

    fn request_error(&self, call: &MethodCall, error: &HandlerError) {
        error!("error calling method '{}': {}", call.method_name, error);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
