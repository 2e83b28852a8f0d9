//! Message routing between host capabilities and the guest runtime.
//!
//! Inbound, the dispatcher decodes a wire string, resolves a handler,
//! performs it, and replies or follows up as the message's synchronicity
//! and callback fields demand. Outbound, it offers one primitive
//! ([`Dispatcher::send`]) that every convenience call is a thin message
//! constructor over.
//!
//! No inbound input is ever fatal: a malformed or hostile string degrades
//! to a log line, plus an error-text reply when the caller is waiting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::handler::{FnHandler, Handler};
use crate::message::{
    normalize_numbers, FunctionRef, Message, GET_SELECTOR, RUNTIME_RECEIVER, SET_SELECTOR,
};
use crate::transport::Transport;

/// Routes messages between registered host capabilities and the guest
/// runtime on the other side of the transport.
///
/// Two tables drive inbound resolution: receiver-keyed handlers (whole
/// objects) and selector-keyed functions (with `receiver.selector` as the
/// composite fallback key). Registration may happen at any time relative
/// to dispatch; a rebind only affects calls dispatched after it.
pub struct Dispatcher {
    /// Receiver-keyed capabilities.
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,

    /// Selector- and composite-keyed functions.
    functions: RwLock<HashMap<String, Arc<dyn Handler>>>,

    /// The injected channel ends into the guest runtime.
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Create a dispatcher over the given transport, with empty tables.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            functions: RwLock::new(HashMap::new()),
            transport,
        }
    }

    /// Bind a capability to a receiver name. A later registration under
    /// the same name replaces the earlier one for subsequent calls.
    pub fn register_handler(&self, name: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers
            .write()
            .unwrap()
            .insert(name.into(), Arc::new(handler));
    }

    /// Bind a plain function to a selector (or `receiver.selector`
    /// composite) name. Dispatch treats it exactly like a handler; the
    /// separate table only lets one capability expose many named
    /// functions without a multi-method object.
    pub fn register_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&Message) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions
            .write()
            .unwrap()
            .insert(name.into(), Arc::new(FnHandler(function)));
    }

    /// Handle one inbound wire string.
    ///
    /// Returns the reply string when `synchronous` (always, even for
    /// failures, whose error text becomes the literal reply) and `None`
    /// otherwise. The decoded message's asynchronicity flag is forced
    /// from `synchronous`: the channel the call arrived on is
    /// authoritative.
    pub fn dispatch_incoming(&self, raw: &str, synchronous: bool) -> Option<String> {
        let mut message = match Message::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                error!(%err, "inbound message rejected");
                return synchronous.then(|| err.to_string());
            }
        };
        message.is_asynchronous = !synchronous;
        debug!(%message, synchronous, "dispatching inbound call");

        let result = match self.resolve(&message).and_then(|handler| handler.perform(&message)) {
            Ok(result) => result,
            Err(err) => {
                match &err {
                    Error::NoSuchMethod { .. } => {
                        warn!(receiver = %message.receiver, selector = %message.selector, "no handler resolves")
                    }
                    _ => {
                        error!(%err, receiver = %message.receiver, selector = %message.selector, "perform failed")
                    }
                }
                return synchronous.then(|| err.to_string());
            }
        };

        if message.is_asynchronous {
            // Fire-and-forget: the only visible outcome is the optional
            // follow-up that hands the result to a registered callback.
            if !message.callback.is_empty() {
                self.send_callback_result(&message, result);
            }
            return None;
        }

        match serde_json::to_string(&result) {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                let err = Error::Encoding(err);
                error!(%err, receiver = %message.receiver, selector = %message.selector, "result not encodable");
                Some(err.to_string())
            }
        }
    }

    /// Resolve the handler for a message without invoking it.
    ///
    /// Empty receiver: selector lookup in the function table. Otherwise
    /// the receiver table wins; the composite `receiver.selector`
    /// function key is consulted only when the receiver lookup misses.
    fn resolve(&self, message: &Message) -> Result<Arc<dyn Handler>> {
        if message.receiver.is_empty() {
            return self
                .functions
                .read()
                .unwrap()
                .get(&message.selector)
                .cloned()
                .ok_or_else(|| Error::no_such_method("", &message.selector));
        }
        if let Some(handler) = self.handlers.read().unwrap().get(&message.receiver) {
            return Ok(handler.clone());
        }
        let composite = format!("{}.{}", message.receiver, message.selector);
        self.functions
            .read()
            .unwrap()
            .get(&composite)
            .cloned()
            .ok_or_else(|| Error::no_such_method(&message.receiver, &message.selector))
    }

    /// Deliver a perform result to the callback handle named by the
    /// message, as an independent outbound send. Failures are log-only:
    /// nothing on the fire-and-forget path may interrupt dispatch.
    fn send_callback_result(&self, message: &Message, result: Value) {
        let handle = FunctionRef::new(message.callback.clone());
        let follow_up = match Message::invoke_callback(&handle, std::slice::from_ref(&result)) {
            Ok(follow_up) => follow_up,
            Err(err) => {
                error!(%err, %handle, "callback result not encodable");
                return;
            }
        };
        if let Err(err) = self.send(&follow_up) {
            error!(%err, %handle, "callback delivery failed");
        }
    }

    /// Encode a message and hand it to the transport.
    ///
    /// Asynchronous messages go to the fire-and-forget primitive and
    /// yield `Null`. Synchronous messages block on the round trip and
    /// yield the decoded reply value; a reply that does not parse as
    /// JSON is an error report from the other side and surfaces as
    /// [`Error::Perform`]. Transport failures are surfaced, never
    /// retried.
    pub fn send(&self, message: &Message) -> Result<Value> {
        let payload = message.encode()?;
        debug!(%message, asynchronous = message.is_asynchronous, "sending outbound call");
        if message.is_asynchronous {
            self.transport.post(&payload)?;
            return Ok(Value::Null);
        }
        let reply = self.transport.exchange(&payload)?;
        match serde_json::from_str::<Value>(&reply) {
            Ok(mut value) => {
                normalize_numbers(&mut value);
                Ok(value)
            }
            Err(_) => Err(Error::Perform(reply)),
        }
    }

    /// Asynchronous call into the guest; no return value is expected.
    pub fn call(
        &self,
        receiver: impl Into<String>,
        selector: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<()> {
        self.send(&Message::call(receiver, selector, arguments))
            .map(|_| ())
    }

    /// Synchronous call into the guest, blocking for the result.
    pub fn call_and_wait(
        &self,
        receiver: impl Into<String>,
        selector: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        self.send(&Message::request(receiver, selector, arguments))
    }

    /// Ask the guest to invoke a registered callback handle now.
    pub fn callback(&self, handle: &FunctionRef, results: &[Value]) -> Result<()> {
        self.send(&Message::invoke_callback(handle, results)?)
            .map(|_| ())
    }

    /// Add or replace a global variable on the guest side.
    pub fn set_global(&self, name: &str, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Encoding)?;
        self.call(
            RUNTIME_RECEIVER,
            SET_SELECTOR,
            vec![Value::String(name.to_string()), value],
        )
    }

    /// Fetch a global variable from the guest side.
    pub fn get_global(&self, name: &str) -> Result<Value> {
        self.call_and_wait(
            RUNTIME_RECEIVER,
            GET_SELECTOR,
            vec![Value::String(name.to_string())],
        )
    }
}
