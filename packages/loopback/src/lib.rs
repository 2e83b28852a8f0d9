//! # Gangway Loopback
//!
//! An in-memory guest runtime for exercising Gangway dispatchers without
//! embedding a real scripting engine. The loopback guest provides the
//! three things a real binding's guest side must: a function table the
//! host can call into, a registry that mints opaque handles for guest
//! callables, and the runtime support selectors (`set`, `get`,
//! `callback`) under the well-known runtime receiver.
//!
//! Everything runs synchronously on the caller's thread, so tests see
//! deterministic interleavings: a `post` performs the guest function
//! before returning, and an `exchange` returns the encoded result the
//! way a real engine's receive hook would.
//!
//! ```ignore
//! let guest = LoopbackGuest::new();
//! let dispatcher = Arc::new(Dispatcher::new(guest.clone()));
//!
//! guest.register_function("math", "sum", |args| {
//!     json!(args.iter().filter_map(Value::as_f64).sum::<f64>())
//! });
//! let three = dispatcher.call_and_wait("math", "sum", vec![json!(1), json!(2)])?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use gangway_dispatch::{
    Dispatcher, Error, FunctionRef, Message, Result, Transport, TransportError, CALLBACK_SELECTOR,
    GET_SELECTOR, RUNTIME_RECEIVER, SET_SELECTOR,
};

/// A guest-side function: decoded arguments in, result value out.
type GuestFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A guest callable registered for exactly one invocation by handle.
type GuestCallback = Box<dyn FnOnce(Vec<Value>) + Send>;

/// In-memory stand-in for the guest side of the boundary.
///
/// Functions are keyed `receiver.selector` (bare selector for the empty
/// receiver), mirroring how a scripting runtime resolves a namespace
/// path then a function name. Callback handles are one-shot: the
/// registry owns the callable and consumes it on first invocation, so a
/// handle echoed back twice only fires once.
pub struct LoopbackGuest {
    functions: Mutex<HashMap<String, GuestFn>>,
    globals: Mutex<HashMap<String, Value>>,
    callbacks: Mutex<HashMap<String, GuestCallback>>,
}

impl LoopbackGuest {
    /// Create an empty guest, ready to be handed to a
    /// [`Dispatcher`](gangway_dispatch::Dispatcher) as its transport.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            functions: Mutex::new(HashMap::new()),
            globals: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
        })
    }

    /// Define a guest function under `receiver.selector` (use an empty
    /// receiver for a bare global function).
    pub fn register_function<F>(&self, receiver: &str, selector: &str, function: F)
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        let key = function_key(receiver, selector);
        self.functions
            .lock()
            .unwrap()
            .insert(key, Arc::new(function));
    }

    /// Mint a handle for a guest callable, as the registry of a real
    /// guest runtime would when a function value crosses the boundary.
    /// The handle is consumed by its first invocation.
    pub fn register_callback<F>(&self, callback: F) -> FunctionRef
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        let handle = format!("fn-{}", Uuid::new_v4());
        self.callbacks
            .lock()
            .unwrap()
            .insert(handle.clone(), Box::new(callback));
        FunctionRef::new(handle)
    }

    /// Number of minted handles not yet consumed.
    pub fn outstanding_callbacks(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// Read a guest global, as set through the runtime receiver.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lock().unwrap().get(name).cloned()
    }

    /// Deliver a message to the host as the fire-and-forget binding
    /// direction would.
    pub fn deliver(&self, dispatcher: &Dispatcher, message: &Message) -> Result<()> {
        let payload = message.encode()?;
        dispatcher.dispatch_incoming(&payload, false);
        Ok(())
    }

    /// Deliver a message to the host and block for the decoded reply, as
    /// the blocking binding direction would. A reply that is not a JSON
    /// value is an error report and surfaces as [`Error::Perform`].
    pub fn deliver_and_wait(&self, dispatcher: &Dispatcher, message: &Message) -> Result<Value> {
        let payload = message.encode()?;
        match dispatcher.dispatch_incoming(&payload, true) {
            Some(reply) => match serde_json::from_str(&reply) {
                Ok(value) => Ok(value),
                Err(_) => Err(Error::Perform(reply)),
            },
            None => Ok(Value::Null),
        }
    }

    /// Perform one message guest-side and produce its result value.
    ///
    /// Unknown functions resolve to `Null` rather than an error, the way
    /// a permissive script bootstrap reports "nothing to return".
    fn perform(&self, message: &Message) -> Value {
        if message.receiver == RUNTIME_RECEIVER {
            match message.selector.as_str() {
                SET_SELECTOR => return self.set_global(&message.arguments),
                GET_SELECTOR => return self.get_global(&message.arguments),
                CALLBACK_SELECTOR => return self.invoke_callback(&message.arguments),
                _ => {}
            }
        }
        let key = function_key(&message.receiver, &message.selector);
        let function = self.functions.lock().unwrap().get(&key).cloned();
        match function {
            Some(function) => function(&message.arguments),
            None => {
                warn!(%message, "guest has no such function");
                Value::Null
            }
        }
    }

    fn set_global(&self, arguments: &[Value]) -> Value {
        if let [Value::String(name), value] = arguments {
            self.globals
                .lock()
                .unwrap()
                .insert(name.clone(), value.clone());
        } else {
            warn!("set expects (name, value) arguments");
        }
        Value::Null
    }

    fn get_global(&self, arguments: &[Value]) -> Value {
        match arguments {
            [Value::String(name)] => self.global(name).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Take the callable for the handle and apply it to the decoded
    /// payloads. Payloads arrive individually encoded after the handle.
    fn invoke_callback(&self, arguments: &[Value]) -> Value {
        let Some(Value::String(handle)) = arguments.first() else {
            warn!("callback invocation without a handle");
            return Value::Null;
        };
        let callback = self.callbacks.lock().unwrap().remove(handle);
        let Some(callback) = callback else {
            warn!(%handle, "no callable registered for handle");
            return Value::Null;
        };
        let payloads = arguments[1..]
            .iter()
            .map(|argument| match argument {
                Value::String(encoded) => {
                    serde_json::from_str(encoded).unwrap_or(Value::Null)
                }
                other => other.clone(),
            })
            .collect();
        callback(payloads);
        Value::Null
    }
}

fn function_key(receiver: &str, selector: &str) -> String {
    if receiver.is_empty() {
        selector.to_string()
    } else {
        format!("{receiver}.{selector}")
    }
}

impl Transport for LoopbackGuest {
    fn post(&self, payload: &str) -> std::result::Result<(), TransportError> {
        match Message::decode(payload) {
            Ok(message) => {
                self.perform(&message);
            }
            Err(err) => warn!(%err, "guest dropped an undecodable payload"),
        }
        Ok(())
    }

    fn exchange(&self, payload: &str) -> std::result::Result<String, TransportError> {
        let message = match Message::decode(payload) {
            Ok(message) => message,
            // The guest reports its parse failure as the reply text, the
            // same conflation the host side applies.
            Err(err) => return Ok(err.to_string()),
        };
        let result = self.perform(&message);
        serde_json::to_string(&result)
            .map_err(|err| TransportError::new(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn functions_resolve_by_namespace_then_name() {
        let guest = LoopbackGuest::new();
        guest.register_function("math", "sum", |args| {
            json!(args.iter().filter_map(Value::as_f64).sum::<f64>())
        });
        guest.register_function("", "ping", |_| json!("pong"));

        let sum = Message::request("math", "sum", vec![json!(1.0), json!(2.0)]);
        assert_eq!(guest.perform(&sum), json!(3.0));

        let ping = Message::request("", "ping", vec![]);
        assert_eq!(guest.perform(&ping), json!("pong"));
    }

    #[test]
    fn unknown_function_yields_null() {
        let guest = LoopbackGuest::new();
        let message = Message::request("ghost", "boo", vec![]);
        assert_eq!(guest.perform(&message), Value::Null);
    }

    #[test]
    fn globals_round_trip_through_the_runtime_receiver() {
        let guest = LoopbackGuest::new();
        let set = Message::call(
            RUNTIME_RECEIVER,
            SET_SELECTOR,
            vec![json!("answer"), json!(42.0)],
        );
        guest.perform(&set);

        let get = Message::request(RUNTIME_RECEIVER, GET_SELECTOR, vec![json!("answer")]);
        assert_eq!(guest.perform(&get), json!(42.0));
        assert_eq!(guest.global("answer"), Some(json!(42.0)));

        let absent = Message::request(RUNTIME_RECEIVER, GET_SELECTOR, vec![json!("void")]);
        assert_eq!(guest.perform(&absent), Value::Null);
    }

    #[test]
    fn callback_handles_are_one_shot() {
        let guest = LoopbackGuest::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = guest.register_callback(move |payloads| {
            sink.lock().unwrap().extend(payloads);
        });
        assert_eq!(guest.outstanding_callbacks(), 1);

        let invoke = Message::call(
            RUNTIME_RECEIVER,
            CALLBACK_SELECTOR,
            vec![json!(handle.as_str()), json!("{\"n\":7}")],
        );
        guest.perform(&invoke);
        guest.perform(&invoke);

        assert_eq!(*seen.lock().unwrap(), vec![json!({"n": 7})]);
        assert_eq!(guest.outstanding_callbacks(), 0);
    }

    #[test]
    fn exchange_replies_with_the_encoded_result() {
        let guest = LoopbackGuest::new();
        guest.register_function("", "ping", |_| json!("pong"));
        let payload = Message::request("", "ping", vec![]).encode().unwrap();
        assert_eq!(guest.exchange(&payload).unwrap(), "\"pong\"");
    }

    #[test]
    fn exchange_reports_parse_failures_as_text() {
        let guest = LoopbackGuest::new();
        let reply = guest.exchange("{nope").unwrap();
        assert!(reply.starts_with("not a valid message"));
    }
}
