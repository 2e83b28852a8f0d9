//! The wire envelope exchanged between host and guest.
//!
//! A [`Message`] describes one call: who should perform it (`receiver`),
//! what to perform (`selector`), with which arguments, and whether the
//! sender blocks for the result. It crosses the boundary as a JSON string
//! and is consumed exactly once by the transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Well-known receiver exposing the guest runtime's support functions.
pub const RUNTIME_RECEIVER: &str = "gangway";

/// Selector that invokes a registered callback handle:
/// `callback(handle, payload...)`.
pub const CALLBACK_SELECTOR: &str = "callback";

/// Selector that stores a guest global variable: `set(name, value)`.
pub const SET_SELECTOR: &str = "set";

/// Selector that fetches a guest global variable: `get(name)`.
pub const GET_SELECTOR: &str = "get";

/// One call crossing the host/guest boundary.
///
/// All fields are present in encoded output; an empty string means "not
/// applicable" (empty `receiver` routes to the global function table,
/// empty `callback` means no follow-up is expected). A message is
/// immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the participant that should perform the call, or empty
    /// for a global function lookup by selector.
    #[serde(default)]
    pub receiver: String,

    /// The operation name.
    #[serde(default)]
    pub selector: String,

    /// Ordered, loosely typed call arguments.
    #[serde(default, rename = "args")]
    pub arguments: Vec<Value>,

    /// Function-reference handle to invoke with the result, or empty.
    #[serde(default)]
    pub callback: String,

    /// True when the sender does not block and expects no direct reply.
    #[serde(default, rename = "async")]
    pub is_asynchronous: bool,
}

impl Message {
    /// An asynchronous call: the sender does not block and expects no
    /// direct reply on this exchange.
    pub fn call(
        receiver: impl Into<String>,
        selector: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            receiver: receiver.into(),
            selector: selector.into(),
            arguments,
            callback: String::new(),
            is_asynchronous: true,
        }
    }

    /// A synchronous call: the sender blocks for exactly one reply value.
    pub fn request(
        receiver: impl Into<String>,
        selector: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            receiver: receiver.into(),
            selector: selector.into(),
            arguments,
            callback: String::new(),
            is_asynchronous: false,
        }
    }

    /// Attach a callback handle the performer should deliver the result to.
    pub fn with_callback(mut self, handle: FunctionRef) -> Self {
        self.callback = handle.into();
        self
    }

    /// The follow-up message that asks the guest runtime to invoke a
    /// registered callback handle.
    ///
    /// Result payloads travel individually encoded after the handle; the
    /// guest decodes each argument before applying the callback.
    pub fn invoke_callback(handle: &FunctionRef, results: &[Value]) -> Result<Self> {
        let mut arguments = Vec::with_capacity(results.len() + 1);
        arguments.push(Value::String(handle.to_string()));
        for result in results {
            let encoded = serde_json::to_string(result).map_err(Error::Encoding)?;
            arguments.push(Value::String(encoded));
        }
        Ok(Self::call(RUNTIME_RECEIVER, CALLBACK_SELECTOR, arguments))
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encoding)
    }

    /// Parse a wire string.
    ///
    /// Missing fields take their zero value and unknown fields are
    /// ignored. Numeric argument literals come back as floating point:
    /// the guest has a single number type, so an integer written on one
    /// side must compare equal to the float that returns.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut message: Message = serde_json::from_str(raw).map_err(Error::Decoding)?;
        for argument in &mut message.arguments {
            normalize_numbers(argument);
        }
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.receiver, self.selector, self.arguments.len())?;
        if !self.callback.is_empty() {
            write!(f, " => {}", self.callback)?;
        }
        Ok(())
    }
}

/// Collapse every numeric literal to floating point, recursively through
/// arrays and objects.
pub(crate) fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(number) => {
            if !number.is_f64() {
                if let Some(float) = number.as_f64().and_then(Number::from_f64) {
                    *value = Value::Number(float);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_numbers(item);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                normalize_numbers(item);
            }
        }
        _ => {}
    }
}

/// Opaque handle to a callable owned by the guest's function registry.
///
/// The host never resolves a handle. It only stores the string it was
/// given and echoes it back when asking the guest to invoke the function
/// it stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FunctionRef(String);

impl FunctionRef {
    /// Wrap a handle string minted by the guest registry.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty handle, meaning "no callback".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for FunctionRef {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

impl From<&str> for FunctionRef {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

impl From<FunctionRef> for String {
    fn from(handle: FunctionRef) -> Self {
        handle.0
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
