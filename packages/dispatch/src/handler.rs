//! Capability contract for participants that perform messages.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::message::Message;

/// A registered participant that can perform a [`Message`].
///
/// A handler is registered with a [`Dispatcher`](crate::Dispatcher) under
/// a receiver name and sees every message addressed to that name; the
/// selector is the handler's to interpret. The returned value must be
/// wire-encodable JSON.
pub trait Handler: Send + Sync {
    /// Perform the message, returning the result value or an error.
    fn perform(&self, message: &Message) -> Result<Value>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn perform(&self, message: &Message) -> Result<Value> {
        (**self).perform(message)
    }
}

/// Adapter that lets a plain function act as a handler, used for
/// selector-keyed registration.
pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Message) -> Result<Value> + Send + Sync,
{
    fn perform(&self, message: &Message) -> Result<Value> {
        (self.0)(message)
    }
}
