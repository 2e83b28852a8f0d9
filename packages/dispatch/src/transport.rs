//! The raw channel primitives supplied by the guest-runtime binding.
//!
//! The dispatch core never owns a live guest. Whoever embeds the guest
//! engine hands the core these two string-shaped channel ends as an
//! injected capability, and arranges the guest-side counterpart:
//!
//! - a way for guest code to deliver a string to the host, feeding
//!   [`Dispatcher::dispatch_incoming`](crate::Dispatcher::dispatch_incoming)
//!   with `synchronous = false`,
//! - a blocking variant of the same that waits for the reply string
//!   (`synchronous = true`),
//! - a registry that mints an opaque string handle for a guest callable,
//!   so a function value can cross the boundary as a
//!   [`FunctionRef`](crate::FunctionRef) and later be invoked by handle.

use crate::error::TransportError;

/// The two raw channel primitives into the guest runtime.
pub trait Transport: Send + Sync {
    /// Deliver a payload without waiting for any reply.
    fn post(&self, payload: &str) -> Result<(), TransportError>;

    /// Deliver a payload and block until the guest produces a reply.
    ///
    /// There is no deadline: callers needing a timeout must wrap the
    /// call themselves, and must not hold unrelated locks while waiting.
    fn exchange(&self, payload: &str) -> Result<String, TransportError>;
}
