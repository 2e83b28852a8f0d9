//! # Gangway Dispatch
//!
//! Gangway is a message layer between a host process and an embedded
//! "guest" scripting runtime that share no memory. Calls cross the
//! boundary only as serialized strings over two narrow channel
//! primitives - a fire-and-forget send and a blocking send-and-wait -
//! and this crate is the dispatch and correlation core built on top of
//! them.
//!
//! ## Core Concepts
//!
//! ### Messages
//!
//! A [`Message`] is the wire envelope describing one call: a `receiver`,
//! a `selector`, loosely typed arguments, an optional callback handle,
//! and a synchronicity flag. Messages travel as JSON; a synchronous call
//! produces exactly one reply value, an asynchronous one produces none
//! (or a follow-up through its callback handle).
//!
//! ### Handlers
//!
//! A [`Handler`] is a host capability that can perform a message. Whole
//! objects register under a receiver name; plain functions register
//! under a selector (or `receiver.selector` composite) name. The
//! [`Dispatcher`] resolves inbound messages against both tables, invokes
//! the winner, and encodes the result or the error back to the guest.
//!
//! ### Function references
//!
//! The host cannot hold a live reference into the guest's memory, so
//! when guest code passes a function across the boundary, the guest's
//! registry mints an opaque string handle for it. The host stores the
//! handle as a [`FunctionRef`] and later asks the guest to invoke it by
//! echoing the handle back.
//!
//! ### The scheduler
//!
//! A [`Scheduler`] keeps a time-ordered queue of deferred sends. It owns
//! no transport: it composes messages and asks its dispatcher to send
//! them once an external driver declares them due.
//!
//! ### The transport
//!
//! The two raw channel primitives are supplied by whoever embeds the
//! guest engine, as an implementation of [`Transport`]. Embedding a real
//! engine, loading guest bootstrap source, and concrete capability
//! modules all live outside this crate.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gangway_dispatch::{Dispatcher, Scheduler};
//! use serde_json::json;
//!
//! let transport: Arc<dyn gangway_dispatch::Transport> = binding_into_the_guest();
//! let dispatcher = Arc::new(Dispatcher::new(transport));
//!
//! // A global function the guest can call as `now()`.
//! dispatcher.register_function("now", |_msg| Ok(json!(1_700_000_000.0)));
//!
//! // Let guest code defer its own callbacks.
//! let scheduler = Arc::new(Scheduler::new(dispatcher.clone()));
//! dispatcher.register_handler("scheduler", scheduler.clone());
//!
//! // Call into the guest and block for the result.
//! let sum = dispatcher.call_and_wait("math", "sum", vec![json!(1), json!(2)])?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   host capabilities                      guest runtime
//!  ┌────────────────┐                    ┌───────────────────┐
//!  │ Handler, fns   │◄── dispatch ──┐    │ function registry │
//!  └────────────────┘               │    │ globals, script   │
//!  ┌────────────────┐          ┌────┴───┐└───────────────────┘
//!  │   Scheduler    │── send ─►│Dispatch│        ▲
//!  │ (deferred queue│          │  er    │── post/exchange ──┘
//!  │  of Messages)  │          └────────┘   (Transport)
//!  └────────────────┘
//! ```
//!
//! ## Delivery semantics
//!
//! At-most-once: a message is consumed exactly once by the transport and
//! never retried. Inbound calls are dispatched in delivery order, one at
//! a time per channel. No inbound input is ever fatal - malformed or
//! unroutable messages degrade to a log line, plus an error-text reply
//! when the caller is blocked waiting. Nothing survives a process
//! restart.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod scheduler;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::{Error, Result, TransportError};
pub use handler::Handler;
pub use message::{
    FunctionRef, Message, CALLBACK_SELECTOR, GET_SELECTOR, RUNTIME_RECEIVER, SET_SELECTOR,
};
pub use scheduler::{Scheduler, SCHEDULE_SELECTOR};
pub use transport::Transport;
