//! Time-ordered queue of deferred message sends.
//!
//! The scheduler owns no transport: it composes messages and asks its
//! dispatcher to send them once they fall due. An external driver calls
//! [`Scheduler::perform_calls_before`] periodically with the current
//! time; the core provides no timer of its own.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::message::{FunctionRef, Message};

/// Selector guest code uses to defer one of its own callbacks:
/// `schedule(delayMillis, handle)`.
pub const SCHEDULE_SELECTOR: &str = "schedule";

/// A message deferred until a specific point in time.
#[derive(Debug, Clone)]
struct ScheduledCall {
    due: Instant,
    message: Message,
}

/// Queue of deferred sends, ordered by due time.
///
/// The queue is the one piece of shared mutable state in the core and is
/// guarded by a single read/write lock; every mutation holds the write
/// lock for its whole critical section. Sends fire on their own thread
/// so a slow or re-entrant callback never blocks the drain loop.
pub struct Scheduler {
    calls: RwLock<VecDeque<ScheduledCall>>,
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    /// Create a scheduler that sends due messages through the given
    /// dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            calls: RwLock::new(VecDeque::new()),
            dispatcher,
        }
    }

    /// Defer a message by `delay_millis`.
    ///
    /// A negative delay is refused with [`Error::InvalidDelay`]. A zero
    /// delay sends immediately on its own thread, bypassing the queue.
    pub fn schedule(&self, delay_millis: i64, message: Message) -> Result<()> {
        if delay_millis < 0 {
            return Err(Error::InvalidDelay(delay_millis));
        }
        if delay_millis == 0 {
            self.fire(message);
            return Ok(());
        }
        let due = Instant::now() + Duration::from_millis(delay_millis as u64);
        debug!(%message, delay_millis, "deferring call");
        self.enqueue(ScheduledCall { due, message });
        Ok(())
    }

    /// Defer the invocation of a guest callback handle.
    pub fn schedule_callback(
        &self,
        delay_millis: i64,
        handle: &FunctionRef,
        results: &[Value],
    ) -> Result<()> {
        self.schedule(delay_millis, Message::invoke_callback(handle, results)?)
    }

    /// Send every queued message due strictly before `cutoff`.
    ///
    /// Each entry is detached before its send is issued, so a callback
    /// that schedules again mid-drain never observes a half-drained
    /// queue.
    pub fn perform_calls_before(&self, cutoff: Instant) {
        let mut calls = self.calls.write().unwrap();
        while calls.front().is_some_and(|head| cutoff > head.due) {
            if let Some(call) = calls.pop_front() {
                self.fire(call.message);
            }
        }
    }

    /// Discard every pending entry without sending it.
    pub fn reset(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Number of entries still waiting to fall due.
    pub fn pending(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Splice a call into due-time order: new-head and at-or-after-tail
    /// fast paths, otherwise a forward scan for the first entry strictly
    /// later than the new one. Equal due times keep scheduling order.
    fn enqueue(&self, call: ScheduledCall) {
        let mut calls = self.calls.write().unwrap();
        if calls.back().map_or(true, |tail| call.due >= tail.due) {
            calls.push_back(call);
        } else if calls.front().map_or(false, |head| call.due < head.due) {
            calls.push_front(call);
        } else {
            let at = calls
                .iter()
                .position(|queued| queued.due > call.due)
                .unwrap_or(calls.len());
            calls.insert(at, call);
        }
    }

    /// Issue a send on an independent thread. Failures are logged; a
    /// deferred send has no caller left to report to.
    fn fire(&self, message: Message) {
        let dispatcher = self.dispatcher.clone();
        thread::spawn(move || {
            if let Err(err) = dispatcher.send(&message) {
                error!(%err, %message, "scheduled send failed");
            }
        });
    }

    #[cfg(test)]
    fn enqueue_at(&self, due: Instant, message: Message) {
        self.enqueue(ScheduledCall { due, message });
    }

    #[cfg(test)]
    fn queued_selectors(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|call| call.message.selector.clone())
            .collect()
    }
}

/// Guest-facing deferral: `schedule(delayMillis, handle)` composes the
/// callback invocation and queues it, so guest code can defer its own
/// callbacks through the ordinary dispatch path.
impl Handler for Scheduler {
    fn perform(&self, message: &Message) -> Result<Value> {
        if message.selector != SCHEDULE_SELECTOR {
            return Err(Error::no_such_method(&message.receiver, &message.selector));
        }
        let (delay, handle) = match message.arguments.as_slice() {
            [Value::Number(delay), Value::String(handle)] => (delay, handle),
            _ => {
                return Err(Error::perform(
                    "schedule expects (delayMillis, functionRef) arguments",
                ))
            }
        };
        let delay_millis = delay.as_f64().unwrap_or(-1.0) as i64;
        self.schedule_callback(delay_millis, &FunctionRef::new(handle.clone()), &[])?;
        Ok(Value::Null)
    }
}
