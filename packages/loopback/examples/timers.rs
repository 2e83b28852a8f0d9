//! A setTimeout-style flow over the loopback guest: guest code defers
//! one of its own callbacks through the scheduler, and a driver loop
//! stands in for the embedder's tick.
//!
//! Run with: cargo run -p gangway-loopback --example timers

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use gangway_dispatch::{Dispatcher, Message, Scheduler};
use gangway_loopback::LoopbackGuest;

fn main() {
    let guest = LoopbackGuest::new();
    let dispatcher = Arc::new(Dispatcher::new(guest.clone()));
    let scheduler = Arc::new(Scheduler::new(dispatcher.clone()));
    dispatcher.register_handler("scheduler", scheduler.clone());

    // The guest passes a function value toward the host: its registry
    // mints a handle, and the handle is what crosses the boundary.
    let handle = guest.register_callback(|_| println!("timed out"));

    let defer = Message::call(
        "scheduler",
        "schedule",
        vec![json!(250), json!(handle.as_str())],
    );
    guest
        .deliver(&dispatcher, &defer)
        .expect("deliver schedule request");

    // The embedder drives the scheduler with the current time.
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        scheduler.perform_calls_before(Instant::now());
        thread::sleep(Duration::from_millis(10));
    }
}
