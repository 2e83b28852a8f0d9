//! End-to-end flows between a host dispatcher and the loopback guest:
//! both call directions, callback handles, globals, and deferred calls.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use gangway_dispatch::{Dispatcher, Error, Message, Scheduler};
use gangway_loopback::LoopbackGuest;

fn bridge() -> (Arc<LoopbackGuest>, Arc<Dispatcher>) {
    let guest = LoopbackGuest::new();
    let dispatcher = Arc::new(Dispatcher::new(guest.clone()));
    (guest, dispatcher)
}

fn drive_until(scheduler: &Scheduler, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out driving the scheduler");
        scheduler.perform_calls_before(Instant::now());
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn guest_calls_a_host_function_and_waits() {
    let (guest, dispatcher) = bridge();
    dispatcher.register_function("now", |_: &Message| Ok(json!(1_700_000_000.0)));

    let request = Message::request("", "now", vec![]);
    let value = guest.deliver_and_wait(&dispatcher, &request).unwrap();
    assert_eq!(value, json!(1_700_000_000.0));
}

#[test]
fn host_calls_a_guest_function_and_waits() {
    let (guest, dispatcher) = bridge();
    guest.register_function("math", "sum", |args| {
        json!(args.iter().filter_map(Value::as_f64).sum::<f64>())
    });

    let value = dispatcher
        .call_and_wait("math", "sum", vec![json!(1), json!(2)])
        .unwrap();
    assert_eq!(value, json!(3.0));
}

#[test]
fn async_call_delivers_the_result_through_the_callback_handle() {
    let (guest, dispatcher) = bridge();
    dispatcher.register_function("greet", |message: &Message| {
        let name = message.arguments[0].as_str().unwrap_or("stranger");
        Ok(json!(format!("hello, {name}")))
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = guest.register_callback(move |payloads| {
        sink.lock().unwrap().extend(payloads);
    });

    let call = Message::call("", "greet", vec![json!("world")]).with_callback(handle);
    guest.deliver(&dispatcher, &call).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!("hello, world")]);
    assert_eq!(guest.outstanding_callbacks(), 0);
}

#[test]
fn host_invokes_a_guest_callback_immediately() {
    let (guest, dispatcher) = bridge();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = guest.register_callback(move |payloads| {
        sink.lock().unwrap().extend(payloads);
    });

    dispatcher
        .callback(&handle, &[json!({"status": "ready"})])
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!({"status": "ready"})]);
    assert_eq!(guest.outstanding_callbacks(), 0);
}

#[test]
fn async_call_without_callback_is_silent() {
    let (guest, dispatcher) = bridge();
    let performed = Arc::new(Mutex::new(0));
    let counter = performed.clone();
    dispatcher.register_function("tick", move |_: &Message| {
        *counter.lock().unwrap() += 1;
        Ok(json!("ignored"))
    });

    let call = Message::call("", "tick", vec![]);
    guest.deliver(&dispatcher, &call).unwrap();

    assert_eq!(*performed.lock().unwrap(), 1);
    assert_eq!(guest.outstanding_callbacks(), 0);
}

#[test]
fn host_error_text_surfaces_on_the_waiting_side() {
    let (guest, dispatcher) = bridge();
    dispatcher.register_function("explode", |_: &Message| {
        Err(Error::perform("something bad happened"))
    });

    let request = Message::request("", "explode", vec![]);
    let err = guest.deliver_and_wait(&dispatcher, &request).unwrap_err();
    match err {
        Error::Perform(text) => {
            assert_eq!(text, "perform failed: something bad happened")
        }
        other => panic!("expected Perform, got {other:?}"),
    }
}

#[test]
fn globals_round_trip_through_the_dispatcher() {
    let (guest, dispatcher) = bridge();
    dispatcher
        .set_global("config", json!({"retries": 3}))
        .unwrap();
    assert_eq!(guest.global("config"), Some(json!({"retries": 3.0})));

    let value = dispatcher.get_global("config").unwrap();
    assert_eq!(value, json!({"retries": 3.0}));

    assert_eq!(dispatcher.get_global("missing").unwrap(), Value::Null);
}

#[test]
fn scheduled_callback_fires_once_when_due() {
    let (guest, dispatcher) = bridge();
    let scheduler = Scheduler::new(dispatcher);

    let fired = Arc::new(Mutex::new(0));
    let counter = fired.clone();
    let handle = guest.register_callback(move |_| {
        *counter.lock().unwrap() += 1;
    });

    scheduler.schedule_callback(30, &handle, &[json!("done")]).unwrap();
    assert_eq!(scheduler.pending(), 1);

    drive_until(&scheduler, || *fired.lock().unwrap() == 1);
    assert_eq!(scheduler.pending(), 0);

    // Nothing left to fire, and the handle was consumed.
    scheduler.perform_calls_before(Instant::now() + Duration::from_secs(60));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(*fired.lock().unwrap(), 1);
    assert_eq!(guest.outstanding_callbacks(), 0);
}

#[test]
fn guest_defers_its_own_callback_through_the_scheduler_handler() {
    let (guest, dispatcher) = bridge();
    let scheduler = Arc::new(Scheduler::new(dispatcher.clone()));
    dispatcher.register_handler("scheduler", scheduler.clone());

    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    let handle = guest.register_callback(move |_| {
        *flag.lock().unwrap() = true;
    });

    let defer = Message::call(
        "scheduler",
        "schedule",
        vec![json!(20), json!(handle.as_str())],
    );
    guest.deliver(&dispatcher, &defer).unwrap();

    drive_until(&scheduler, || *fired.lock().unwrap());
}

#[test]
fn reset_discards_deferred_calls() {
    let (guest, dispatcher) = bridge();
    let scheduler = Scheduler::new(dispatcher);

    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    let handle = guest.register_callback(move |_| {
        *flag.lock().unwrap() = true;
    });

    scheduler.schedule_callback(20, &handle, &[]).unwrap();
    scheduler.reset();
    assert_eq!(scheduler.pending(), 0);

    scheduler.perform_calls_before(Instant::now() + Duration::from_secs(60));
    thread::sleep(Duration::from_millis(50));
    assert!(!*fired.lock().unwrap());
    assert_eq!(guest.outstanding_callbacks(), 1, "handle never consumed");
}

#[test]
fn firing_callback_may_schedule_again_without_corrupting_the_queue() {
    let (guest, dispatcher) = bridge();
    let scheduler = Arc::new(Scheduler::new(dispatcher));

    let second_fired = Arc::new(Mutex::new(false));
    let flag = second_fired.clone();
    let second = guest.register_callback(move |_| {
        *flag.lock().unwrap() = true;
    });

    let rescheduler = scheduler.clone();
    let first = guest.register_callback(move |_| {
        rescheduler.schedule_callback(10, &second, &[]).unwrap();
    });

    scheduler.schedule_callback(10, &first, &[]).unwrap();
    drive_until(&scheduler, || *second_fired.lock().unwrap());
}
