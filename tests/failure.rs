//! Start failures, retry, and failure propagation through the graph.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use servisor::{Mode, ServiceError, ServiceFn, StartError, State, Substate};
use support::{
    failing_service, flaky_service, inline_container, pool_container, wait_for_substate,
    Notification, TestListener, WAIT,
};

#[test]
fn failed_start_is_captured_and_cleared_by_retry() {
    let container = pool_container();

    let c = container
        .add_service("retry.c", flaky_service(1))
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::StartFailed, WAIT));
    assert_eq!(c.state(), State::StartFailed);
    let error = c.start_error().expect("captured failure");
    assert!(error.reason.contains("flaky"));

    c.retry();
    assert!(wait_for_substate(&c, Substate::Up, WAIT));
    assert!(c.start_error().is_none());
}

#[test]
fn dependent_enters_problem_and_recovers_after_retry() {
    let container = pool_container();

    let c = container
        .add_service("prop.c", flaky_service(1))
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    // No listeners on the dependent, so it parks in PROBLEM.
    let d = container
        .add_service("prop.d", ServiceFn::null())
        .dependency("prop.c")
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::StartFailed, WAIT));
    assert!(wait_for_substate(&d, Substate::Problem, WAIT));

    c.retry();
    assert!(wait_for_substate(&c, Substate::Up, WAIT));
    assert!(wait_for_substate(&d, Substate::Up, WAIT));
}

#[test]
fn duplicate_failures_notify_dependent_listeners_once() {
    let container = pool_container();
    let listener = TestListener::arc();

    let c1 = container
        .add_service("dup.c1", failing_service())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    let c2 = container
        .add_service("dup.c2", failing_service())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    container
        .add_service("dup.g", ServiceFn::null())
        .dependency("dup.c1")
        .dependency("dup.c2")
        .listener(listener.clone())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c1, Substate::StartFailed, WAIT));
    assert!(wait_for_substate(&c2, Substate::StartFailed, WAIT));
    assert!(listener.wait_for("dup.g", Notification::DependencyFailed, WAIT));

    // Let any duplicate notification drain, then check the edge fired once.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(listener.count("dup.g", Notification::DependencyFailed), 1);

    // Clearing one of two failures is not a recovery yet.
    c1.retry();
    assert!(wait_for_substate(&c1, Substate::Up, WAIT));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        listener.count("dup.g", Notification::DependencyFailureCleared),
        0
    );

    c2.retry();
    assert!(wait_for_substate(&c2, Substate::Up, WAIT));
    assert!(listener.wait_for("dup.g", Notification::DependencyFailureCleared, WAIT));
}

#[test]
fn asynchronous_start_failure_routes_to_start_failed() {
    let container = pool_container();

    let service = ServiceFn::arc(
        |ctx| {
            let handle = ctx.asynchronous()?;
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                handle.fail(StartError::new("async boom")).unwrap();
            });
            Ok(())
        },
        |_ctx| Ok(()),
    );
    let c = container
        .add_service("async.fail", service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::StartFailed, WAIT));
    assert!(c.start_error().unwrap().reason.contains("async boom"));
}

#[test]
fn asynchronous_start_completion_reaches_up() {
    let container = pool_container();

    let service = ServiceFn::arc(
        |ctx| {
            let handle = ctx.asynchronous()?;
            ctx.execute(move || {
                std::thread::sleep(Duration::from_millis(20));
                handle.complete().unwrap();
            });
            Ok(())
        },
        |_ctx| Ok(()),
    );
    let c = container
        .add_service("async.ok", service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::Up, WAIT));
}

#[test]
fn completing_twice_is_a_protocol_violation() {
    let container = pool_container();
    let second: Arc<Mutex<Option<Result<(), ServiceError>>>> = Arc::new(Mutex::new(None));
    let second_in_service = second.clone();

    let service = ServiceFn::arc(
        move |ctx| {
            let handle = ctx.asynchronous()?;
            handle.complete().unwrap();
            *second_in_service.lock().unwrap() = Some(handle.complete());
            Ok(())
        },
        |_ctx| Ok(()),
    );
    let c = container
        .add_service("proto.c", service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::Up, WAIT));
    let outcome = second.lock().unwrap().take().expect("second call recorded");
    assert!(matches!(outcome, Err(ServiceError::InvalidContext)));
}

#[test]
fn stop_error_still_reaches_down() {
    let container = inline_container();
    let stopped = Arc::new(AtomicBool::new(false));
    let stopped_in_service = stopped.clone();

    let service = ServiceFn::arc(
        |_ctx| Ok(()),
        move |_ctx| {
            stopped_in_service.store(true, Ordering::SeqCst);
            Err(servisor::StopError::new("stop went sideways"))
        },
    );
    let c = container
        .add_service("stopfail.c", service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert_eq!(c.substate(), Substate::Up);

    c.set_mode(Mode::Never).unwrap();
    assert!(stopped.load(Ordering::SeqCst));
    assert_eq!(c.substate(), Substate::WontStart);
}

#[test]
fn panicking_start_is_captured_as_failure() {
    let container = pool_container();

    let service = ServiceFn::arc(|_ctx| panic!("start blew up"), |_ctx| Ok(()));
    let c = container
        .add_service("panic.c", service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();

    assert!(wait_for_substate(&c, Substate::StartFailed, WAIT));
    assert!(c.start_error().unwrap().reason.contains("start blew up"));
}
