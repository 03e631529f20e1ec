//! Removal: registry cleanup, dependent notification, child cascades, and
//! post-removal listener registration.

mod support;

use std::time::Duration;

use servisor::{Mode, ServiceFn, ServiceName, Substate};
use support::{
    inline_container, pool_container, slow_stop_service, wait_for_substate, Notification,
    TestListener, WAIT,
};

#[test]
fn install_then_remove_leaves_registry_empty() {
    let container = inline_container();

    let a = container
        .add_service("gone.a", ServiceFn::null())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert_eq!(a.substate(), Substate::Up);
    assert_eq!(container.installed_services(), vec![ServiceName::of("gone.a")]);

    a.set_mode(Mode::Remove).unwrap();
    assert_eq!(a.substate(), Substate::Removed);
    assert!(container.installed_services().is_empty());
    assert!(container.service(&ServiceName::of("gone.a")).is_none());
}

#[test]
fn removal_notifies_dependents_unavailable() {
    let container = pool_container();

    let a = container
        .add_service("note.a", ServiceFn::null())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    let b = container
        .add_service("note.b", ServiceFn::null())
        .dependency("note.a")
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert!(wait_for_substate(&b, Substate::Up, WAIT));

    a.set_mode(Mode::Remove).unwrap();
    assert!(wait_for_substate(&a, Substate::Removed, WAIT));
    // The dependent saw the name disappear and parks in PROBLEM.
    assert!(wait_for_substate(&b, Substate::Problem, WAIT));
    assert!(b
        .immediate_unavailable_dependencies()
        .contains(&ServiceName::of("note.a")));
}

#[test]
fn remove_mode_is_terminal() {
    let container = inline_container();

    let a = container
        .add_service("term.a", ServiceFn::null())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    a.set_mode(Mode::Remove).unwrap();
    assert_eq!(a.substate(), Substate::Removed);
    assert!(a.set_mode(Mode::Active).is_err());
    // Remove again is idempotent.
    assert!(a.set_mode(Mode::Remove).is_ok());
}

#[test]
fn listener_hears_remove_request_and_removal() {
    let container = pool_container();
    let listener = TestListener::arc();

    let a = container
        .add_service("heard.a", ServiceFn::null())
        .listener(listener.clone())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert!(listener.wait_for("heard.a", Notification::Started, WAIT));

    a.set_mode(Mode::Remove).unwrap();
    assert!(listener.wait_for("heard.a", Notification::RemoveRequested, WAIT));
    assert!(listener.wait_for("heard.a", Notification::Removed, WAIT));
    let requested = listener.position("heard.a", Notification::RemoveRequested).unwrap();
    let removed = listener.position("heard.a", Notification::Removed).unwrap();
    assert!(requested < removed);
}

#[test]
fn listener_added_after_removal_is_told_removed() {
    let container = inline_container();

    let a = container
        .add_service("late.a", ServiceFn::null())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    a.set_mode(Mode::Remove).unwrap();
    assert_eq!(a.substate(), Substate::Removed);

    let listener = TestListener::arc();
    a.add_listener(listener.clone()).unwrap();
    assert_eq!(
        listener.events_for("late.a"),
        vec![Notification::ListenerAdded, Notification::Removed]
    );
}

#[test]
fn child_cascade_on_parent_removal() {
    let container = pool_container();

    // The parent installs a child during start; the child stops slowly so
    // the parent observably waits in STOPPING for it.
    let parent_service = ServiceFn::arc(
        |ctx| {
            let target = ctx.child_target()?;
            target
                .add_service("cascade.parent.child", slow_stop_service(Duration::from_millis(150)))
                .initial_mode(Mode::Active)
                .install()
                .map_err(|e| servisor::StartError::new(e.to_string()))?;
            Ok(())
        },
        |_ctx| Ok(()),
    );

    let parent = container
        .add_service("cascade.parent", parent_service)
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert!(wait_for_substate(&parent, Substate::Up, WAIT));

    let child = container
        .service(&ServiceName::of("cascade.parent.child"))
        .expect("child installed");
    assert!(wait_for_substate(&child, Substate::Up, WAIT));
    assert_eq!(
        child.parent().map(|p| p.name().clone()),
        Some(ServiceName::of("cascade.parent"))
    );

    parent.set_mode(Mode::Remove).unwrap();

    // While the child drains its slow stop, the parent cannot advance past
    // STOP_REQUESTED: the child still counts as a running dependent.
    assert!(wait_for_substate(&child, Substate::Stopping, WAIT));
    assert_eq!(parent.substate(), Substate::StopRequested);

    // Once the child is down, the parent's stop schedules its removal and
    // holds in STOPPING (placeholder token) until the child is gone.
    assert!(wait_for_substate(&child, Substate::Removed, WAIT));
    assert!(wait_for_substate(&parent, Substate::Removed, WAIT));
    assert!(container.installed_services().is_empty());
}

#[test]
fn expected_stop_without_stopping_is_invalidated_by_a_real_stop() {
    let container = pool_container();
    let listener = TestListener::arc();

    let a = container
        .add_service("inv.a", ServiceFn::null())
        .listener(listener.clone())
        .initial_mode(Mode::Active)
        .install()
        .unwrap();
    assert!(listener.wait_for("inv.a", Notification::Started, WAIT));

    // A full stop passes through Stopping, so the expectation resolves to
    // None, and stays None when queried again after Stopped arrived.
    let expectation = listener.expect_stopped_only("inv.a");
    a.set_mode(Mode::Never).unwrap();
    assert!(wait_for_substate(&a, Substate::WontStart, WAIT));
    assert!(expectation.wait(WAIT).is_none());
    assert!(expectation.wait(Duration::from_millis(10)).is_none());
}
