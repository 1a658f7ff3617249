use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tracing_test::traced_test;

use super::*;
use crate::test_utils::CallbackRecorder;
use crate::test_utils::FakeConnection;
use crate::test_utils::WatchEvent;
use crate::BusConnection;
use crate::BusName;
use crate::ImmediateContext;
use crate::LoopContext;
use crate::SchedulingContext;

const NAME: &str = "org.example.Player";

fn new_watch(
    recorder: &CallbackRecorder,
    context: Arc<dyn SchedulingContext>,
) -> Arc<Watch> {
    Watch::new(
        WatcherId::new(1).unwrap(),
        BusName::new(NAME).unwrap(),
        WatchFlags::NONE,
        recorder.handlers(),
        context,
        Duration::from_secs(1),
    )
}

/// Binds `watch` to a fake connection whose replies are held, so the test
/// completes the resolution by hand.
fn bind_pending(watch: &Arc<Watch>) -> Arc<FakeConnection> {
    let connection = FakeConnection::new();
    connection.hold_replies();
    bind(watch, connection.clone() as Arc<dyn BusConnection>);
    connection
}

#[tokio::test]
async fn resolution_commits_first_notification() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let _connection = bind_pending(&watch);

    assert!(!watch.is_initialized());
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    assert!(watch.is_initialized());
    assert_eq!(watch.owner().as_deref(), Some(":1.7"));
    assert_eq!(watch.previous_call(), PreviousCall::Appeared);
    assert_eq!(recorder.events(), vec![WatchEvent::appeared(NAME, ":1.7")]);
}

#[tokio::test]
async fn unowned_resolution_reports_vanished_while_connected() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let _connection = bind_pending(&watch);

    watch.complete_resolution(Resolution::Unowned);

    assert_eq!(watch.owner(), None);
    assert_eq!(recorder.events(), vec![WatchEvent::vanished(NAME, true)]);
}

#[tokio::test]
async fn owner_changes_before_resolution_are_discarded() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);

    connection.set_owner(NAME, ":1.5");
    connection.release_name(NAME);
    assert!(recorder.events().is_empty());
    assert_eq!(watch.previous_call(), PreviousCall::None);

    watch.complete_resolution(Resolution::Unowned);

    assert_eq!(recorder.events(), vec![WatchEvent::vanished(NAME, true)]);
}

#[tokio::test]
async fn owner_changes_alternate_after_resolution() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Unowned);

    connection.set_owner(NAME, ":1.7");
    connection.release_name(NAME);
    connection.set_owner(NAME, ":1.9");

    assert_eq!(
        recorder.events(),
        vec![
            WatchEvent::vanished(NAME, true),
            WatchEvent::appeared(NAME, ":1.7"),
            WatchEvent::vanished(NAME, true),
            WatchEvent::appeared(NAME, ":1.9"),
        ]
    );
    assert_eq!(watch.owner().as_deref(), Some(":1.9"));
}

#[tokio::test]
async fn handover_reports_vanished_then_appeared() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    connection.emit_owner_changed(NAME, ":1.7", ":1.9");

    assert_eq!(
        recorder.events(),
        vec![
            WatchEvent::appeared(NAME, ":1.7"),
            WatchEvent::vanished(NAME, true),
            WatchEvent::appeared(NAME, ":1.9"),
        ]
    );
}

#[tokio::test]
async fn repeated_vanish_is_delivered_once() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    connection.emit_owner_changed(NAME, ":1.7", "");
    connection.emit_owner_changed(NAME, ":1.7", "");

    assert_eq!(
        recorder.events(),
        vec![WatchEvent::appeared(NAME, ":1.7"), WatchEvent::vanished(NAME, true)]
    );
}

#[tokio::test]
#[traced_test]
async fn announced_owner_over_recorded_one_is_logged_and_taken() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    connection.emit_owner_changed(NAME, "", ":1.9");

    assert!(logs_contain("Owner already recorded when a new owner was announced"));
    assert_eq!(watch.owner().as_deref(), Some(":1.9"));
    // Still appeared, so no second callback
    assert_eq!(recorder.events(), vec![WatchEvent::appeared(NAME, ":1.7")]);
}

#[tokio::test]
async fn connection_loss_reports_vanished_without_connection() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    connection.close();

    assert!(!watch.is_bound());
    assert_eq!(watch.owner(), None);
    assert_eq!(connection.subscription_count(), 0);
    assert_eq!(connection.closed_handler_count(), 0);
    assert_eq!(
        recorder.events(),
        vec![WatchEvent::appeared(NAME, ":1.7"), WatchEvent::vanished(NAME, false)]
    );
}

#[tokio::test]
async fn connection_loss_before_resolution_wins_over_late_owner() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);

    connection.close();
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    assert_eq!(recorder.events(), vec![WatchEvent::vanished(NAME, false)]);
    assert_eq!(watch.owner(), None);
}

#[tokio::test]
async fn already_closed_connection_reports_vanished() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = FakeConnection::new();
    connection.close();

    bind(&watch, connection.clone() as Arc<dyn BusConnection>);
    assert!(recorder.events().is_empty());

    assert_eq!(recorder.next().await, WatchEvent::vanished(NAME, false));
    assert!(!watch.is_bound());
    assert!(connection.calls().is_empty());
}

#[test]
fn connect_failure_reports_vanished_without_connection() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));

    watch.handle_connect_failed();

    assert_eq!(recorder.events(), vec![WatchEvent::vanished(NAME, false)]);
}

#[tokio::test]
async fn cancelled_watch_commits_without_delivering() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = bind_pending(&watch);

    watch.cancel();
    watch.complete_resolution(Resolution::Owned(":1.7".into()));
    connection.emit_owner_changed(NAME, ":1.7", "");

    assert_eq!(watch.previous_call(), PreviousCall::Vanished);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn cancel_from_callback_drops_rest_of_inline_batch() {
    let events: Arc<Mutex<Vec<WatchEvent>>> = Arc::default();
    let slot: Arc<Mutex<Weak<Watch>>> = Arc::new(Mutex::new(Weak::new()));
    let handlers = {
        let (appeared, vanished, slot) = (events.clone(), events.clone(), slot.clone());
        WatchHandlers::new()
            .on_appeared(move |_: &Arc<dyn BusConnection>, name: &str, owner: &str| {
                appeared.lock().push(WatchEvent::appeared(name, owner));
            })
            .on_vanished(move |connection: Option<&Arc<dyn BusConnection>>, name: &str| {
                vanished.lock().push(WatchEvent::vanished(name, connection.is_some()));
                if let Some(watch) = slot.lock().upgrade() {
                    watch.cancel();
                }
            })
    };
    let watch = Watch::new(
        WatcherId::new(1).unwrap(),
        BusName::new(NAME).unwrap(),
        WatchFlags::NONE,
        handlers,
        Arc::new(ImmediateContext),
        Duration::from_secs(1),
    );
    *slot.lock() = Arc::downgrade(&watch);
    let connection = bind_pending(&watch);
    watch.complete_resolution(Resolution::Owned(":1.7".into()));

    // Vanished and appeared are committed together; the first one cancels
    connection.emit_owner_changed(NAME, ":1.7", ":1.9");

    assert_eq!(
        *events.lock(),
        vec![WatchEvent::appeared(NAME, ":1.7"), WatchEvent::vanished(NAME, true)]
    );
    assert_eq!(watch.owner().as_deref(), Some(":1.9"));
}

#[tokio::test]
async fn deferred_notifications_keep_commit_order() {
    let recorder = CallbackRecorder::new();
    let (context, mut event_loop) = LoopContext::new();
    let watch = new_watch(&recorder, context);
    let connection = bind_pending(&watch);

    watch.complete_resolution(Resolution::Unowned);
    connection.set_owner(NAME, ":1.7");
    connection.release_name(NAME);
    assert!(recorder.events().is_empty());

    assert_eq!(event_loop.run_pending(), 3);
    assert_eq!(
        recorder.events(),
        vec![
            WatchEvent::vanished(NAME, true),
            WatchEvent::appeared(NAME, ":1.7"),
            WatchEvent::vanished(NAME, true),
        ]
    );
}

#[tokio::test]
async fn deferred_notifications_are_dropped_after_cancel() {
    let recorder = CallbackRecorder::new();
    let (context, mut event_loop) = LoopContext::new();
    let watch = new_watch(&recorder, context);
    let _connection = bind_pending(&watch);

    watch.complete_resolution(Resolution::Owned(":1.7".into()));
    watch.cancel();

    assert_eq!(event_loop.run_pending(), 1);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn drop_unsubscribes_before_releasing_closed_handler() {
    let recorder = CallbackRecorder::new();
    let watch = new_watch(&recorder, Arc::new(ImmediateContext));
    let connection = FakeConnection::new();
    bind(&watch, connection.clone() as Arc<dyn BusConnection>);
    assert_eq!(recorder.next().await, WatchEvent::vanished(NAME, true));
    // Let the resolution task release its reference
    tokio::task::yield_now().await;

    drop(watch);

    let journal = connection.journal();
    assert_eq!(journal.len(), 4);
    assert!(journal[0].starts_with("connect_closed"));
    assert!(journal[1].starts_with("subscribe_signal"));
    assert!(journal[2].starts_with("unsubscribe_signal"));
    assert!(journal[3].starts_with("disconnect_closed"));
    assert_eq!(connection.subscription_count(), 0);
}
