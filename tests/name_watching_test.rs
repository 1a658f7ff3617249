//! End-to-end name watching against the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use bus_watch::test_utils::CallbackRecorder;
use bus_watch::test_utils::FakeBus;
use bus_watch::test_utils::FakeConnection;
use bus_watch::test_utils::WatchEvent;
use bus_watch::BusType;
use bus_watch::NameWatcher;
use bus_watch::WatchFlags;
use bus_watch::WatcherConfig;

const QUIET: Duration = Duration::from_millis(100);

fn watcher() -> (NameWatcher, Arc<FakeConnection>) {
    let connection = FakeConnection::new();
    let bus = FakeBus::new(connection.clone());
    (NameWatcher::new(bus, WatcherConfig::default()), connection)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_lifecycle_is_reported_in_order() {
    let (watcher, connection) = watcher();
    let recorder = CallbackRecorder::new();
    let name = "org.example.Lifecycle";

    let id = watcher
        .watch_name(BusType::Session, name, WatchFlags::NONE, recorder.handlers())
        .unwrap();
    assert_eq!(recorder.next().await, WatchEvent::vanished(name, true));

    connection.set_owner(name, ":1.7");
    assert_eq!(recorder.next().await, WatchEvent::appeared(name, ":1.7"));

    connection.set_owner(name, ":1.8");
    assert_eq!(recorder.next().await, WatchEvent::vanished(name, true));
    assert_eq!(recorder.next().await, WatchEvent::appeared(name, ":1.8"));

    connection.release_name(name);
    assert_eq!(recorder.next().await, WatchEvent::vanished(name, true));

    watcher.unwatch_name(id);
    connection.set_owner(name, ":1.9");
    recorder.assert_quiet(QUIET).await;
    assert!(!watcher.is_watching(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watches_of_different_names_are_independent() {
    let (watcher, connection) = watcher();
    let first = CallbackRecorder::new();
    let second = CallbackRecorder::new();

    watcher
        .watch_name(BusType::Session, "org.example.First", WatchFlags::NONE, first.handlers())
        .unwrap();
    watcher
        .watch_name(BusType::Session, "org.example.Second", WatchFlags::NONE, second.handlers())
        .unwrap();
    assert_eq!(first.next().await, WatchEvent::vanished("org.example.First", true));
    assert_eq!(second.next().await, WatchEvent::vanished("org.example.Second", true));

    connection.set_owner("org.example.First", ":1.3");

    assert_eq!(first.next().await, WatchEvent::appeared("org.example.First", ":1.3"));
    second.assert_quiet(QUIET).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn several_watches_of_one_name_each_get_callbacks() {
    let (watcher, connection) = watcher();
    connection.preset_owner("org.example.Shared", ":1.4");
    let recorders: Vec<CallbackRecorder> = (0..3).map(|_| CallbackRecorder::new()).collect();

    let ids: Vec<_> = recorders
        .iter()
        .map(|recorder| {
            watcher
                .watch_name(BusType::Session, "org.example.Shared", WatchFlags::NONE, recorder.handlers())
                .unwrap()
        })
        .collect();

    for recorder in &recorders {
        assert_eq!(recorder.next().await, WatchEvent::appeared("org.example.Shared", ":1.4"));
    }

    watcher.unwatch_name(ids[1]);
    connection.release_name("org.example.Shared");

    assert_eq!(recorders[0].next().await, WatchEvent::vanished("org.example.Shared", true));
    assert_eq!(recorders[2].next().await, WatchEvent::vanished("org.example.Shared", true));
    recorders[1].assert_quiet(QUIET).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn auto_start_brings_service_up() {
    let (watcher, connection) = watcher();
    let name = "org.example.Activatable";
    connection.make_activatable(name, ":1.42");
    let recorder = CallbackRecorder::new();

    let _guard = watcher
        .watch_name_scoped(BusType::Session, name, WatchFlags::AUTO_START, recorder.handlers())
        .unwrap();

    assert_eq!(recorder.next().await, WatchEvent::appeared(name, ":1.42"));
    recorder.assert_quiet(QUIET).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bus_disconnect_reports_vanished_without_connection() {
    let (watcher, connection) = watcher();
    let name = "org.example.Disconnect";
    connection.preset_owner(name, ":1.5");
    let recorder = CallbackRecorder::new();

    let _guard = watcher
        .watch_name_scoped(BusType::System, name, WatchFlags::NONE, recorder.handlers())
        .unwrap();
    assert_eq!(recorder.next().await, WatchEvent::appeared(name, ":1.5"));

    connection.close();

    assert_eq!(recorder.next().await, WatchEvent::vanished(name, false));
    recorder.assert_quiet(QUIET).await;
}
