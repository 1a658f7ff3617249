use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use super::*;
use crate::BusName;
use crate::ImmediateContext;

fn create(id: WatcherId) -> Arc<Watch> {
    Watch::new(
        id,
        BusName::new("org.example.Player").unwrap(),
        WatchFlags::NONE,
        WatchHandlers::new(),
        Arc::new(ImmediateContext),
        Duration::from_secs(1),
    )
}

#[test]
fn watcher_id_is_never_zero() {
    assert_eq!(WatcherId::new(0), None);
    assert_eq!(WatcherId::new(7).map(WatcherId::get), Some(7));
}

#[test]
fn ids_are_assigned_in_increasing_order() {
    let registry = WatchRegistry::new();

    let first = registry.register(create).id();
    let second = registry.register(create).id();
    let third = registry.register(create).id();

    assert_eq!((first.get(), second.get(), third.get()), (1, 2, 3));
    assert_eq!(registry.len(), 3);
}

#[test]
fn ids_are_not_reused_after_unregister() {
    let registry = WatchRegistry::new();

    let first = registry.register(create).id();
    registry.unregister(first);
    let second = registry.register(create).id();

    assert_ne!(first, second);
}

#[test]
fn unregister_cancels_and_removes() {
    let registry = WatchRegistry::new();
    let watch = registry.register(create);
    let id = watch.id();

    let removed = registry.unregister(id).unwrap();

    assert!(Arc::ptr_eq(&removed, &watch));
    assert!(watch.is_cancelled());
    assert!(registry.lookup(id).is_none());
    assert!(registry.unregister(id).is_none());
    assert_eq!(registry.len(), 0);
}

#[test]
fn lookup_returns_registered_watch() {
    let registry = WatchRegistry::new();
    let watch = registry.register(create);

    let found = registry.lookup(watch.id()).unwrap();

    assert!(Arc::ptr_eq(&found, &watch));
    assert!(!found.is_cancelled());
}

#[test]
#[traced_test]
fn id_counter_wraps_to_one() {
    let registry = WatchRegistry::starting_at(u64::MAX);
    let last = registry.register(create).id();
    let wrapped = registry.register(create).id();
    let next = registry.register(create).id();

    assert_eq!(last.get(), u64::MAX);
    assert_eq!(wrapped.get(), 1);
    assert_eq!(next.get(), 2);
    assert!(logs_contain("Watcher id space exhausted"));
}

#[test]
fn reused_counter_skips_live_ids() {
    let registry = WatchRegistry::new();
    let first = registry.register(create).id();
    let second = registry.register(create).id();
    registry.unregister(first);

    registry.rewind_to(1);

    assert_eq!(registry.register(create).id(), first);
    assert_ne!(registry.register(create).id(), second);
}

#[test]
fn zero_start_skips_reserved_id() {
    let registry = WatchRegistry::starting_at(0);

    assert_eq!(registry.register(create).id().get(), 1);
}

#[test]
fn global_registry_is_shared() {
    assert!(Arc::ptr_eq(&WatchRegistry::global(), &WatchRegistry::global()));
}
