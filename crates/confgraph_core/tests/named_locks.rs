use confgraph_core::sync::{import_lock_key, NamedLocks};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn holders_of_the_same_key_never_overlap() {
    let locks = Arc::new(NamedLocks::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let project = Uuid::new_v4();
    let key = import_lock_key(Path::new("/srv/flows/Flow.json"), project);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let _guard = locks.acquire(key.clone());
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!locks.is_held(&key));
}

#[test]
fn different_keys_do_not_block_each_other() {
    let locks = NamedLocks::new();
    let project = Uuid::new_v4();
    let first = import_lock_key(Path::new("a/Flow.json"), project);
    let second = import_lock_key(Path::new("b/Flow.json"), project);

    let _held = locks.acquire(first.clone());
    let other = locks.try_acquire_for(second, Duration::from_millis(10));
    assert!(other.is_some());
    assert!(locks.try_acquire_for(first, Duration::from_millis(10)).is_none());
}

#[test]
fn guard_releases_on_panic() {
    let locks = Arc::new(NamedLocks::new());
    let panicking = Arc::clone(&locks);
    let result = thread::spawn(move || {
        let _guard = panicking.acquire("import shared");
        panic!("import failed");
    })
    .join();
    assert!(result.is_err());
    assert!(!locks.is_held("import shared"));
    assert!(locks.try_acquire_for("import shared", Duration::from_millis(10)).is_some());
}
