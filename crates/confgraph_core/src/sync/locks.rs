//! Named blocking mutexes keyed by application-chosen strings.
//!
//! # Invariants
//! - At most one guard exists per key at a time.
//! - A guard releases its key on drop, including during unwinding.

use crate::model::ProjectId;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

/// Registry of held keys shared by every caller of one deployment.
#[derive(Debug, Default)]
pub struct NamedLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is free, then holds it until the guard drops.
    pub fn acquire(&self, key: impl Into<String>) -> NamedLockGuard<'_> {
        let key = key.into();
        let started_at = Instant::now();
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        debug!(
            "event=lock_acquire module=sync status=ok waited_ms={}",
            started_at.elapsed().as_millis()
        );
        NamedLockGuard { locks: self, key }
    }

    /// Like [`NamedLocks::acquire`] but gives up after `timeout`.
    pub fn try_acquire_for(
        &self,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Option<NamedLockGuard<'_>> {
        let key = key.into();
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while held.contains(&key) {
            if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(&key) {
                return None;
            }
        }
        held.insert(key.clone());
        Some(NamedLockGuard { locks: self, key })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }

    fn release(&self, key: &str) {
        let mut held = self.held.lock();
        held.remove(key);
        drop(held);
        self.released.notify_all();
    }
}

/// Holds one named key.
#[derive(Debug)]
pub struct NamedLockGuard<'a> {
    locks: &'a NamedLocks,
    key: String,
}

impl NamedLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

/// Lock key `"<kind> <path> <project>"`.
pub fn lock_key(kind: &str, path: &Path, project_id: ProjectId) -> String {
    format!("{kind} {} {project_id}", path.display())
}

/// Lock key serializing imports of one document into one project.
pub fn import_lock_key(path: &Path, project_id: ProjectId) -> String {
    lock_key("import", path, project_id)
}

#[cfg(test)]
mod tests {
    use super::{import_lock_key, NamedLocks};
    use std::path::Path;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn import_lock_key_joins_kind_path_and_project() {
        let project_id = Uuid::nil();
        assert_eq!(
            import_lock_key(Path::new("/tmp/flow/Flow.json"), project_id),
            format!("import /tmp/flow/Flow.json {project_id}")
        );
    }

    #[test]
    fn guard_release_frees_key() {
        let locks = NamedLocks::new();
        let guard = locks.acquire("import a p");
        assert!(locks.is_held("import a p"));
        assert!(locks
            .try_acquire_for("import a p", Duration::from_millis(10))
            .is_none());
        assert!(locks.try_acquire_for("import b p", Duration::ZERO).is_some());

        drop(guard);
        assert!(!locks.is_held("import a p"));
    }
}
