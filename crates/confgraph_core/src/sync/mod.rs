//! Synchronization collaborators: the synchronizer, the mirror repository,
//! the object store and named locks.

pub mod locks;
pub mod mirror;
pub mod object_store;
pub mod synchronizer;

pub use locks::{import_lock_key, lock_key, NamedLockGuard, NamedLocks};
pub use mirror::{checked_url, GitIdentity, GitMirror, MirrorError, MirrorRepository, PublishOutcome};
pub use object_store::{
    FsObjectStore, MemoryObjectStore, ObjectMetadata, ObjectResult, ObjectStore, ObjectStoreError,
};
pub use synchronizer::{
    MirrorRender, PublishError, PublishState, SyncError, SyncOutcome, Synchronizer,
};
