//! Configuration graph domain model.
//!
//! # Responsibility
//! - Define the materialized in-memory view of one project's graph.
//! - Keep ownership one-directional: parents own child collections, children
//!   carry non-owning id back-pointers restored after every load.
//!
//! # Invariants
//! - Sibling section `place` values form the contiguous range `[0, n)`.
//! - Neither the section forest nor the directory forest contains cycles.
//! - Membership (section/compound -> process, section -> compound) is held as
//!   ordered `Reference` lists on the owner plus denormalized names on the
//!   member; both sides are updated together.

use uuid::Uuid;

pub mod filesystem;
pub mod process;
pub mod project;
pub mod reference;
pub mod section;

/// Stable identifier of every graph node.
pub type NodeId = Uuid;

/// Identifier of the project owning one configuration graph.
pub type ProjectId = Uuid;
