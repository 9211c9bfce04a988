//! Lightweight `(id, name)` stand-in for a full entity.

use super::NodeId;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Immutable `(id, name)` pair used in caches and flat membership lists.
///
/// Equality and hashing consider the id only: a renamed entity is still the
/// same entity.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: NodeId,
    pub name: String,
}

impl Reference {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Returns whether `refs` holds a reference to `id`.
pub fn contains_id(refs: &[Reference], id: NodeId) -> bool {
    refs.iter().any(|reference| reference.id == id)
}

/// Inserts `reference` at `position` (clamped) unless its id is present.
///
/// Returns `false` when the list already referenced the id.
pub fn insert_unique(refs: &mut Vec<Reference>, reference: Reference, position: Option<usize>) -> bool {
    if contains_id(refs, reference.id) {
        return false;
    }
    let index = position.unwrap_or(refs.len()).min(refs.len());
    refs.insert(index, reference);
    true
}

/// Removes every reference to `id`; returns whether anything was removed.
pub fn remove_id(refs: &mut Vec<Reference>, id: NodeId) -> bool {
    let before = refs.len();
    refs.retain(|reference| reference.id != id);
    refs.len() != before
}

/// Updates the cached name of every reference to `id`.
pub fn rename_id(refs: &mut [Reference], id: NodeId, name: &str) {
    for reference in refs.iter_mut().filter(|reference| reference.id == id) {
        reference.name = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::{insert_unique, remove_id, Reference};
    use uuid::Uuid;

    #[test]
    fn equality_ignores_name() {
        let id = Uuid::new_v4();
        assert_eq!(Reference::new(id, "old"), Reference::new(id, "new"));
        assert_ne!(Reference::new(id, "x"), Reference::new(Uuid::new_v4(), "x"));
    }

    #[test]
    fn insert_unique_clamps_position_and_skips_duplicates() {
        let first = Reference::new(Uuid::new_v4(), "first");
        let second = Reference::new(Uuid::new_v4(), "second");
        let mut refs = vec![first.clone()];

        assert!(insert_unique(&mut refs, second.clone(), Some(10)));
        assert!(!insert_unique(&mut refs, first.clone(), Some(0)));
        assert_eq!(refs, vec![first.clone(), second.clone()]);

        assert!(remove_id(&mut refs, first.id));
        assert_eq!(refs, vec![second]);
    }
}
