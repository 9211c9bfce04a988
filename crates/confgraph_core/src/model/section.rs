//! Section nodes of the configuration forest.

use super::reference::Reference;
use super::{NodeId, ProjectId};

/// Named node grouping compounds and processes; may nest child sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionConfiguration {
    pub id: NodeId,
    /// Identifier carried by the originating template, kept for later
    /// reconciliation.
    pub source_id: Option<NodeId>,
    pub name: String,
    /// 0-based order among siblings.
    pub place: usize,
    /// Non-owning parent pointer; `None` for root sections.
    pub parent_section: Option<NodeId>,
    /// Non-owning pointer to the owning project, restored after loads.
    pub project: Option<ProjectId>,
    pub sections: Vec<SectionConfiguration>,
    pub process_refs: Vec<Reference>,
    pub compound_refs: Vec<Reference>,
}

impl SectionConfiguration {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            source_id: None,
            name: name.into(),
            place: 0,
            parent_section: None,
            project: None,
            sections: Vec::new(),
            process_refs: Vec::new(),
            compound_refs: Vec::new(),
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.id, self.name.as_str())
    }

    /// Returns whether `id` is this section or one of its descendants.
    pub fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.sections.iter().any(|child| child.contains(id))
    }

    /// Collects this section and all descendants in pre-order.
    pub fn subtree_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        collect_ids(self, &mut ids);
        ids
    }
}

fn collect_ids(section: &SectionConfiguration, out: &mut Vec<NodeId>) {
    out.push(section.id);
    for child in &section.sections {
        collect_ids(child, out);
    }
}

/// Rewrites `place` so siblings hold `[0, n)` in list order.
pub fn renumber(siblings: &mut [SectionConfiguration]) {
    for (index, section) in siblings.iter_mut().enumerate() {
        section.place = index;
    }
}

pub(crate) fn find_section(
    sections: &[SectionConfiguration],
    id: NodeId,
) -> Option<&SectionConfiguration> {
    for section in sections {
        if section.id == id {
            return Some(section);
        }
        if let Some(found) = find_section(&section.sections, id) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn find_section_mut(
    sections: &mut [SectionConfiguration],
    id: NodeId,
) -> Option<&mut SectionConfiguration> {
    for section in sections.iter_mut() {
        if section.id == id {
            return Some(section);
        }
        if let Some(found) = find_section_mut(&mut section.sections, id) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn walk_sections<'a>(
    sections: &'a [SectionConfiguration],
    out: &mut Vec<&'a SectionConfiguration>,
) {
    for section in sections {
        out.push(section);
        walk_sections(&section.sections, out);
    }
}

pub(crate) fn walk_sections_mut(
    sections: &mut [SectionConfiguration],
    visit: &mut dyn FnMut(&mut SectionConfiguration),
) {
    for section in sections.iter_mut() {
        visit(section);
        walk_sections_mut(&mut section.sections, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::{renumber, SectionConfiguration};
    use uuid::Uuid;

    #[test]
    fn renumber_assigns_contiguous_places() {
        let mut siblings = vec![
            SectionConfiguration::new(Uuid::new_v4(), "a"),
            SectionConfiguration::new(Uuid::new_v4(), "b"),
            SectionConfiguration::new(Uuid::new_v4(), "c"),
        ];
        siblings[0].place = 4;
        siblings[2].place = 9;

        renumber(&mut siblings);

        let places: Vec<usize> = siblings.iter().map(|section| section.place).collect();
        assert_eq!(places, vec![0, 1, 2]);
    }

    #[test]
    fn contains_walks_descendants() {
        let mut root = SectionConfiguration::new(Uuid::new_v4(), "root");
        let mut child = SectionConfiguration::new(Uuid::new_v4(), "child");
        let grandchild = SectionConfiguration::new(Uuid::new_v4(), "grandchild");
        let grandchild_id = grandchild.id;
        child.sections.push(grandchild);
        root.sections.push(child);

        assert!(root.contains(grandchild_id));
        assert!(!root.sections[0].sections[0].contains(root.id));
        assert_eq!(root.subtree_ids().len(), 3);
    }
}
