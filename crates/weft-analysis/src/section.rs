#![forbid(unsafe_code)]

//! Sections: regions of the template with their own update boundary.
//!
//! A section is created lazily the first time a node inside it declares or
//! reads a source. Ids are handed out in creation order, so the first
//! section touched by a traversal gets id 0.

use ahash::AHashMap;

use crate::model::{SectionId, SourceId};
use crate::tree::{NodeId, Tree};

/// One section and the outer sources its body closes over.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    /// Program or tag body that opens this section.
    pub boundary: NodeId,
    /// Sources owned by another section but read in this one, in first-read
    /// order, each listed once.
    pub closures: Vec<SourceId>,
}

/// All sections of one compilation unit.
#[derive(Debug, Default)]
pub struct SectionGraph {
    sections: Vec<Section>,
    by_boundary: AHashMap<NodeId, SectionId>,
}

impl SectionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Section owning `node`, created on first request.
    pub fn get_or_create(&mut self, tree: &Tree, node: NodeId) -> SectionId {
        let boundary = tree.section_boundary(node);
        if let Some(id) = self.by_boundary.get(&boundary) {
            return *id;
        }
        let id = SectionId::from_index(self.sections.len());
        self.sections.push(Section {
            id,
            boundary,
            closures: Vec::new(),
        });
        self.by_boundary.insert(boundary, id);
        id
    }

    /// Record that `section` reads `source` from outside. Returns `true` if
    /// the edge is new.
    pub fn add_closure(&mut self, section: SectionId, source: SourceId) -> bool {
        let closures = &mut self.sections[section.index()].closures;
        if closures.contains(&source) {
            return false;
        }
        closures.push(source);
        true
    }

    #[must_use]
    pub fn get(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    #[must_use]
    pub fn by_boundary(&self, boundary: NodeId) -> Option<SectionId> {
        self.by_boundary.get(&boundary).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{TagKind, TagSpec, TreeBuilder};

    #[test]
    fn sections_are_created_once_per_boundary() {
        let mut b = TreeBuilder::new();
        let a = b.text("a");
        let c = b.text("c");
        let branch = b.tag(TagSpec::new("if", TagKind::Core).with_children(vec![a, c]));
        let tree = b.finish(vec![branch]);

        let mut graph = SectionGraph::new();
        let inner = graph.get_or_create(&tree, a);
        let root = graph.get_or_create(&tree, branch);
        assert_eq!(inner, SectionId::new(0));
        assert_eq!(root, SectionId::new(1));
        assert_eq!(graph.get_or_create(&tree, c), inner);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.by_boundary(tree.root()), Some(root));
    }

    #[test]
    fn closures_are_deduplicated() {
        let tree = TreeBuilder::new().finish(Vec::new());
        let mut graph = SectionGraph::new();
        let root = graph.get_or_create(&tree, tree.root());
        assert!(graph.add_closure(root, SourceId::new(3)));
        assert!(!graph.add_closure(root, SourceId::new(3)));
        assert!(graph.add_closure(root, SourceId::new(1)));
        assert_eq!(
            graph.get(root).closures,
            vec![SourceId::new(3), SourceId::new(1)]
        );
    }
}
