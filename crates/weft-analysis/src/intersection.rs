#![forbid(unsafe_code)]

//! Intersections and reference accumulation.
//!
//! An expression that reads several distinct references depends on their
//! *intersection*: the sorted, duplicate-free list of those references.
//! Intersections are interned per section so that two expressions with the
//! same dependencies share one [`IntersectionId`], which is how the code
//! generator recognizes that their recomputation can be merged.
//!
//! # Invariants
//!
//! 1. Every member list is sorted by [`ReferenceTable::compare`] and has at
//!    least two entries.
//! 2. Interned lists are never mutated; growing a set interns a new list.
//! 3. A section's registry is sorted by [`compare_intersections`]: shorter
//!    lists first, then member by member.
//!
//! # Deferred merges
//!
//! Some targets depend on the union of other nodes' sets. They are
//! registered with [`CompilationContext::merge_references`] during the
//! traversal and resolved in one batch by
//! [`CompilationContext::finalize_references`] once every contributor has
//! its final set.

use std::cmp::Ordering;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::context::{Analysis, CompilationContext};
use crate::model::{IntersectionId, ReferenceId, ReferenceTable, References, SectionId};
use crate::sorted::{Slot, locate, union_sorted};
use crate::tree::NodeId;

/// Member list of one intersection.
pub type Members = SmallVec<[ReferenceId; 4]>;

/// Intersection order: length first, then member by member.
#[must_use]
pub fn compare_intersections(
    references: &ReferenceTable,
    a: &[ReferenceId],
    b: &[ReferenceId],
) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| {
        a.iter()
            .zip(b)
            .map(|(x, y)| references.compare(*x, *y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Interned intersections with a sorted registry per section.
#[derive(Debug, Default)]
pub struct IntersectionTable {
    lists: Vec<Members>,
    by_section: AHashMap<SectionId, Vec<IntersectionId>>,
}

impl IntersectionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `members` (already sorted) in `section`'s registry.
    pub fn intern(
        &mut self,
        references: &ReferenceTable,
        section: SectionId,
        members: Members,
    ) -> IntersectionId {
        let Self { lists, by_section } = self;
        let registry = by_section.entry(section).or_default();
        match locate(registry, |probe| {
            compare_intersections(references, &lists[probe.index()], &members)
        }) {
            Slot::Found(index) => registry[index],
            Slot::Vacant(index) => {
                let id = IntersectionId::from_index(lists.len());
                lists.push(members);
                registry.insert(index, id);
                id
            }
        }
    }

    #[must_use]
    pub fn members(&self, id: IntersectionId) -> &[ReferenceId] {
        &self.lists[id.index()]
    }

    /// Registry of one section in canonical order.
    #[must_use]
    pub fn in_section(&self, section: SectionId) -> &[IntersectionId] {
        self.by_section
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

impl Analysis {
    /// Add `reference` to a node's accumulated set.
    ///
    /// Adding a reference already in the set returns the set unchanged. A
    /// second distinct reference promotes the set to an intersection interned
    /// in the added reference's section.
    pub(crate) fn add_reference(
        &mut self,
        current: Option<References>,
        reference: ReferenceId,
    ) -> References {
        let Some(current) = current else {
            return References::One(reference);
        };
        let members: Members = match current {
            References::One(existing) if existing == reference => return current,
            References::One(existing) => {
                if self.references.compare(existing, reference).is_gt() {
                    smallvec::smallvec![reference, existing]
                } else {
                    smallvec::smallvec![existing, reference]
                }
            }
            References::Many(id) => {
                let list = self.intersections.members(id);
                match locate(list, |probe| self.references.compare(*probe, reference)) {
                    Slot::Found(_) => return current,
                    Slot::Vacant(index) => {
                        let mut grown = Members::from_slice(list);
                        grown.insert(index, reference);
                        grown
                    }
                }
            }
        };
        let section = self.references.get(reference).section;
        References::Many(self.intersections.intern(&self.references, section, members))
    }

    /// Canonical set for `members` in `section`: nothing, a single reference
    /// or an interned intersection.
    pub(crate) fn find_references(
        &mut self,
        section: SectionId,
        members: Members,
    ) -> Option<References> {
        match members.len() {
            0 => None,
            1 => Some(References::One(members[0])),
            _ => Some(References::Many(self.intersections.intern(
                &self.references,
                section,
                members,
            ))),
        }
    }
}

/// A registered merge: `target` takes the union of `nodes`' sets.
#[derive(Debug, Clone)]
pub(crate) struct PendingMerge {
    pub(crate) target: NodeId,
    pub(crate) nodes: Vec<Option<NodeId>>,
}

impl CompilationContext<'_> {
    /// Register `target` to receive the union of the reference sets of
    /// `nodes` when [`finalize_references`](Self::finalize_references) runs.
    ///
    /// Registering the same target again replaces its contributor list and
    /// keeps its original position in the batch.
    pub fn merge_references(&mut self, target: NodeId, nodes: Vec<Option<NodeId>>) {
        if let Some(pending) = self.pending.iter_mut().find(|m| m.target == target) {
            pending.nodes = nodes;
        } else {
            self.pending.push(PendingMerge { target, nodes });
        }
    }

    /// Resolve every registered merge in registration order.
    ///
    /// Each contributor's set is unioned into the target's set and the
    /// contributor is removed from its sources' expression registries, since
    /// the target now owns those dependencies. The union is interned against
    /// the target's section.
    pub fn finalize_references(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for PendingMerge { target, nodes } in pending {
            let mut merged = Members::new();
            for node in nodes.into_iter().flatten() {
                let Some(references) = self.analysis.references_of(node) else {
                    continue;
                };
                let members = Members::from_slice(self.analysis.members(&references));
                merged = union_sorted(&merged, &members, |a, b| {
                    self.analysis.references.compare(*a, *b)
                });
                for reference in &members {
                    let source = self.analysis.references.get(*reference).source;
                    self.analysis.sources[source.index()]
                        .expressions
                        .remove(&node);
                }
            }
            let section = self.analysis.sections.get_or_create(self.tree, target);
            let merged_len = merged.len();
            let result = self.analysis.find_references(section, merged);
            tracing::debug!(
                message = "analysis.finalize",
                target = target.index(),
                section = section.get(),
                references = merged_len,
            );
            self.analysis.facts_mut(target).references = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PropertyPath, Reference, SourceId};

    fn interned(analysis: &mut Analysis, source: u32, section: u32) -> ReferenceId {
        analysis.references.intern(Reference {
            source: SourceId::new(source),
            section: SectionId::new(section),
            property: PropertyPath::empty(),
            name: format!("s{source}"),
        })
    }

    #[test]
    fn adding_in_either_order_yields_one_intersection() {
        let mut analysis = Analysis::default();
        let a = interned(&mut analysis, 0, 0);
        let b = interned(&mut analysis, 1, 0);

        let first = analysis.add_reference(None, a);
        assert_eq!(first, References::One(a));
        let ab = analysis.add_reference(Some(first), b);
        let only_b = analysis.add_reference(None, b);
        let ba = analysis.add_reference(Some(only_b), a);
        assert_eq!(ab, ba);
        let References::Many(id) = ab else {
            panic!("expected intersection");
        };
        assert_eq!(analysis.intersections.members(id), &[a, b]);
    }

    #[test]
    fn re_adding_a_member_keeps_the_set() {
        let mut analysis = Analysis::default();
        let a = interned(&mut analysis, 0, 0);
        let b = interned(&mut analysis, 1, 0);
        let one = analysis.add_reference(None, a);
        assert_eq!(analysis.add_reference(Some(one), a), one);
        let many = analysis.add_reference(Some(one), b);
        assert_eq!(analysis.add_reference(Some(many), a), many);
        assert_eq!(analysis.intersections.len(), 1);
    }

    #[test]
    fn growing_an_intersection_interns_a_new_list() {
        let mut analysis = Analysis::default();
        let a = interned(&mut analysis, 0, 0);
        let b = interned(&mut analysis, 1, 0);
        let c = interned(&mut analysis, 2, 0);
        let one = analysis.add_reference(None, c);
        let References::Many(pair) = analysis.add_reference(Some(one), a) else {
            panic!("expected pair");
        };
        let References::Many(triple) = analysis.add_reference(Some(References::Many(pair)), b)
        else {
            panic!("expected triple");
        };
        assert_ne!(pair, triple);
        assert_eq!(analysis.intersections.members(pair), &[a, c]);
        assert_eq!(analysis.intersections.members(triple), &[a, b, c]);
        assert_eq!(
            analysis.intersections.in_section(SectionId::new(0)),
            &[pair, triple]
        );
    }

    #[test]
    fn intersections_are_registered_in_the_added_reference_section() {
        let mut analysis = Analysis::default();
        let outer = interned(&mut analysis, 0, 0);
        let inner = interned(&mut analysis, 1, 1);
        let one = analysis.add_reference(None, outer);
        let References::Many(id) = analysis.add_reference(Some(one), inner) else {
            panic!("expected intersection");
        };
        assert!(analysis.intersections.in_section(SectionId::new(0)).is_empty());
        assert_eq!(analysis.intersections.in_section(SectionId::new(1)), &[id]);
    }

    #[test]
    fn find_references_collapses_small_sets() {
        let mut analysis = Analysis::default();
        let a = interned(&mut analysis, 0, 0);
        let section = SectionId::new(0);
        assert_eq!(analysis.find_references(section, Members::new()), None);
        assert_eq!(
            analysis.find_references(section, smallvec::smallvec![a]),
            Some(References::One(a))
        );
    }
}
