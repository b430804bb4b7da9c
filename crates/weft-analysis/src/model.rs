#![forbid(unsafe_code)]

//! Sources, references and their canonical order.
//!
//! # Identity
//!
//! A [`Reference`] is the canonical identity of one `(source, section,
//! property path)` read. References are interned in a [`ReferenceTable`]:
//! structurally equal triples always resolve to the same [`ReferenceId`], so
//! id equality is object identity.
//!
//! # Order
//!
//! References compare by section id, then source id, then property path.
//! Property paths compare by segment count first (absent < single name <
//! chain), then segment by segment. The same order decides interning and the
//! layout of every intersection, which keeps code generation deterministic
//! regardless of traversal order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::sorted::get_or_insert_sorted;
use crate::tree::NodeId;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        pub struct $name(u32);

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }

            #[inline]
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// # Panics
            ///
            /// Past `u32::MAX` entries; ids never wrap or saturate.
            pub(crate) fn from_index(index: usize) -> Self {
                assert!(
                    index <= u32::MAX as usize,
                    "{} overflow: {index} (max={})",
                    stringify!($name),
                    u32::MAX
                );
                Self(index as u32)
            }
        }
    };
}

arena_id!(
    /// Monotonic source id, unique within one compilation unit.
    SourceId
);
arena_id!(
    /// Section id in creation order.
    SectionId
);
arena_id!(
    /// Interned reference.
    ReferenceId
);
arena_id!(
    /// Interned intersection.
    IntersectionId
);

/// What declared a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SourceKind {
    /// `<let/x=...>`
    Let,
    /// The component `input`.
    Input,
    /// Loop or branch body parameters.
    Param,
    /// Any other tag variable.
    Derived,
}

// ---------------------------------------------------------------------------
// Property paths
// ---------------------------------------------------------------------------

/// Ordered property names accessed below a source.
///
/// Zero segments means the whole value, one segment a single property, more
/// an access chain (`a.b.c` read from `a` is `["b", "c"]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PropertyPath(SmallVec<[String; 2]>);

impl PropertyPath {
    #[must_use]
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    #[must_use]
    pub fn name(segment: impl Into<String>) -> Self {
        let mut path = Self::empty();
        path.push(segment);
        path
    }

    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    /// `self` followed by `suffix`.
    #[must_use]
    pub fn concat(&self, suffix: &PropertyPath) -> PropertyPath {
        if suffix.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return suffix.clone();
        }
        Self(self.0.iter().chain(suffix.0.iter()).cloned().collect())
    }

    /// Split off the last segment: `(remaining, last)`.
    #[must_use]
    pub fn pop(&self) -> Option<(PropertyPath, String)> {
        let (last, rest) = self.0.split_last()?;
        Some((Self(rest.iter().cloned().collect()), last.clone()))
    }
}

impl Ord for PropertyPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.iter().cmp(other.0.iter()))
    }
}

impl PartialOrd for PropertyPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

// ---------------------------------------------------------------------------
// Aliases and sources
// ---------------------------------------------------------------------------

/// Indirection from a binding to another binding's reference.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Aliases {
    /// Not an alias.
    #[default]
    Empty,
    /// The binding is this reference.
    Direct(ReferenceId),
    /// Properties of the binding alias other references.
    Nested(BTreeMap<String, Aliases>),
}

/// A declared reactive value.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub kind: SourceKind,
    /// Section that owns the declaration.
    pub section: SectionId,
    pub aliases: Aliases,
    /// Expression roots currently holding references to this source.
    pub expressions: BTreeSet<NodeId>,
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Canonical `(source, section, property path)` read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: SourceId,
    /// Section in which the read occurs.
    pub section: SectionId,
    pub property: PropertyPath,
    /// Debug name, `name` or `name[path]`.
    pub name: String,
}

/// The canonical reference order.
#[must_use]
pub fn compare_references(a: &Reference, b: &Reference) -> Ordering {
    a.section
        .cmp(&b.section)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.property.cmp(&b.property))
}

/// Reference set accumulated on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum References {
    One(ReferenceId),
    Many(IntersectionId),
}

/// Interned references, grouped per source for lookup.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    references: Vec<Reference>,
    by_source: AHashMap<SourceId, Vec<ReferenceId>>,
}

impl ReferenceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of the reference equal to `candidate`, interning it on
    /// first sight.
    pub fn intern(&mut self, candidate: Reference) -> ReferenceId {
        let Self {
            references,
            by_source,
        } = self;
        let interned = by_source.entry(candidate.source).or_default();
        let next = ReferenceId::from_index(references.len());
        let (id, inserted) = get_or_insert_sorted(
            interned,
            |probe| compare_references(&references[probe.index()], &candidate),
            || next,
        );
        if inserted {
            tracing::trace!(
                message = "analysis.reference.interned",
                reference = id.get(),
                source = candidate.source.get(),
                section = candidate.section.get(),
                name = %candidate.name,
            );
            references.push(candidate);
        }
        id
    }

    #[must_use]
    pub fn get(&self, id: ReferenceId) -> &Reference {
        &self.references[id.index()]
    }

    /// Canonical order between two interned references.
    #[must_use]
    pub fn compare(&self, a: ReferenceId, b: ReferenceId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        compare_references(self.get(a), self.get(b))
    }

    /// References of one source in canonical order.
    #[must_use]
    pub fn of_source(&self, source: SourceId) -> &[ReferenceId] {
        self.by_source.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_cover_the_full_u32_range() {
        let last = u32::MAX as usize;
        assert_eq!(SourceId::from_index(last).get(), u32::MAX);
        assert_eq!(ReferenceId::from_index(7).index(), 7);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "ReferenceId overflow")]
    fn ids_past_u32_max_do_not_saturate() {
        let _ = ReferenceId::from_index(u32::MAX as usize + 1);
    }

    fn reference(section: u32, source: u32, property: PropertyPath) -> Reference {
        Reference {
            source: SourceId::new(source),
            section: SectionId::new(section),
            property,
            name: "r".into(),
        }
    }

    #[test]
    fn property_order_is_length_first() {
        let none = PropertyPath::empty();
        let z = PropertyPath::name("z");
        let ab = PropertyPath::from_segments(["a", "b"]);
        let aa = PropertyPath::from_segments(["a", "a"]);
        assert!(none < z);
        assert!(z < aa);
        assert!(aa < ab);
        assert!(PropertyPath::name("a") < PropertyPath::name("b"));
    }

    #[test]
    fn concat_and_pop() {
        let path = PropertyPath::name("value").concat(&PropertyPath::name("length"));
        assert_eq!(path, PropertyPath::from_segments(["value", "length"]));
        let (rest, last) = path.pop().expect("two segments");
        assert_eq!(rest, PropertyPath::name("value"));
        assert_eq!(last, "length");
        assert!(PropertyPath::empty().pop().is_none());
        assert_eq!(path.to_string(), "value,length");
    }

    #[test]
    fn references_order_by_section_then_source() {
        let a = reference(0, 5, PropertyPath::empty());
        let b = reference(1, 0, PropertyPath::empty());
        let c = reference(1, 0, PropertyPath::name("x"));
        assert_eq!(compare_references(&a, &b), Ordering::Less);
        assert_eq!(compare_references(&b, &c), Ordering::Less);
        assert_eq!(compare_references(&c, &c), Ordering::Equal);
    }

    #[test]
    fn interning_is_structural() {
        let mut table = ReferenceTable::new();
        let first = table.intern(reference(0, 1, PropertyPath::name("x")));
        let other = table.intern(reference(0, 1, PropertyPath::empty()));
        let again = table.intern(reference(0, 1, PropertyPath::name("x")));
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(table.len(), 2);
        assert_eq!(table.of_source(SourceId::new(1)), &[other, first]);
    }
}
