#![forbid(unsafe_code)]

//! Per-instance scope records.
//!
//! # Design
//!
//! A [`Scope`] holds everything one template instance needs at runtime: the
//! live value of every reactive slot, the nodes bound by the walk, the first
//! and last node of the instance, and the queue of effects waiting to run.
//! Scopes are independent of each other; the only shared data is the
//! read-only renderer that created them.
//!
//! # Invariants
//!
//! 1. `values.len()` equals the size the scope was created with.
//! 2. Bound nodes are stored in walk order and never reordered.
//! 3. An effect appears in the queue at most once.
//! 4. A destroyed scope has an empty queue.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use smallvec::SmallVec;

use crate::dom::NodeRef;
use crate::effect::EffectId;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique scope identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Finds a boundary node at runtime, given the scope and a compiled offset.
pub type Locator = Rc<dyn Fn(&Scope, usize) -> Option<NodeRef>>;

/// First or last node of an instance.
#[derive(Clone, Default)]
pub enum Boundary {
    #[default]
    Unset,
    Node(NodeRef),
    /// Determined at runtime, for roots whose shape changes after render.
    Dynamic { locate: Locator, offset: usize },
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("Unset"),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Self::Dynamic { offset, .. } => {
                f.debug_struct("Dynamic").field("offset", offset).finish()
            }
        }
    }
}

#[derive(Debug)]
pub struct Scope {
    id: ScopeId,
    values: Vec<Value>,
    nodes: SmallVec<[NodeRef; 8]>,
    start: Boundary,
    end: Boundary,
    queue: SmallVec<[EffectId; 8]>,
    destroyed: bool,
}

impl Scope {
    /// A scope with `size` value slots, all `null`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            id: ScopeId::next(),
            values: vec![Value::Null; size],
            nodes: SmallVec::new(),
            start: Boundary::Unset,
            end: Boundary::Unset,
            queue: SmallVec::new(),
            destroyed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn value(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot)
    }

    /// Store `value` in `slot`. Returns `Some(changed)`, or `None` when the
    /// slot does not exist.
    pub(crate) fn store(&mut self, slot: usize, value: Value) -> Option<bool> {
        let current = self.values.get_mut(slot)?;
        if *current == value {
            return Some(false);
        }
        *current = value;
        Some(true)
    }

    /// Nodes bound by the walk, in walk order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, index: usize) -> Option<NodeRef> {
        self.nodes.get(index).copied()
    }

    /// Bind the next walk target. Returns its index.
    pub fn bind_node(&mut self, node: NodeRef) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn set_start(&mut self, boundary: Boundary) {
        self.start = boundary;
    }

    pub fn set_end(&mut self, boundary: Boundary) {
        self.end = boundary;
    }

    #[must_use]
    pub fn start(&self) -> &Boundary {
        &self.start
    }

    #[must_use]
    pub fn end(&self) -> &Boundary {
        &self.end
    }

    /// Resolve the first node of the instance.
    #[must_use]
    pub fn first_node(&self) -> Option<NodeRef> {
        self.resolve(&self.start)
    }

    /// Resolve the last node of the instance.
    #[must_use]
    pub fn last_node(&self) -> Option<NodeRef> {
        self.resolve(&self.end)
    }

    fn resolve(&self, boundary: &Boundary) -> Option<NodeRef> {
        match boundary {
            Boundary::Unset => None,
            Boundary::Node(node) => Some(*node),
            Boundary::Dynamic { locate, offset } => locate(self, *offset),
        }
    }

    /// Queue an effect. Returns `false` if it was already queued or the
    /// scope is destroyed.
    pub(crate) fn enqueue(&mut self, effect: EffectId) -> bool {
        if self.destroyed || self.queue.contains(&effect) {
            return false;
        }
        self.queue.push(effect);
        true
    }

    pub(crate) fn dequeue(&mut self) -> Option<EffectId> {
        if self.queue.is_empty() {
            return None;
        }
        Some(self.queue.remove(0))
    }

    pub(crate) fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Effects waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Scope::new(0);
        let b = Scope::new(0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn store_reports_changes_and_range() {
        let mut scope = Scope::new(2);
        assert_eq!(scope.value(0), Some(&Value::Null));
        assert_eq!(scope.store(0, Value::from(1)), Some(true));
        assert_eq!(scope.store(0, Value::from(1)), Some(false));
        assert_eq!(scope.store(2, Value::from(1)), None);
        assert_eq!(scope.size(), 2);
    }

    #[test]
    fn queue_deduplicates_until_destroyed() {
        let mut scope = Scope::new(0);
        assert!(scope.enqueue(EffectId::new(1)));
        assert!(!scope.enqueue(EffectId::new(1)));
        assert!(scope.enqueue(EffectId::new(0)));
        assert_eq!(scope.dequeue(), Some(EffectId::new(1)));
        scope.mark_destroyed();
        assert_eq!(scope.pending(), 0);
        assert!(!scope.enqueue(EffectId::new(2)));
    }

    #[test]
    fn dynamic_boundaries_use_the_locator() {
        let mut doc = crate::dom::Document::new();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let mut scope = Scope::new(0);
        scope.bind_node(a);
        scope.bind_node(b);
        scope.set_start(Boundary::Node(a));
        scope.set_end(Boundary::Dynamic {
            locate: Rc::new(|scope: &Scope, offset| scope.node(offset)),
            offset: 1,
        });
        assert_eq!(scope.first_node(), Some(a));
        assert_eq!(scope.last_node(), Some(b));
        assert_eq!(format!("{:?}", scope.end()), "Dynamic { offset: 1 }");
    }
}
