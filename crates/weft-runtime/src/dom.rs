#![forbid(unsafe_code)]

//! Arena document model.
//!
//! The runtime manipulates a small DOM-like tree: elements, text, comments and
//! fragments, linked by parent / first child / last child / sibling pointers.
//! Nodes live in an arena owned by a [`Document`] and are addressed by
//! [`NodeRef`]. Removing a node only unlinks it; [`Document::release`] frees
//! a detached subtree so its slots can be reused.
//!
//! # Invariants
//!
//! 1. A node is linked into at most one parent's child list.
//! 2. `prev`/`next` links are symmetric and `first`/`last` match the ends of
//!    the child list.
//! 3. Inserting a fragment moves its children, leaving the fragment empty.
//! 4. A [`NodeRef`] carries its slot's generation. Releasing a slot bumps the
//!    generation, so handles to a released node never reach the node that
//!    later reuses the slot. Accessing such a handle panics.
//! 5. A document holds at most `u32::MAX` slots.
//!
//! Traversals use explicit stacks, so nesting depth is bounded by memory
//! rather than the call stack.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

impl NodeRef {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    generation: u32,
    parent: Option<NodeRef>,
    first: Option<NodeRef>,
    last: Option<NodeRef>,
    prev: Option<NodeRef>,
    next: Option<NodeRef>,
}

/// Shared, mutable document handle.
pub type Dom = Rc<RefCell<Document>>;

/// Elements that never have children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Default)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// One step of an iterative markup write.
enum Markup<'a> {
    Node(NodeRef),
    Close(&'a str),
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh document behind a shared handle.
    #[must_use]
    pub fn shared() -> Dom {
        Rc::new(RefCell::new(Self::new()))
    }

    fn push(&mut self, data: NodeData) -> NodeRef {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = data;
            return NodeRef {
                index,
                generation: slot.generation,
            };
        }
        let len = self.slots.len();
        assert!(
            len < u32::MAX as usize,
            "node index overflow: {len} (max={})",
            u32::MAX
        );
        self.slots.push(Slot {
            data,
            generation: 0,
            parent: None,
            first: None,
            last: None,
            prev: None,
            next: None,
        });
        NodeRef {
            index: len as u32,
            generation: 0,
        }
    }

    #[inline]
    fn slot(&self, node: NodeRef) -> &Slot {
        let slot = &self.slots[node.index()];
        assert_eq!(slot.generation, node.generation, "released node {node:?}");
        slot
    }

    #[inline]
    fn slot_mut(&mut self, node: NodeRef) -> &mut Slot {
        let slot = &mut self.slots[node.index()];
        assert_eq!(slot.generation, node.generation, "released node {node:?}");
        slot
    }

    pub fn create_element(&mut self, tag: &str) -> NodeRef {
        self.push(NodeData::Element {
            tag: tag.to_owned(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeRef {
        self.push(NodeData::Text(text.to_owned()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeRef {
        self.push(NodeData::Comment(text.to_owned()))
    }

    pub fn create_fragment(&mut self) -> NodeRef {
        self.push(NodeData::Fragment)
    }

    /// Number of live nodes, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of arena slots, live or waiting for reuse.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether `node` is live in this document.
    #[must_use]
    pub fn contains(&self, node: NodeRef) -> bool {
        self.slots
            .get(node.index())
            .is_some_and(|slot| slot.generation == node.generation)
    }

    #[must_use]
    pub fn data(&self, node: NodeRef) -> &NodeData {
        &self.slot(node).data
    }

    #[must_use]
    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node).parent
    }

    #[must_use]
    pub fn first_child(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node).first
    }

    #[must_use]
    pub fn last_child(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node).last
    }

    #[must_use]
    pub fn next_sibling(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node).next
    }

    #[must_use]
    pub fn prev_sibling(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node).prev
    }

    #[must_use]
    pub fn is_fragment(&self, node: NodeRef) -> bool {
        matches!(self.data(node), NodeData::Fragment)
    }

    #[must_use]
    pub fn is_comment(&self, node: NodeRef) -> bool {
        matches!(self.data(node), NodeData::Comment(_))
    }

    /// Children of `node` in order.
    pub fn children(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        std::iter::successors(self.first_child(node), move |child| self.next_sibling(*child))
    }

    pub fn set_attribute(&mut self, element: NodeRef, name: &str, value: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.slot_mut(element).data {
            match attributes.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, slot)) => value.clone_into(slot),
                None => attributes.push((name.to_owned(), value.to_owned())),
            }
        }
    }

    #[must_use]
    pub fn attribute(&self, element: NodeRef, name: &str) -> Option<&str> {
        match self.data(element) {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(existing, _)| existing == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Text of a text or comment node.
    #[must_use]
    pub fn text(&self, node: NodeRef) -> Option<&str> {
        match self.data(node) {
            NodeData::Text(text) | NodeData::Comment(text) => Some(text),
            _ => None,
        }
    }

    /// Replace the text of a text or comment node. Returns `true` when the
    /// content changed.
    pub fn set_text(&mut self, node: NodeRef, value: &str) -> bool {
        match &mut self.slot_mut(node).data {
            NodeData::Text(text) | NodeData::Comment(text) if text.as_str() != value => {
                value.clone_into(text);
                true
            }
            _ => false,
        }
    }

    /// Concatenated text of every text node under `node`.
    #[must_use]
    pub fn text_content(&self, node: NodeRef) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match self.data(node) {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Comment(_) => {}
                NodeData::Element { .. } | NodeData::Fragment => {
                    self.push_children_reversed(node, &mut stack);
                }
            }
        }
        out
    }

    /// Push the children of `node` so that popping yields them in order.
    fn push_children_reversed(&self, node: NodeRef, stack: &mut Vec<NodeRef>) {
        let mut child = self.last_child(node);
        while let Some(current) = child {
            stack.push(current);
            child = self.prev_sibling(current);
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Unlink `node` from its parent. No-op for detached nodes.
    pub fn remove(&mut self, node: NodeRef) {
        let &Slot {
            parent, prev, next, ..
        } = self.slot(node);
        let Some(parent) = parent else {
            return;
        };
        match prev {
            Some(prev) => self.slot_mut(prev).next = next,
            None => self.slot_mut(parent).first = next,
        }
        match next {
            Some(next) => self.slot_mut(next).prev = prev,
            None => self.slot_mut(parent).last = prev,
        }
        let slot = self.slot_mut(node);
        slot.parent = None;
        slot.prev = None;
        slot.next = None;
    }

    /// Insert `child` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. A fragment contributes its children instead.
    pub fn insert_before(&mut self, parent: NodeRef, child: NodeRef, reference: Option<NodeRef>) {
        if self.is_fragment(child) {
            while let Some(grandchild) = self.first_child(child) {
                self.insert_before(parent, grandchild, reference);
            }
            return;
        }
        self.remove(child);
        let prev = match reference {
            Some(reference) => self.prev_sibling(reference),
            None => self.last_child(parent),
        };
        {
            let slot = self.slot_mut(child);
            slot.parent = Some(parent);
            slot.prev = prev;
            slot.next = reference;
        }
        match prev {
            Some(prev) => self.slot_mut(prev).next = Some(child),
            None => self.slot_mut(parent).first = Some(child),
        }
        match reference {
            Some(reference) => self.slot_mut(reference).prev = Some(child),
            None => self.slot_mut(parent).last = Some(child),
        }
    }

    pub fn append_child(&mut self, parent: NodeRef, child: NodeRef) {
        self.insert_before(parent, child, None);
    }

    /// Insert `node` immediately before `sibling`. Returns `false` if
    /// `sibling` is detached.
    pub fn insert_sibling_before(&mut self, sibling: NodeRef, node: NodeRef) -> bool {
        let Some(parent) = self.parent(sibling) else {
            return false;
        };
        self.insert_before(parent, node, Some(sibling));
        true
    }

    /// Insert `node` immediately after `sibling`. Returns `false` if
    /// `sibling` is detached.
    pub fn insert_sibling_after(&mut self, sibling: NodeRef, node: NodeRef) -> bool {
        let Some(parent) = self.parent(sibling) else {
            return false;
        };
        let next = self.next_sibling(sibling);
        self.insert_before(parent, node, next);
        true
    }

    /// Put `replacement` where `node` is. Returns `false` if `node` is
    /// detached.
    pub fn replace(&mut self, node: NodeRef, replacement: NodeRef) -> bool {
        if !self.insert_sibling_before(node, replacement) {
            return false;
        }
        self.remove(node);
        true
    }

    /// Unlink `node` and free it with its whole subtree. Returns the number
    /// of nodes freed; a released or foreign handle frees nothing.
    pub fn release(&mut self, node: NodeRef) -> usize {
        if !self.contains(node) {
            return 0;
        }
        self.remove(node);
        let mut freed = 0;
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            self.push_children_reversed(current, &mut stack);
            let slot = self.slot_mut(current);
            slot.data = NodeData::Fragment;
            slot.generation = slot.generation.wrapping_add(1);
            slot.parent = None;
            slot.first = None;
            slot.last = None;
            slot.prev = None;
            slot.next = None;
            self.free.push(current.index);
            freed += 1;
        }
        freed
    }

    // -----------------------------------------------------------------------
    // Traversal and copying
    // -----------------------------------------------------------------------

    /// Next node after `node` in document order, staying inside `root`.
    #[must_use]
    pub fn next_in_order(&self, node: NodeRef, root: NodeRef) -> Option<NodeRef> {
        if let Some(child) = self.first_child(node) {
            return Some(child);
        }
        let mut current = node;
        loop {
            if current == root {
                return None;
            }
            if let Some(next) = self.next_sibling(current) {
                return Some(next);
            }
            current = self.parent(current)?;
        }
    }

    /// Deep-copy `node` from `source` into this document. The copy is
    /// detached.
    pub fn import(&mut self, source: &Document, node: NodeRef) -> NodeRef {
        let copy = self.push(source.data(node).clone());
        let mut stack: Vec<(NodeRef, NodeRef)> = Vec::new();
        let mut children = Vec::new();
        source.push_children_reversed(node, &mut children);
        stack.extend(children.drain(..).map(|child| (child, copy)));
        while let Some((original, parent)) = stack.pop() {
            let child_copy = self.push(source.data(original).clone());
            self.append_child(parent, child_copy);
            source.push_children_reversed(original, &mut children);
            stack.extend(children.drain(..).map(|child| (child, child_copy)));
        }
        copy
    }

    /// Deep copy within this document.
    pub fn clone_node(&mut self, node: NodeRef) -> NodeRef {
        let snapshot = self.clone();
        self.import(&snapshot, node)
    }

    /// Serialize `node` back to markup.
    #[must_use]
    pub fn to_markup(&self, node: NodeRef) -> String {
        let mut out = String::new();
        let mut stack = vec![Markup::Node(node)];
        let mut children = Vec::new();
        while let Some(step) = stack.pop() {
            let node = match step {
                Markup::Close(tag) => {
                    let _ = write!(out, "</{tag}>");
                    continue;
                }
                Markup::Node(node) => node,
            };
            match self.data(node) {
                NodeData::Text(text) => out.push_str(&escape(text, false)),
                NodeData::Comment(text) => {
                    let _ = write!(out, "<!--{text}-->");
                }
                NodeData::Fragment => {}
                NodeData::Element { tag, attributes } => {
                    out.push('<');
                    out.push_str(tag);
                    for (name, value) in attributes {
                        if value.is_empty() {
                            let _ = write!(out, " {name}");
                        } else {
                            let _ = write!(out, " {name}=\"{}\"", escape(value, true));
                        }
                    }
                    out.push('>');
                    if VOID_ELEMENTS.contains(&tag.as_str()) {
                        continue;
                    }
                    stack.push(Markup::Close(tag.as_str()));
                }
            }
            self.push_children_reversed(node, &mut children);
            stack.extend(children.drain(..).map(Markup::Node));
        }
        out
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
