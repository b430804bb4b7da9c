#![forbid(unsafe_code)]

//! Resolved template tree consumed by the analysis.
//!
//! The tracker never parses source text. It walks a [`Tree`]: an arena of
//! template-level nodes (program, tags, tag bodies, attributes, placeholders)
//! and expression nodes, with parent links and a binding table in which every
//! read occurrence and every constant violation of a declared name has
//! already been resolved.
//!
//! Trees are assembled bottom-up with [`TreeBuilder`]. A node receives its
//! parent when the node that contains it is created.
//!
//! # Invariants
//!
//! 1. Every node except the program root has exactly one parent once
//!    [`TreeBuilder::finish`] returns.
//! 2. The identifier on the left of an assignment is never listed as a read
//!    occurrence; the assignment node is listed as a constant violation
//!    instead.
//! 3. A binding is visible through [`Tree::binding`] only at the site that
//!    declared it (tag for tag variables, tag body for parameters, program
//!    for `input`).

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::model::PropertyPath;

/// Stable identifier of a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// # Panics
    ///
    /// Past `u32::MAX` nodes in one tree.
    fn from_index(index: usize) -> Self {
        Self(checked_id(index, "NodeId"))
    }
}

fn checked_id(index: usize, kind: &str) -> u32 {
    assert!(
        index <= u32::MAX as usize,
        "{kind} overflow: {index} (max={})",
        u32::MAX
    );
    index as u32
}

/// Identifier of a resolved binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(u32);

impl BindingId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a tag participates in section creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Plain markup element. Its body shares the enclosing section.
    Native,
    /// Control-flow or declaration tag (`if`, `for`, `let`, `const`, ...).
    Core,
    /// User component. Its body content is its own section.
    Custom,
}

/// Property of a member expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    /// `object.name`
    Named(String),
    /// `object[expr]`
    Computed(NodeId),
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Rem,
    /// `||=`
    Or,
    /// `&&=`
    And,
    /// `??=`
    Nullish,
}

impl AssignOp {
    /// Whether the operator reads the old value before writing.
    #[must_use]
    pub const fn is_compound(self) -> bool {
        !matches!(self, Self::Assign)
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program {
        body: Vec<NodeId>,
    },
    Tag {
        name: String,
        kind: TagKind,
        var: Option<NodeId>,
        attributes: Vec<NodeId>,
        body: NodeId,
    },
    TagBody {
        params: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Attribute {
        name: String,
        value: NodeId,
        /// The unnamed `<tag=value>` attribute.
        default: bool,
    },
    Placeholder {
        value: NodeId,
    },
    Text(String),
    Identifier {
        name: String,
        binding: Option<BindingId>,
    },
    StringLiteral(String),
    NumericLiteral(f64),
    Member {
        object: NodeId,
        property: MemberProperty,
    },
    Binary {
        operator: String,
        left: NodeId,
        right: NodeId,
    },
    Call {
        callee: NodeId,
        arguments: Vec<NodeId>,
    },
    Assign {
        op: AssignOp,
        left: NodeId,
        right: NodeId,
    },
    Function {
        name: Option<String>,
        params: Vec<NodeId>,
        body: NodeId,
    },
    ObjectPattern(Vec<(String, NodeId)>),
    ArrayPattern(Vec<Option<NodeId>>),
}

impl NodeKind {
    /// Template-level nodes bound the expressions they contain.
    #[must_use]
    pub const fn is_template(&self) -> bool {
        matches!(
            self,
            Self::Program { .. }
                | Self::Tag { .. }
                | Self::TagBody { .. }
                | Self::Attribute { .. }
                | Self::Placeholder { .. }
                | Self::Text(_)
        )
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
}

/// A declared name with every resolved occurrence.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    /// Declaring identifier inside the pattern.
    pub declaration: NodeId,
    /// Tag, tag body or program that owns the declaration.
    pub site: Option<NodeId>,
    /// Read occurrences.
    pub references: Vec<NodeId>,
    /// Assignment nodes whose left side is this binding.
    pub constant_violations: Vec<NodeId>,
}

/// Resolved template tree.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    bindings: Vec<Binding>,
    by_site: AHashMap<(NodeId, String), BindingId>,
    root: NodeId,
}

impl Tree {
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.index()].kind
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    /// Look up the binding `name` declared at `site`.
    #[must_use]
    pub fn binding(&self, site: NodeId, name: &str) -> Option<&Binding> {
        self.by_site
            .get(&(site, name.to_owned()))
            .map(|id| &self.bindings[id.index()])
    }

    #[must_use]
    pub fn binding_by_id(&self, id: BindingId) -> &Binding {
        &self.bindings[id.index()]
    }

    /// Name of an identifier node.
    #[must_use]
    pub fn identifier_name(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Identifier { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether this node opens its own section.
    ///
    /// The program is always a boundary; a tag body is one unless its tag is
    /// a native element.
    #[must_use]
    pub fn is_section_boundary(&self, node: NodeId) -> bool {
        match self.kind(node) {
            NodeKind::Program { .. } => true,
            NodeKind::TagBody { .. } => self.parent(node).is_some_and(|tag| {
                matches!(
                    self.kind(tag),
                    NodeKind::Tag { kind, .. } if *kind != TagKind::Native
                )
            }),
            _ => false,
        }
    }

    /// Nearest section boundary at or above `node`.
    #[must_use]
    pub fn section_boundary(&self, node: NodeId) -> NodeId {
        let mut current = node;
        loop {
            if self.is_section_boundary(current) {
                return current;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Walk outward from an identifier through static member accesses.
    ///
    /// Returns the outermost member expression of the chain together with
    /// the accessed property path. `a.b["c"]` yields `["b", "c"]`; a computed
    /// key that is not a string literal ends the chain.
    #[must_use]
    pub fn read_root(&self, identifier: NodeId) -> (NodeId, PropertyPath) {
        let mut current = identifier;
        let mut property = PropertyPath::empty();
        while let Some(parent) = self.parent(current) {
            let NodeKind::Member {
                object,
                property: member,
            } = self.kind(parent)
            else {
                break;
            };
            if *object != current {
                break;
            }
            match member {
                MemberProperty::Named(name) => property.push(name.clone()),
                MemberProperty::Computed(key) => match self.kind(*key) {
                    NodeKind::StringLiteral(value) => property.push(value.clone()),
                    _ => break,
                },
            }
            current = parent;
        }
        (current, property)
    }

    /// Innermost function enclosing `node` within its template-level owner.
    #[must_use]
    pub fn function_root(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.parent(node)?;
        loop {
            let kind = self.kind(current);
            if kind.is_template() {
                return None;
            }
            if matches!(kind, NodeKind::Function { .. }) {
                return Some(current);
            }
            current = self.parent(current)?;
        }
    }

    /// Outermost expression containing `node` whose parent is a
    /// template-level node.
    #[must_use]
    pub fn expression_root(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            if self.kind(parent).is_template() {
                break;
            }
            current = parent;
        }
        current
    }

    /// Every identifier declared by `pattern`, with the property path of its
    /// position inside the pattern appended to `prefix`.
    #[must_use]
    pub fn binding_identifiers(
        &self,
        pattern: NodeId,
        prefix: &PropertyPath,
    ) -> SmallVec<[(NodeId, PropertyPath); 4]> {
        let mut out = SmallVec::new();
        self.collect_binding_identifiers(pattern, prefix.clone(), &mut out);
        out
    }

    fn collect_binding_identifiers(
        &self,
        pattern: NodeId,
        prefix: PropertyPath,
        out: &mut SmallVec<[(NodeId, PropertyPath); 4]>,
    ) {
        match self.kind(pattern) {
            NodeKind::Identifier { .. } => out.push((pattern, prefix)),
            NodeKind::ObjectPattern(entries) => {
                for (key, value) in entries {
                    let mut path = prefix.clone();
                    path.push(key.clone());
                    self.collect_binding_identifiers(*value, path, out);
                }
            }
            NodeKind::ArrayPattern(elements) => {
                for (index, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let mut path = prefix.clone();
                        path.push(index.to_string());
                        self.collect_binding_identifiers(*element, path, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// A freshly declared name: its binding and its declaring identifier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared {
    pub binding: BindingId,
    pub node: NodeId,
}

/// Bottom-up constructor for [`Tree`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    bindings: Vec<Binding>,
    input: Option<BindingId>,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node { kind, parent: None });
        id
    }

    fn adopt(&mut self, parent: NodeId, child: NodeId) {
        let slot = &mut self.nodes[child.index()].parent;
        debug_assert!(slot.is_none(), "node {child:?} attached twice");
        *slot = Some(parent);
    }

    fn adopt_all(&mut self, parent: NodeId, children: &[NodeId]) {
        for &child in children {
            self.adopt(parent, child);
        }
    }

    /// Declare a name. The site is assigned when the pattern containing the
    /// identifier is attached to a tag, a tag body or the program.
    pub fn declare(&mut self, name: &str) -> Declared {
        let binding = BindingId(checked_id(self.bindings.len(), "BindingId"));
        let node = self.push(NodeKind::Identifier {
            name: name.to_owned(),
            binding: Some(binding),
        });
        self.bindings.push(Binding {
            name: name.to_owned(),
            declaration: node,
            site: None,
            references: Vec::new(),
            constant_violations: Vec::new(),
        });
        Declared { binding, node }
    }

    /// Declare the program-level `input` binding.
    pub fn declare_input(&mut self) -> Declared {
        let declared = self.declare("input");
        self.input = Some(declared.binding);
        declared
    }

    /// A read occurrence of `binding`.
    pub fn ident(&mut self, binding: BindingId) -> NodeId {
        let name = self.bindings[binding.index()].name.clone();
        let node = self.push(NodeKind::Identifier {
            name,
            binding: Some(binding),
        });
        self.bindings[binding.index()].references.push(node);
        node
    }

    /// An identifier that resolves to nothing tracked (globals).
    pub fn free_ident(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Identifier {
            name: name.to_owned(),
            binding: None,
        })
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.push(NodeKind::StringLiteral(value.to_owned()))
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::NumericLiteral(value))
    }

    /// `object.name`
    pub fn member(&mut self, object: NodeId, name: &str) -> NodeId {
        let node = self.push(NodeKind::Member {
            object,
            property: MemberProperty::Named(name.to_owned()),
        });
        self.adopt(node, object);
        node
    }

    /// `object[key]`
    pub fn computed(&mut self, object: NodeId, key: NodeId) -> NodeId {
        let node = self.push(NodeKind::Member {
            object,
            property: MemberProperty::Computed(key),
        });
        self.adopt(node, object);
        self.adopt(node, key);
        node
    }

    pub fn binary(&mut self, operator: &str, left: NodeId, right: NodeId) -> NodeId {
        let node = self.push(NodeKind::Binary {
            operator: operator.to_owned(),
            left,
            right,
        });
        self.adopt_all(node, &[left, right]);
        node
    }

    pub fn call(&mut self, callee: NodeId, arguments: Vec<NodeId>) -> NodeId {
        let node = self.push(NodeKind::Call {
            callee,
            arguments: arguments.clone(),
        });
        self.adopt(node, callee);
        self.adopt_all(node, &arguments);
        node
    }

    /// Assignment. A bound identifier on the left becomes a constant
    /// violation of its binding rather than a read occurrence.
    pub fn assign(&mut self, op: AssignOp, left: NodeId, right: NodeId) -> NodeId {
        let node = self.push(NodeKind::Assign { op, left, right });
        self.adopt_all(node, &[left, right]);
        if let NodeKind::Identifier {
            binding: Some(binding),
            ..
        } = self.nodes[left.index()].kind
        {
            let entry = &mut self.bindings[binding.index()];
            entry.references.retain(|occurrence| *occurrence != left);
            entry.constant_violations.push(node);
        }
        node
    }

    pub fn function(&mut self, name: Option<&str>, params: Vec<NodeId>, body: NodeId) -> NodeId {
        let node = self.push(NodeKind::Function {
            name: name.map(str::to_owned),
            params: params.clone(),
            body,
        });
        self.adopt_all(node, &params);
        self.adopt(node, body);
        node
    }

    pub fn object_pattern(&mut self, entries: Vec<(&str, NodeId)>) -> NodeId {
        let owned: Vec<(String, NodeId)> = entries
            .iter()
            .map(|(key, value)| ((*key).to_owned(), *value))
            .collect();
        let node = self.push(NodeKind::ObjectPattern(owned));
        for (_, value) in entries {
            self.adopt(node, value);
        }
        node
    }

    pub fn array_pattern(&mut self, elements: Vec<Option<NodeId>>) -> NodeId {
        let node = self.push(NodeKind::ArrayPattern(elements.clone()));
        for element in elements.into_iter().flatten() {
            self.adopt(node, element);
        }
        node
    }

    pub fn text(&mut self, value: &str) -> NodeId {
        self.push(NodeKind::Text(value.to_owned()))
    }

    /// `${value}`
    pub fn placeholder(&mut self, value: NodeId) -> NodeId {
        let node = self.push(NodeKind::Placeholder { value });
        self.adopt(node, value);
        node
    }

    pub fn attribute(&mut self, name: &str, value: NodeId) -> NodeId {
        self.attribute_node(name, value, false)
    }

    /// The unnamed `<tag=value>` attribute.
    pub fn default_attribute(&mut self, value: NodeId) -> NodeId {
        self.attribute_node("value", value, true)
    }

    fn attribute_node(&mut self, name: &str, value: NodeId, default: bool) -> NodeId {
        let node = self.push(NodeKind::Attribute {
            name: name.to_owned(),
            value,
            default,
        });
        self.adopt(node, value);
        node
    }

    /// A tag with an optional variable pattern, attributes, body params and
    /// body children.
    pub fn tag(&mut self, spec: TagSpec) -> NodeId {
        let TagSpec {
            name,
            kind,
            var,
            attributes,
            params,
            children,
        } = spec;
        let body = self.push(NodeKind::TagBody {
            params: params.clone(),
            children: children.clone(),
        });
        self.adopt_all(body, &params);
        self.adopt_all(body, &children);
        let tag = self.push(NodeKind::Tag {
            name,
            kind,
            var,
            attributes: attributes.clone(),
            body,
        });
        self.adopt_all(tag, &attributes);
        self.adopt(tag, body);
        if let Some(var) = var {
            self.adopt(tag, var);
            self.assign_sites(var, tag);
        }
        for param in params {
            self.assign_sites(param, body);
        }
        tag
    }

    fn assign_sites(&mut self, pattern: NodeId, site: NodeId) {
        match self.nodes[pattern.index()].kind.clone() {
            NodeKind::Identifier {
                binding: Some(binding),
                ..
            } => self.bindings[binding.index()].site = Some(site),
            NodeKind::ObjectPattern(entries) => {
                for (_, value) in entries {
                    self.assign_sites(value, site);
                }
            }
            NodeKind::ArrayPattern(elements) => {
                for element in elements.into_iter().flatten() {
                    self.assign_sites(element, site);
                }
            }
            _ => {}
        }
    }

    /// Wrap `body` in the program node and seal the tree.
    #[must_use]
    pub fn finish(mut self, body: Vec<NodeId>) -> Tree {
        let root = self.push(NodeKind::Program { body: body.clone() });
        self.adopt_all(root, &body);
        if let Some(input) = self.input {
            let declaration = self.bindings[input.index()].declaration;
            self.adopt(root, declaration);
            self.bindings[input.index()].site = Some(root);
        }
        let by_site = self
            .bindings
            .iter()
            .enumerate()
            .filter_map(|(index, binding)| {
                let site = binding.site?;
                let id = BindingId(checked_id(index, "BindingId"));
                Some(((site, binding.name.clone()), id))
            })
            .collect();
        Tree {
            nodes: self.nodes,
            bindings: self.bindings,
            by_site,
            root,
        }
    }
}

/// Arguments for [`TreeBuilder::tag`].
#[derive(Debug, Clone)]
pub struct TagSpec {
    pub name: String,
    pub kind: TagKind,
    pub var: Option<NodeId>,
    pub attributes: Vec<NodeId>,
    pub params: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

impl TagSpec {
    #[must_use]
    pub fn new(name: &str, kind: TagKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            var: None,
            attributes: Vec::new(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_var(mut self, var: NodeId) -> Self {
        self.var = Some(var);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: NodeId) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<NodeId>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
