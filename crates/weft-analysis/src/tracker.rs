#![forbid(unsafe_code)]

//! Reference tracking.
//!
//! For every declaring tag the tracker creates the sources it introduces and
//! visits every resolved occurrence of their bindings. Each occurrence is
//! walked outward to find:
//!
//! - the *read root*: the outermost static member chain over the identifier,
//!   which fixes the property path read;
//! - the *function root*: the innermost function around the read, if the read
//!   sits inside one before reaching template level;
//! - the *expression root*: the outermost expression owned by a template
//!   node, which accumulates the reference set.
//!
//! The read is then resolved through aliases, interned, and added to the
//! expression root's set. Reads from a section other than the source's own
//! record a closure edge.

use tracing::{debug, debug_span};

use crate::alias::resolve_aliases;
use crate::context::CompilationContext;
use crate::error::{AnalysisError, Result};
use crate::model::{Aliases, PropertyPath, Reference, ReferenceId, SourceId, SourceKind, Source};
use crate::tree::{NodeId, NodeKind};

/// Sources created by [`CompilationContext::track_references`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackedSources {
    /// Source of the tag variable.
    pub var: Option<SourceId>,
    /// Source of the body parameters.
    pub params: Option<SourceId>,
}

impl CompilationContext<'_> {
    /// Track the variable and body parameters declared by `tag`.
    ///
    /// The tag variable becomes one source of `kind` with `var_aliases`; each
    /// identifier of its pattern is tracked with the property path of its
    /// position in the pattern. Body parameters become one
    /// [`SourceKind::Param`] source when the body has both parameters and
    /// children; parameter `i` contributes the leading path segment `"i"`.
    ///
    /// # Errors
    ///
    /// Fails when `tag` is not a tag, when a declared name has no binding at
    /// its site, or when alias resolution exceeds the configured depth.
    pub fn track_references(
        &mut self,
        tag: NodeId,
        var_aliases: Aliases,
        kind: SourceKind,
    ) -> Result<TrackedSources> {
        let tree = self.tree;
        let NodeKind::Tag { var, body, name, .. } = tree.kind(tag) else {
            return Err(AnalysisError::NotABindingSite { node: tag });
        };
        let _span = debug_span!("analysis.track", tag = %name, node = tag.index()).entered();
        let mut tracked = TrackedSources::default();

        if let Some(var) = *var {
            let source = self.create_source(tag, var_aliases, kind);
            self.analysis.facts_mut(tag).source = Some(source);
            tracked.var = Some(source);
            for (identifier, property) in tree.binding_identifiers(var, &PropertyPath::empty()) {
                self.analysis.facts_mut(identifier).source = Some(source);
                let name = tree
                    .identifier_name(identifier)
                    .ok_or(AnalysisError::NotABindingSite { node: identifier })?;
                self.track_references_for_binding(tag, name, &property)?;
            }
        }

        let body = *body;
        if let NodeKind::TagBody { params, children } = tree.kind(body)
            && !params.is_empty()
            && !children.is_empty()
        {
            let source = self.create_source(body, Aliases::Empty, SourceKind::Param);
            self.analysis.facts_mut(body).source = Some(source);
            tracked.params = Some(source);
            for (index, param) in params.iter().enumerate() {
                let prefix = PropertyPath::name(index.to_string());
                for (identifier, property) in tree.binding_identifiers(*param, &prefix) {
                    self.analysis.facts_mut(identifier).source = Some(source);
                    let name = tree
                        .identifier_name(identifier)
                        .ok_or(AnalysisError::NotABindingSite { node: identifier })?;
                    self.track_references_for_binding(body, name, &property)?;
                }
            }
        }

        Ok(tracked)
    }

    /// Track the component `input` declared at the program.
    ///
    /// Returns `None` when the tree declares no `input`.
    ///
    /// # Errors
    ///
    /// Propagates alias resolution failures.
    pub fn track_input(&mut self) -> Result<Option<SourceId>> {
        let tree = self.tree;
        let root = tree.root();
        let Some(binding) = tree.binding(root, "input") else {
            return Ok(None);
        };
        let source = self.create_source(root, Aliases::Empty, SourceKind::Input);
        self.analysis.facts_mut(root).source = Some(source);
        self.analysis.facts_mut(binding.declaration).source = Some(source);
        let _span = debug_span!("analysis.track", tag = "input", node = root.index()).entered();
        self.track_references_for_binding(root, "input", &PropertyPath::empty())?;
        Ok(Some(source))
    }

    /// Track every occurrence of the binding `name` declared at `site`, whose
    /// source is already recorded on `site`. `property` is the path of the
    /// binding inside its source.
    ///
    /// Read occurrences are always tracked. An assignment is tracked only
    /// when it is compound (`+=` and friends) with a bare identifier on the
    /// left, since it reads the old value.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::NotABindingSite`] if `site` carries no source,
    /// [`AnalysisError::UnknownBinding`] if `name` is not declared there.
    pub fn track_references_for_binding(
        &mut self,
        site: NodeId,
        name: &str,
        property: &PropertyPath,
    ) -> Result<()> {
        let tree = self.tree;
        let source = self
            .analysis
            .source_of(site)
            .ok_or(AnalysisError::NotABindingSite { node: site })?;
        let binding = tree
            .binding(site, name)
            .ok_or_else(|| AnalysisError::UnknownBinding {
                site,
                name: name.to_owned(),
            })?;

        for &occurrence in &binding.references {
            self.track_reference(occurrence, source, property)?;
        }
        for &violation in &binding.constant_violations {
            if let NodeKind::Assign { op, left, .. } = tree.kind(violation)
                && op.is_compound()
                && matches!(tree.kind(*left), NodeKind::Identifier { .. })
            {
                self.track_reference(*left, source, property)?;
            }
        }
        Ok(())
    }

    fn track_reference(
        &mut self,
        identifier: NodeId,
        source: SourceId,
        property: &PropertyPath,
    ) -> Result<()> {
        let tree = self.tree;
        let fn_root = tree.function_root(identifier);
        let (read_root, read_property) = tree.read_root(identifier);
        let expr_root = tree.expression_root(fn_root.unwrap_or(read_root));
        let section = self.analysis.sections.get_or_create(tree, expr_root);

        let name = tree.identifier_name(identifier).unwrap_or_default();
        let debug_name = if read_property.is_empty() {
            name.to_owned()
        } else {
            format!("{name}[{read_property}]")
        };
        let reference = self.get_reference(Reference {
            source,
            section,
            property: property.concat(&read_property),
            name: debug_name,
        })?;

        let current = self.analysis.references_of(expr_root);
        let added = self.analysis.add_reference(current, reference);
        self.analysis.facts_mut(expr_root).references = Some(added);
        self.analysis.facts_mut(read_root).reference = Some(reference);

        let resolved_source = self.analysis.references.get(reference).source;
        self.analysis.sources[resolved_source.index()]
            .expressions
            .insert(expr_root);

        let owner = self.analysis.sources[source.index()].section;
        if section != owner && self.analysis.sections.add_closure(section, source) {
            debug!(
                message = "analysis.closure",
                section = section.get(),
                source = source.get(),
            );
        }

        let Some(fn_root) = fn_root else {
            return Ok(());
        };
        if fn_root != expr_root {
            let current = self.analysis.references_of(fn_root);
            let added = self.analysis.add_reference(current, reference);
            self.analysis.facts_mut(fn_root).references = Some(added);
        } else if self.config.name_attribute_functions
            && matches!(tree.kind(fn_root), NodeKind::Function { name: None, .. })
            && let Some(parent) = tree.parent(expr_root)
            && let NodeKind::Attribute {
                name,
                default: false,
                ..
            } = tree.kind(parent)
        {
            self.analysis.facts_mut(fn_root).function_name = Some(name.clone());
        }
        Ok(())
    }

    /// Resolve a candidate through aliases and intern the result.
    fn get_reference(&mut self, candidate: Reference) -> Result<ReferenceId> {
        let resolved = resolve_aliases(
            &self.analysis.sources,
            &self.analysis.references,
            candidate,
            self.config.max_alias_depth,
        )?;
        Ok(self.analysis.references.intern(resolved))
    }

    /// Create a source owned by the section of `site`. Ids are sequential
    /// within the compilation unit.
    fn create_source(&mut self, site: NodeId, aliases: Aliases, kind: SourceKind) -> SourceId {
        let section = self.analysis.sections.get_or_create(self.tree, site);
        let id = SourceId::from_index(self.analysis.sources.len());
        self.analysis.sources.push(Source {
            id,
            kind,
            section,
            aliases,
            expressions: Default::default(),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::References;
    use crate::tree::{AssignOp, TagKind, TagSpec, TreeBuilder};

    #[test]
    fn tag_without_var_or_params_creates_nothing() {
        let mut b = TreeBuilder::new();
        let text = b.text("x");
        let tag = b.tag(TagSpec::new("div", TagKind::Native).with_children(vec![text]));
        let tree = b.finish(vec![tag]);
        let mut cx = CompilationContext::new(&tree);
        let tracked = cx
            .track_references(tag, Aliases::Empty, SourceKind::Derived)
            .expect("tracks");
        assert_eq!(tracked, TrackedSources::default());
        assert!(cx.analysis().sources().is_empty());
    }

    #[test]
    fn non_tag_is_rejected() {
        let mut b = TreeBuilder::new();
        let text = b.text("x");
        let tree = b.finish(vec![text]);
        let mut cx = CompilationContext::new(&tree);
        let err = cx
            .track_references(text, Aliases::Empty, SourceKind::Derived)
            .expect_err("text is not a tag");
        assert_eq!(err, AnalysisError::NotABindingSite { node: text });
    }

    #[test]
    fn unknown_binding_is_reported() {
        let mut b = TreeBuilder::new();
        let x = b.declare("x");
        let tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(x.node));
        let tree = b.finish(vec![tag]);
        let mut cx = CompilationContext::new(&tree);
        cx.track_references(tag, Aliases::Empty, SourceKind::Let)
            .expect("tracks");
        let err = cx
            .track_references_for_binding(tag, "y", &PropertyPath::empty())
            .expect_err("y is not declared");
        assert!(matches!(err, AnalysisError::UnknownBinding { .. }));
    }

    #[test]
    fn plain_assignment_is_not_a_read() {
        let mut b = TreeBuilder::new();
        let count = b.declare("count");
        let left = b.ident(count.binding);
        let one = b.number(1.0);
        let assign = b.assign(AssignOp::Assign, left, one);
        let handler = b.function(None, Vec::new(), assign);
        let on_click = b.attribute("onClick", handler);
        let button = b.tag(TagSpec::new("button", TagKind::Native).with_attribute(on_click));
        let tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(count.node));
        let tree = b.finish(vec![tag, button]);

        let mut cx = CompilationContext::new(&tree);
        cx.track_references(tag, Aliases::Empty, SourceKind::Let)
            .expect("tracks");
        assert_eq!(cx.analysis().references_of(handler), None);
        assert!(cx.analysis().reference_table().is_empty());
    }

    #[test]
    fn nested_function_reads_also_land_on_the_function() {
        let mut b = TreeBuilder::new();
        let x = b.declare("x");
        let read = b.ident(x.binding);
        let inner = b.function(None, Vec::new(), read);
        let callee = b.free_ident("run");
        let call = b.call(callee, vec![inner]);
        let placeholder = b.placeholder(call);
        let tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(x.node));
        let tree = b.finish(vec![tag, placeholder]);

        let mut cx = CompilationContext::new(&tree);
        cx.track_references(tag, Aliases::Empty, SourceKind::Let)
            .expect("tracks");
        let analysis = cx.finish();
        let on_call = analysis.references_of(call).expect("expression root");
        let on_fn = analysis.references_of(inner).expect("function root");
        assert_eq!(on_call, on_fn);
        assert!(matches!(on_call, References::One(_)));
        assert_eq!(analysis.function_name(inner), None);
    }
}
