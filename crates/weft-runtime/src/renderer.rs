#![forbid(unsafe_code)]

//! Renderers and render results.
//!
//! A [`Renderer`] is the compiled, reusable part of a template: markup, walk
//! string, render callback, scope size, effects and optional dynamic
//! boundaries. It parses its markup once, on first use, and deep-clones the
//! parsed source for every instance.
//!
//! A [`RenderFn`] pairs a renderer with the callback that maps component
//! input onto scope slots. Calling it creates a scope, instantiates the
//! template, applies the input and flushes, producing a [`RenderResult`] that
//! can be updated with new input or destroyed.
//!
//! # Invariants
//!
//! 1. The source subtree is parsed at most once per renderer.
//! 2. Each instance gets its own [`Scope`]; renderers are never mutated by
//!    rendering.
//! 3. A destroyed result rejects further updates with
//!    [`RuntimeError::Destroyed`].
//! 4. Nodes cloned for an instance are released back to the document when
//!    the instance is destroyed or fails to render.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, debug_span, warn};

use crate::dom::{Document, Dom, NodeRef};
use crate::effect::{Cx, EffectFn, EffectTable};
use crate::error::{Result, RuntimeError};
use crate::scope::{Boundary, Locator, Scope};
use crate::template::parse_template;
use crate::walker::{needs_fragment, trim_walk_string, walk};

/// Component input: named values.
pub type Input = Map<String, Value>;

/// Runs once per instance, after the walk.
pub type RenderCallback = Rc<dyn Fn(&mut Cx<'_>) -> Result<()>>;

/// Maps input onto scope slots, on first render and on every update.
pub type DynamicInput = Rc<dyn Fn(&mut Cx<'_>, &Input) -> Result<()>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Builder for a [`Renderer`].
///
/// The default configuration has no template; cloning from the renderer it
/// builds fails with [`RuntimeError::MissingTemplate`].
#[derive(Clone, Default)]
pub struct RendererConfig {
    template: Option<String>,
    walks: String,
    render: Option<RenderCallback>,
    size: usize,
    effects: EffectTable,
    dynamic_start: Option<(Locator, usize)>,
    dynamic_end: Option<(Locator, usize)>,
}

impl RendererConfig {
    /// Walk string for each instance. Trailing navigation is trimmed.
    #[must_use]
    pub fn with_walks(mut self, walks: &str) -> Self {
        self.walks = trim_walk_string(walks).to_owned();
        self
    }

    #[must_use]
    pub fn with_render(mut self, render: RenderCallback) -> Self {
        self.render = Some(render);
        self
    }

    /// Number of value slots each scope gets.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Register an effect on `slots`.
    #[must_use]
    pub fn with_effect(mut self, name: &str, slots: &[usize], run: EffectFn) -> Self {
        self.effects.register(name, slots, run);
        self
    }

    /// Locate the first node at runtime instead of using the clone's first
    /// node.
    #[must_use]
    pub fn with_dynamic_start(mut self, locate: Locator, offset: usize) -> Self {
        self.dynamic_start = Some((locate, offset));
        self
    }

    /// Locate the last node at runtime instead of using the clone's last
    /// node.
    #[must_use]
    pub fn with_dynamic_end(mut self, locate: Locator, offset: usize) -> Self {
        self.dynamic_end = Some((locate, offset));
        self
    }

    #[must_use]
    pub fn build(self) -> Renderer {
        Renderer {
            template: self.template,
            walks: self.walks,
            render: self.render,
            size: self.size,
            effects: self.effects,
            dynamic_start: self.dynamic_start,
            dynamic_end: self.dynamic_end,
            source: RefCell::new(None),
        }
    }
}

impl fmt::Debug for RendererConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererConfig")
            .field("template", &self.template)
            .field("walks", &self.walks)
            .field("size", &self.size)
            .field("effects", &self.effects.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

pub struct Renderer {
    template: Option<String>,
    walks: String,
    render: Option<RenderCallback>,
    size: usize,
    effects: EffectTable,
    dynamic_start: Option<(Locator, usize)>,
    dynamic_end: Option<(Locator, usize)>,
    source: RefCell<Option<(Document, NodeRef)>>,
}

impl Renderer {
    #[must_use]
    pub fn builder(template: impl Into<String>) -> RendererConfig {
        RendererConfig {
            template: Some(template.into()),
            ..RendererConfig::default()
        }
    }

    #[must_use]
    pub fn walks(&self) -> &str {
        &self.walks
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn effects(&self) -> &EffectTable {
        &self.effects
    }

    /// Whether the source subtree has been parsed yet.
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        self.source.borrow().is_some()
    }

    /// Deep-clone the template into `doc`, parsing it on first use. The
    /// clone is detached.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::MissingTemplate`] without template text, and
    /// [`RuntimeError::Template`] for malformed markup.
    pub fn clone_into(&self, doc: &mut Document) -> Result<NodeRef> {
        let mut source = self.source.borrow_mut();
        if source.is_none() {
            let template = self.template.as_deref().ok_or(RuntimeError::MissingTemplate)?;
            let mut parsed = Document::new();
            let root = parse_template(&mut parsed, template, needs_fragment(&self.walks))?;
            debug!(
                message = "runtime.template.parsed",
                nodes = parsed.len(),
                fragment = parsed.is_fragment(root),
            );
            *source = Some((parsed, root));
        }
        let Some((parsed, root)) = source.as_ref() else {
            return Err(RuntimeError::MissingTemplate);
        };
        Ok(doc.import(parsed, *root))
    }

    /// Execution context for one scope of this renderer.
    pub fn cx<'a>(&'a self, scope: &'a mut Scope, doc: &'a mut Document) -> Cx<'a> {
        Cx::new(scope, doc, &self.effects)
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("template", &self.template)
            .field("walks", &self.walks)
            .field("size", &self.size)
            .field("effects", &self.effects.len())
            .field("parsed", &self.is_parsed())
            .finish_non_exhaustive()
    }
}

/// Instantiate `renderer` into `doc` for `scope`: clone, walk, record the
/// boundaries, run the render callback, then install dynamic boundaries.
/// Returns the clone's root.
///
/// # Errors
///
/// Propagates clone, walk and render callback errors. On error the clone is
/// released.
pub fn init_renderer(renderer: &Renderer, scope: &mut Scope, doc: &mut Document) -> Result<NodeRef> {
    let root = renderer.clone_into(doc)?;
    if let Err(err) = instantiate(renderer, scope, doc, root) {
        doc.release(root);
        return Err(err);
    }
    Ok(root)
}

fn instantiate(
    renderer: &Renderer,
    scope: &mut Scope,
    doc: &mut Document,
    root: NodeRef,
) -> Result<()> {
    let fragment = doc.is_fragment(root);
    let start = if fragment { doc.first_child(root) } else { Some(root) };
    walk(doc, root, start, &renderer.walks, scope)?;

    // Markers inserted around top-level nodes belong to the instance.
    let (first, last) = if fragment {
        (doc.first_child(root), doc.last_child(root))
    } else {
        (Some(root), Some(root))
    };
    scope.set_start(first.map_or(Boundary::Unset, Boundary::Node));
    scope.set_end(last.map_or(Boundary::Unset, Boundary::Node));

    if let Some(render) = &renderer.render {
        render(&mut renderer.cx(scope, doc))?;
    }

    if let Some((locate, offset)) = &renderer.dynamic_start {
        scope.set_start(Boundary::Dynamic {
            locate: Rc::clone(locate),
            offset: *offset,
        });
    }
    if let Some((locate, offset)) = &renderer.dynamic_end {
        scope.set_end(Boundary::Dynamic {
            locate: Rc::clone(locate),
            offset: *offset,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Render functions and results
// ---------------------------------------------------------------------------

/// A renderer plus its input callback.
#[derive(Clone)]
pub struct RenderFn {
    renderer: Rc<Renderer>,
    dynamic_input: Option<DynamicInput>,
}

/// Pair `renderer` with `dynamic_input`.
#[must_use]
pub fn create_render_fn(renderer: Rc<Renderer>, dynamic_input: Option<DynamicInput>) -> RenderFn {
    RenderFn {
        renderer,
        dynamic_input,
    }
}

impl RenderFn {
    #[must_use]
    pub fn renderer(&self) -> &Rc<Renderer> {
        &self.renderer
    }

    /// Create an instance in `dom`, apply `input` and flush.
    ///
    /// # Errors
    ///
    /// Clone, walk, callback and effect errors. A failed render leaves no
    /// nodes behind in `dom`.
    pub fn render(&self, dom: &Dom, input: &Input) -> Result<RenderResult> {
        let mut scope = Scope::new(self.renderer.size);
        let span = debug_span!("runtime.render", scope = scope.id().get());
        let _guard = span.enter();

        let node = {
            let mut doc = dom.borrow_mut();
            let node = init_renderer(&self.renderer, &mut scope, &mut doc)?;
            if let Err(err) = self.apply(&mut scope, &mut doc, input) {
                scope.mark_destroyed();
                let freed = doc.release(node);
                debug!(message = "runtime.render.failed", scope = scope.id().get(), freed);
                return Err(err);
            }
            node
        };

        Ok(RenderResult {
            dom: Rc::clone(dom),
            node,
            renderer: Rc::clone(&self.renderer),
            dynamic_input: self.dynamic_input.clone(),
            scope,
        })
    }

    fn apply(&self, scope: &mut Scope, doc: &mut Document, input: &Input) -> Result<usize> {
        let mut cx = self.renderer.cx(scope, doc);
        if let Some(dynamic_input) = &self.dynamic_input {
            dynamic_input(&mut cx, input)?;
        }
        cx.flush()
    }
}

impl fmt::Debug for RenderFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderFn")
            .field("renderer", &self.renderer)
            .field("dynamic_input", &self.dynamic_input.is_some())
            .finish()
    }
}

/// A live template instance.
pub struct RenderResult {
    dom: Dom,
    node: NodeRef,
    renderer: Rc<Renderer>,
    dynamic_input: Option<DynamicInput>,
    scope: Scope,
}

impl RenderResult {
    /// Root of the clone: the single node, or the fragment holding the
    /// instance's top-level nodes until it is inserted somewhere.
    #[must_use]
    pub fn node(&self) -> NodeRef {
        self.node
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Re-apply input and flush. Returns how many effects ran.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Destroyed`] after [`destroy`](Self::destroy), and any
    /// callback or effect error.
    pub fn update(&mut self, input: &Input) -> Result<usize> {
        if self.scope.is_destroyed() {
            warn!(
                message = "runtime.update.destroyed",
                scope = self.scope.id().get(),
            );
            return Err(RuntimeError::Destroyed);
        }
        let mut doc = self.dom.borrow_mut();
        let mut cx = self.renderer.cx(&mut self.scope, &mut doc);
        if let Some(dynamic_input) = &self.dynamic_input {
            dynamic_input(&mut cx, input)?;
        }
        cx.flush()
    }

    /// Drop pending effects, then detach and release the instance's nodes,
    /// first through last. A clone root left detached afterwards (an
    /// emptied fragment, or a wrapper never inserted anywhere) is released
    /// too. Idempotent.
    pub fn destroy(&mut self) {
        if self.scope.is_destroyed() {
            return;
        }
        self.scope.mark_destroyed();
        let mut doc = self.dom.borrow_mut();
        let mut freed = 0;
        if let (Some(first), Some(last)) = (self.scope.first_node(), self.scope.last_node()) {
            let mut current = Some(first);
            while let Some(node) = current.filter(|node| doc.contains(*node)) {
                current = if node == last { None } else { doc.next_sibling(node) };
                freed += doc.release(node);
            }
        }
        if doc.contains(self.node) && doc.parent(self.node).is_none() {
            freed += doc.release(self.node);
        }
        debug!(message = "runtime.destroy", scope = self.scope.id().get(), freed);
    }
}

impl fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResult")
            .field("node", &self.node)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_are_trimmed_on_build() {
        let renderer = Renderer::builder("<p></p>").with_walks(" D l").build();
        assert_eq!(renderer.walks(), " D ");
    }

    #[test]
    fn source_is_parsed_once() {
        let renderer = Renderer::builder("<p>x</p>").build();
        let mut doc = Document::new();
        assert!(!renderer.is_parsed());
        let a = renderer.clone_into(&mut doc).expect("clones");
        let b = renderer.clone_into(&mut doc).expect("clones");
        assert!(renderer.is_parsed());
        assert_ne!(a, b);
        assert_eq!(doc.to_markup(a), "<p>x</p>");
        assert_eq!(doc.to_markup(b), "<p>x</p>");
    }

    #[test]
    fn default_config_has_no_template() {
        let renderer = RendererConfig::default().build();
        let mut doc = Document::new();
        assert_eq!(
            renderer.clone_into(&mut doc).expect_err("no template"),
            RuntimeError::MissingTemplate
        );
    }

    #[test]
    fn root_insertions_clone_a_fragment() {
        let renderer = Renderer::builder("<p></p>").with_walks("!").build();
        let mut doc = Document::new();
        let mut scope = Scope::new(0);
        let root = init_renderer(&renderer, &mut scope, &mut doc).expect("renders");
        assert!(doc.is_fragment(root));
        assert_eq!(doc.children(root).count(), 2);
        assert_eq!(scope.nodes().len(), 1);
        assert_eq!(scope.first_node(), Some(scope.nodes()[0]));
        assert_eq!(scope.last_node(), doc.last_child(root));
    }

    #[test]
    fn render_callback_sees_bound_nodes() {
        let renderer = Renderer::builder("<b></b>")
            .with_walks(" ")
            .with_render(Rc::new(|cx: &mut Cx<'_>| -> Result<()> {
                let node = cx.node(0)?;
                cx.doc().set_attribute(node, "data-ready", "1");
                Ok(())
            }))
            .build();
        let mut doc = Document::new();
        let mut scope = Scope::new(0);
        let root = init_renderer(&renderer, &mut scope, &mut doc).expect("renders");
        assert_eq!(doc.to_markup(root), "<b data-ready=\"1\"></b>");
    }
}
