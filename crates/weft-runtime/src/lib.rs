#![forbid(unsafe_code)]

//! Minimal template runtime.
//!
//! Compiled templates are instantiated by cloning a parsed source subtree,
//! walking the clone with a compact walk string to bind the nodes dynamic
//! code touches, and keeping reactive values in per-instance [`Scope`] slots.
//! Writing a slot queues the effects that depend on it; flushing runs each
//! queued effect once.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use serde_json::json;
//! use weft_runtime::prelude::*;
//!
//! let text: EffectFn = Rc::new(|cx: &mut Cx<'_>| -> Result<()> {
//!     let count = cx.get(0).clone();
//!     cx.set_data(1, &count)
//! });
//! let input: DynamicInput = Rc::new(|cx: &mut Cx<'_>, input: &Input| -> Result<()> {
//!     cx.set(0, input.get("count").cloned().unwrap_or_default())?;
//!     Ok(())
//! });
//! let renderer = Renderer::builder("<button> </button>")
//!     .with_walks(" D l")
//!     .with_size(1)
//!     .with_effect("text", &[0], text)
//!     .build();
//! let render = create_render_fn(Rc::new(renderer), Some(input));
//!
//! let dom = Document::shared();
//! let first = json!({ "count": 0 });
//! let mut result = render.render(&dom, first.as_object().unwrap()).unwrap();
//! assert_eq!(dom.borrow().to_markup(result.node()), "<button>0</button>");
//!
//! let next = json!({ "count": 1 });
//! assert_eq!(result.update(next.as_object().unwrap()).unwrap(), 1);
//! assert_eq!(dom.borrow().to_markup(result.node()), "<button>1</button>");
//! ```

pub mod dom;
pub mod effect;
pub mod error;
pub mod renderer;
pub mod scope;
pub mod template;
pub mod walker;

pub use dom::{Document, Dom, NodeData, NodeRef};
pub use effect::{Cx, Effect, EffectFn, EffectId, EffectTable};
pub use error::{Result, RuntimeError};
pub use renderer::{
    DynamicInput, Input, RenderCallback, RenderFn, RenderResult, Renderer, RendererConfig,
    create_render_fn, init_renderer,
};
pub use scope::{Boundary, Locator, Scope, ScopeId};
pub use template::parse_template;
pub use walker::{WalkCode, needs_fragment, trim_walk_string};

pub mod prelude {
    pub use crate::{
        Boundary, Cx, Document, Dom, DynamicInput, EffectFn, Input, Locator, NodeRef,
        RenderFn, RenderResult, Renderer, Result, RuntimeError, Scope, create_render_fn,
        init_renderer,
    };
}
