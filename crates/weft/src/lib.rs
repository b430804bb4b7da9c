#![forbid(unsafe_code)]

//! Weft public facade crate.
//!
//! Re-exports the compile-time tracking pass and, with the default `runtime`
//! feature, the template runtime.

pub use weft_analysis as analysis;
#[cfg(feature = "runtime")]
pub use weft_runtime as runtime;

pub mod prelude {
    pub use weft_analysis::prelude::*;
    #[cfg(feature = "runtime")]
    pub use weft_runtime::prelude::{
        Boundary, Cx, Document, Dom, DynamicInput, EffectFn, Input, Locator, NodeRef, RenderFn,
        RenderResult, Renderer, RuntimeError, Scope, create_render_fn, init_renderer,
    };

    pub use crate::analysis;
    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}
