#![forbid(unsafe_code)]

//! Reactive dependency tracking for compiled templates.
//!
//! Given a resolved template [`Tree`], the pass discovers every read of a
//! declared reactive value (a *source*), canonicalizes each read into an
//! interned [`Reference`], groups co-occurring reads into interned
//! *intersections*, and records which sections close over which outer
//! sources. A code generator turns the resulting [`Analysis`] into one
//! recomputation unit per distinct dependency set.
//!
//! # Example
//!
//! ```
//! use weft_analysis::prelude::*;
//!
//! let mut b = TreeBuilder::new();
//! let count = b.declare("count");
//! let read = b.ident(count.binding);
//! let shown = b.placeholder(read);
//! let zero = b.number(0.0);
//! let value = b.default_attribute(zero);
//! let tag = b.tag(TagSpec::new("let", TagKind::Core).with_var(count.node).with_attribute(value));
//! let tree = b.finish(vec![tag, shown]);
//!
//! let mut cx = CompilationContext::new(&tree);
//! cx.track_references(tag, Aliases::Empty, SourceKind::Let)?;
//! let analysis = cx.finish();
//! assert!(matches!(analysis.references_of(read), Some(References::One(_))));
//! # Ok::<(), weft_analysis::AnalysisError>(())
//! ```

pub mod alias;
pub mod config;
pub mod context;
pub mod error;
pub mod intersection;
pub mod model;
pub mod report;
pub mod section;
pub mod sorted;
pub mod tracker;
pub mod tree;

pub use config::AnalysisConfig;
pub use context::{Analysis, CompilationContext, NodeFacts};
pub use error::{AnalysisError, Result};
pub use intersection::{IntersectionTable, compare_intersections};
pub use model::{
    Aliases, IntersectionId, PropertyPath, Reference, ReferenceId, ReferenceTable, References,
    SectionId, Source, SourceId, SourceKind, compare_references,
};
pub use report::{AnalysisReport, SectionReport, SourceReport};
pub use section::{Section, SectionGraph};
pub use tracker::TrackedSources;
pub use tree::{AssignOp, NodeId, NodeKind, TagKind, TagSpec, Tree, TreeBuilder};

pub mod prelude {
    pub use crate::{
        Aliases, Analysis, AnalysisConfig, AnalysisError, CompilationContext, NodeId,
        PropertyPath, References, SourceKind, TagKind, TagSpec, Tree, TreeBuilder,
    };
}
