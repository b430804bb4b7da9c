#![forbid(unsafe_code)]

//! Alias resolution.
//!
//! A derived binding that merely re-exposes another binding (a renamed or
//! destructured view) carries an [`Aliases`] tree. Resolving a candidate
//! reference follows that tree until it reaches a source that is not an
//! alias, so every read lands on the underlying `(source, property path)`.
//!
//! # Algorithm
//!
//! Starting from the candidate's source and path:
//!
//! - [`Aliases::Direct`]: prepend the current path to the accumulated
//!   suffix, then continue from the target reference's source and path.
//! - [`Aliases::Nested`] with a non-empty path: pop the last segment and
//!   descend into that entry; a missing entry stops the walk.
//! - Anything else stops the walk.
//!
//! If no direct hop happened the candidate is returned unchanged. Otherwise
//! the result is the last hop target, extended by the accumulated suffix;
//! it keeps the target's section.

use crate::error::{AnalysisError, Result};
use crate::model::{Aliases, Reference, ReferenceTable, Source};

/// Resolve `candidate` through alias trees.
///
/// # Errors
///
/// Returns [`AnalysisError::AliasCycle`] when more than `max_depth` direct
/// hops are needed.
pub fn resolve_aliases(
    sources: &[Source],
    references: &ReferenceTable,
    candidate: Reference,
    max_depth: usize,
) -> Result<Reference> {
    let mut target = None;
    let mut suffix = crate::model::PropertyPath::empty();
    let mut aliases = &sources[candidate.source.index()].aliases;
    let mut property = candidate.property.clone();
    let mut hops = 0usize;

    loop {
        match aliases {
            Aliases::Direct(id) => {
                hops += 1;
                if hops > max_depth {
                    return Err(AnalysisError::AliasCycle {
                        origin: candidate.source,
                        limit: max_depth,
                    });
                }
                suffix = property.concat(&suffix);
                let hop = references.get(*id);
                target = Some(hop);
                aliases = &sources[hop.source.index()].aliases;
                property = hop.property.clone();
            }
            Aliases::Nested(entries) => {
                let Some((remaining, last)) = property.pop() else {
                    break;
                };
                let Some(next) = entries.get(&last) else {
                    break;
                };
                aliases = next;
                property = remaining;
            }
            Aliases::Empty => break,
        }
    }

    Ok(match target {
        None => candidate,
        Some(hop) if suffix.is_empty() => hop.clone(),
        Some(hop) => Reference {
            property: hop.property.concat(&suffix),
            ..hop.clone()
        },
    })
}
