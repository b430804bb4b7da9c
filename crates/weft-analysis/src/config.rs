#![forbid(unsafe_code)]

//! Analysis configuration.

/// Knobs for one compilation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Name anonymous functions attached directly to a named attribute after
    /// that attribute (`onClick=() => ...` becomes `onClick`).
    pub name_attribute_functions: bool,
    /// Maximum number of direct alias hops followed while resolving one
    /// reference. Exceeding it reports an alias cycle.
    pub max_alias_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            name_attribute_functions: true,
            max_alias_depth: 64,
        }
    }
}

impl AnalysisConfig {
    /// Toggle legacy attribute function naming.
    #[must_use]
    pub fn with_name_attribute_functions(mut self, enabled: bool) -> Self {
        self.name_attribute_functions = enabled;
        self
    }

    /// Set the alias hop limit.
    #[must_use]
    pub fn with_max_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }
}
