use core::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_MAX_JOIN_DEPTH: NonZeroUsize = NonZeroUsize::new(2).unwrap();

/// Builder configuration.
///
/// Deserializes from `{"maxJoinDepth": 2}`; missing keys take their defaults
/// and a zero depth is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub max_join_depth: NonZeroUsize,
}

impl Options {
    pub const fn new() -> Self {
        Self {
            max_join_depth: DEFAULT_MAX_JOIN_DEPTH,
        }
    }

    /// Sets the deepest relationship path `with()` accepts. Zero is raised to one.
    pub const fn max_join_depth(mut self, depth: usize) -> Self {
        self.max_join_depth = match NonZeroUsize::new(depth) {
            Some(depth) => depth,
            None => NonZeroUsize::MIN,
        };
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
