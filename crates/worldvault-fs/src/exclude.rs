//! Exclusion filtering for tree operations.
//!
//! An [`ExclusionPolicy`] combines two filters:
//! - glob patterns, applied to files and directories alike
//! - a [`DimensionMask`], applied to directories only, which prunes the
//!   per-dimension region directories of unselected dimensions
//!
//! An excluded directory is pruned as a whole subtree; nothing below it is
//! visited. An unmatched path is included.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern, PatternError};

/// Directory name holding overworld region data.
pub const OVERWORLD_DIR: &str = "region";
/// Directory name holding nether data.
pub const NETHER_DIR: &str = "DIM-1";
/// Directory name holding end data.
pub const END_DIR: &str = "DIM1";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Bitmask of world dimensions.
///
/// Defaults to [`DimensionMask::ALL`]; clearing a bit prunes that
/// dimension's region directory from the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionMask(u8);

impl DimensionMask {
    pub const NONE: DimensionMask = DimensionMask(0);
    pub const OVERWORLD: DimensionMask = DimensionMask(1);
    pub const NETHER: DimensionMask = DimensionMask(2);
    pub const END: DimensionMask = DimensionMask(4);
    pub const ALL: DimensionMask = DimensionMask(7);

    /// Build a mask from raw bits. Bits outside the known dimensions are
    /// ignored.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every dimension in `other` is selected in `self`.
    pub fn contains(self, other: DimensionMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// The dimension owning a top-level directory name, if any.
    pub fn of_dir_name(name: &str) -> Option<DimensionMask> {
        match name {
            OVERWORLD_DIR => Some(Self::OVERWORLD),
            NETHER_DIR => Some(Self::NETHER),
            END_DIR => Some(Self::END),
            _ => None,
        }
    }
}

impl Default for DimensionMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for DimensionMask {
    type Output = DimensionMask;

    fn bitor(self, rhs: DimensionMask) -> DimensionMask {
        DimensionMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    pattern: Pattern,
    /// Patterns containing a separator match the whole relative path;
    /// bare patterns match the final component at any depth.
    match_full_path: bool,
}

/// Decides which entries a tree operation skips.
///
/// Pure and immutable once built; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    patterns: Vec<CompiledPattern>,
    mask: DimensionMask,
}

impl ExclusionPolicy {
    /// Policy that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a list of glob patterns into a policy.
    ///
    /// Patterns use `/` as the separator. A pattern without a separator
    /// (`session.lock`, `*.tmp`) matches the file or directory name at any
    /// depth; a pattern with one (`logs/*.log`) matches the path relative
    /// to the tree root.
    pub fn compile<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref();
            compiled.push(CompiledPattern {
                pattern: Pattern::new(raw)?,
                match_full_path: raw.contains('/'),
            });
        }
        Ok(Self {
            patterns: compiled,
            mask: DimensionMask::default(),
        })
    }

    /// Restrict the policy to the given dimensions.
    pub fn with_mask(mut self, mask: DimensionMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn mask(&self) -> DimensionMask {
        self.mask
    }

    /// Whether the entry at `rel` (relative to the tree root) is excluded.
    ///
    /// The mask applies to directories only: a directory whose first
    /// component is the region directory of an unselected dimension is
    /// pruned. Patterns apply to files and directories alike.
    pub fn should_exclude(&self, rel: &Path, is_dir: bool) -> bool {
        if is_dir && !self.mask_allows(rel) {
            return true;
        }
        self.matches_pattern(rel)
    }

    fn mask_allows(&self, rel: &Path) -> bool {
        let first = match rel.components().next() {
            Some(Component::Normal(name)) => name.to_str(),
            _ => None,
        };
        match first.and_then(DimensionMask::of_dir_name) {
            Some(dim) => self.mask.contains(dim),
            None => true,
        }
    }

    fn matches_pattern(&self, rel: &Path) -> bool {
        let name = rel.file_name().and_then(|n| n.to_str());
        for entry in &self.patterns {
            if entry.match_full_path {
                if entry.pattern.matches_path_with(rel, MATCH_OPTIONS) {
                    return true;
                }
            } else if let Some(name) = name {
                if entry.pattern.matches_with(name, MATCH_OPTIONS) {
                    return true;
                }
            }
        }
        false
    }
}
