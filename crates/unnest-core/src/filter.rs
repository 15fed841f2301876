//! File selection filters.
//!
//! A [`FilterSpec`] is the serializable, user-facing description of which
//! files to relocate. It is compiled once into a [`FilterPolicy`], whose
//! [`passes`](FilterPolicy::passes) is a pure predicate evaluated by the
//! walker for every candidate file.

use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use derive_builder::Builder;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::FlattenError;

/// Glob semantics: case-insensitive, `*` never crosses `/`, and a leading dot
/// in any segment must be matched literally.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// User-facing filter description.
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), default)]
pub struct FilterSpec {
    /// Relative paths must match at least one of these globs (if any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Relative paths matching any of these globs are rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Only files with one of these extensions are accepted (if any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_ext: Vec<String>,

    /// Files with one of these extensions are rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_ext: Vec<String>,

    /// Minimum file size in bytes (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,

    /// Maximum file size in bytes (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,

    /// Only files modified at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newer_than: Option<SystemTime>,

    /// Only files modified at or before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than: Option<SystemTime>,
}

impl FilterSpec {
    /// Create a new filter spec builder.
    pub fn builder() -> FilterSpecBuilder {
        FilterSpecBuilder::default()
    }
}

/// The subset of file metadata the filters look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl EntryStat {
    /// Create a new entry stat.
    pub fn new(size: u64, modified: SystemTime) -> Self {
        Self { size, modified }
    }

    /// Snapshot from (lstat) metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        }
    }
}

/// Compiled filter policy.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    allow_ext: Vec<String>,
    deny_ext: Vec<String>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    newer_than: Option<SystemTime>,
    older_than: Option<SystemTime>,
}

impl FilterPolicy {
    /// A policy that accepts every file.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Compile a filter spec, failing on the first invalid glob.
    pub fn compile(spec: &FilterSpec) -> Result<Self, FlattenError> {
        Ok(Self {
            include: compile_patterns(&spec.include)?,
            exclude: compile_patterns(&spec.exclude)?,
            allow_ext: normalize_extensions(&spec.allow_ext),
            deny_ext: normalize_extensions(&spec.deny_ext),
            min_size: spec.min_size,
            max_size: spec.max_size,
            newer_than: spec.newer_than,
            older_than: spec.older_than,
        })
    }

    /// Check if no predicate is configured.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.allow_ext.is_empty()
            && self.deny_ext.is_empty()
            && self.min_size.is_none()
            && self.max_size.is_none()
            && self.newer_than.is_none()
            && self.older_than.is_none()
    }

    /// Decide whether a file is selected for relocation.
    ///
    /// `relative_path` is relative to the source root, `file_name` is its
    /// final component. Every configured predicate must pass.
    pub fn passes(&self, relative_path: &Path, stat: &EntryStat, file_name: &str) -> bool {
        if !self.include.is_empty() && !matches_any(&self.include, relative_path) {
            return false;
        }
        if matches_any(&self.exclude, relative_path) {
            return false;
        }

        let ext = extension_of(file_name);
        if !self.allow_ext.is_empty() {
            match ext {
                Some(ext) if contains_ignore_case(&self.allow_ext, ext) => {}
                _ => return false,
            }
        }
        if let Some(ext) = ext {
            if contains_ignore_case(&self.deny_ext, ext) {
                return false;
            }
        }

        if self.min_size.is_some_and(|min| stat.size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| stat.size > max) {
            return false;
        }
        if self.newer_than.is_some_and(|t| stat.modified < t) {
            return false;
        }
        if self.older_than.is_some_and(|t| stat.modified > t) {
            return false;
        }

        true
    }
}

/// Extension of a file name, without the dot.
///
/// A name whose only dot is its first character (".bashrc") has none.
pub fn extension_of(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, FlattenError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| FlattenError::InvalidPattern {
                pattern: p.clone(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn matches_any(patterns: &[Pattern], path: &Path) -> bool {
    patterns
        .iter()
        .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
}

fn contains_ignore_case(list: &[String], needle: &str) -> bool {
    list.iter().any(|e| e.eq_ignore_ascii_case(needle))
}
