//! Dot-separated path addressing.
//!
//! A path is a sequence of segments split on `.`. The empty string
//! addresses the root. Wildcards (`*`, `**`) belong to subscription
//! patterns, never to data paths, and are rejected here. Keys that
//! themselves contain a dot are unreachable by path.

use std::fmt;

use crate::error::{KernelError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DotPath {
    segments: Vec<String>,
}

impl DotPath {
    /// The root path (zero segments).
    pub fn root() -> Self {
        DotPath::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(DotPath::root());
        }
        let mut segments = Vec::new();
        for segment in text.split('.') {
            if segment.is_empty() {
                return Err(KernelError::path(text, "empty segment"));
            }
            if segment.contains('*') {
                return Err(KernelError::path(
                    text,
                    "wildcards are only valid in subscription patterns",
                ));
            }
            segments.push(segment.to_string());
        }
        Ok(DotPath { segments })
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        DotPath { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Extend with one more segment.
    pub fn child(&self, key: &str) -> DotPath {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        DotPath { segments }
    }

    pub fn starts_with(&self, prefix: &DotPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Segments remaining after `prefix`, or `None` if `prefix` does not
    /// prefix this path.
    pub fn strip_prefix<'a>(&'a self, prefix: &DotPath) -> Option<&'a [String]> {
        if self.starts_with(prefix) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl std::str::FromStr for DotPath {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        DotPath::parse(s)
    }
}

/// `^\d+$` check used to treat a segment as an array index.
pub fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
