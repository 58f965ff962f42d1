//! Member paths inside a document.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A dotted path of member names, e.g. `Address.City`.
///
/// Paths hold host-side member names. They are mapped to wire names by a
/// [`FieldNaming`](crate::naming::FieldNaming) one segment at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath {
    segments: SmallVec<[String; 2]>,
}

impl FieldPath {
    /// Parses a dotted member path. Empty segments are dropped.
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Builds a path from individual segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the member names of this path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns a new path with `member` appended.
    pub fn child(&self, member: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(member.into());
        Self { segments }
    }

    /// Returns true if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::new(&path)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}
