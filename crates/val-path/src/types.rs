//! Address newtypes.
//!
//! All three string forms are validated on construction, so holding one is
//! proof that it splits and parses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    format_module_path, join_combined, parse_in_module, split_combined, PathError,
    SOURCE_PATH_SEPARATOR,
};

/// One step of an in-module address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object or record field, JSON-quoted in the encoded form.
    Key(String),
    /// Array position, bare decimal in the encoded form.
    Index(usize),
}

impl Segment {
    /// The raw, unquoted form used inside patch operations.
    pub fn to_raw(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(idx) => idx.to_string(),
        }
    }

    /// Encoded form as it appears inside a module path.
    pub fn encode(&self) -> String {
        match self {
            Segment::Key(key) => serde_json::Value::String(key.clone()).to_string(),
            Segment::Index(idx) => idx.to_string(),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(idx: usize) -> Self {
        Segment::Index(idx)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A raw patch address: unquoted segments in order.
pub type PatchPath = Vec<String>;

// ── ModuleFilePath ────────────────────────────────────────────────────────

/// Absolute, `/`-separated address of one content module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleFilePath(String);

impl ModuleFilePath {
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        crate::validate::validate_module_file_path(&path)?;
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Combined address of a node inside this module.
    pub fn source_path(&self, module_path: &ModulePath) -> SourcePath {
        join_combined(self, module_path)
    }
}

impl TryFrom<String> for ModuleFilePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleFilePath> for String {
    fn from(value: ModuleFilePath) -> Self {
        value.0
    }
}

impl FromStr for ModuleFilePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ModuleFilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ModulePath ────────────────────────────────────────────────────────────

/// Address of a node relative to its module root. Empty means the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModulePath(String);

impl ModulePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        parse_in_module(&path)?;
        Ok(Self(path))
    }

    pub fn from_segments(segments: &[Segment]) -> Self {
        Self(format_module_path(segments))
    }

    pub(crate) fn from_encoded(path: String) -> Self {
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded segments. Construction already validated the encoding.
    pub fn segments(&self) -> Vec<Segment> {
        parse_in_module(&self.0).unwrap_or_default()
    }

    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        crate::append_segment(self, &segment.into())
    }
}

impl TryFrom<String> for ModulePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModulePath> for String {
    fn from(value: ModulePath) -> Self {
        value.0
    }
}

impl FromStr for ModulePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ModulePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── SourcePath ────────────────────────────────────────────────────────────

/// Combined address: module file path, `?p=`, module path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourcePath(String);

impl SourcePath {
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        split_combined(&path)?;
        Ok(Self(path))
    }

    pub(crate) fn from_parts(module_file_path: &ModuleFilePath, module_path: &ModulePath) -> Self {
        if module_path.is_root() {
            return Self(module_file_path.as_str().to_string());
        }
        let mut out = String::with_capacity(
            module_file_path.as_str().len() + SOURCE_PATH_SEPARATOR.len() + module_path.as_str().len(),
        );
        out.push_str(module_file_path.as_str());
        out.push_str(SOURCE_PATH_SEPARATOR);
        out.push_str(module_path.as_str());
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Both halves. Construction already validated the split.
    pub fn split(&self) -> (ModuleFilePath, ModulePath) {
        match split_combined(&self.0) {
            Ok(parts) => parts,
            Err(_) => (ModuleFilePath(self.0.clone()), ModulePath::root()),
        }
    }

    pub fn module_file_path(&self) -> ModuleFilePath {
        self.split().0
    }

    pub fn module_path(&self) -> ModulePath {
        self.split().1
    }
}

impl TryFrom<String> for SourcePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourcePath> for String {
    fn from(value: SourcePath) -> Self {
        value.0
    }
}

impl FromStr for SourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_encodings() {
        assert_eq!(Segment::from("title").encode(), r#""title""#);
        assert_eq!(Segment::from(3usize).encode(), "3");
        assert_eq!(Segment::from("3").encode(), r#""3""#);
        assert_eq!(Segment::from("3").to_raw(), "3");
    }

    #[test]
    fn module_path_child() {
        let path = ModulePath::root().child("posts").child(0usize).child("title");
        assert_eq!(path.as_str(), r#""posts".0."title""#);
        assert_eq!(path.segments().len(), 3);
    }

    #[test]
    fn source_path_serde_is_transparent() {
        let sp = SourcePath::new(r#"/content/blog.val.ts?p="posts""#).unwrap();
        let json = serde_json::to_string(&sp).unwrap();
        assert_eq!(json, r#""/content/blog.val.ts?p=\"posts\"""#);
        let back: SourcePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sp);
    }

    #[test]
    fn invalid_module_file_path_rejected_by_serde() {
        let res: Result<ModuleFilePath, _> = serde_json::from_str(r#""relative.val.ts""#);
        assert!(res.is_err());
    }
}
