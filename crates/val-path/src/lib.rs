//! Address codecs for content modules.
//!
//! Four address forms exist:
//!
//! - **module file path**: `/content/blog.val.ts`
//! - **module path** (in-module address): `"posts".0."title"`, dot-joined
//!   segments where keys are JSON-quoted and array indices are bare decimals
//! - **source path** (combined address): `/content/blog.val.ts?p="posts".0."title"`
//! - **patch path**: `["posts", "0", "title"]`, raw unquoted segments used
//!   inside patch operations
//!
//! # Example
//!
//! ```
//! use val_path::{split_combined, to_patch_path, from_patch_path};
//!
//! let (module, path) = split_combined(r#"/content/blog.val.ts?p="posts".0."title""#).unwrap();
//! assert_eq!(module.as_str(), "/content/blog.val.ts");
//! assert_eq!(path.as_str(), r#""posts".0."title""#);
//!
//! let patch_path = to_patch_path(path.as_str()).unwrap();
//! assert_eq!(patch_path, vec!["posts", "0", "title"]);
//! assert_eq!(from_patch_path(&patch_path), path);
//! ```

use thiserror::Error;

pub mod types;
pub use types::{ModuleFilePath, ModulePath, PatchPath, Segment, SourcePath};

pub mod validate;
pub use validate::{validate_module_file_path, validate_source_path};

/// Separator between the module file path and the module path.
pub const SOURCE_PATH_SEPARATOR: &str = "?p=";

// ── Combined addresses ────────────────────────────────────────────────────

/// Split a combined address into module file path and module path.
///
/// The split happens on the first `?p=`; module file paths can never contain
/// it, so quoted keys holding `?p=` stay in the module path. A string without
/// the separator addresses the module root.
///
/// # Errors
///
/// - `PathError::EmptyModulePath` if the module portion is empty
/// - any module path parse error of the in-module portion
///
/// # Example
///
/// ```
/// use val_path::split_combined;
///
/// let (m, p) = split_combined("/content/blog.val.ts").unwrap();
/// assert_eq!(m.as_str(), "/content/blog.val.ts");
/// assert!(p.is_root());
/// assert!(split_combined(r#"?p="a""#).is_err());
/// ```
pub fn split_combined(address: &str) -> Result<(ModuleFilePath, ModulePath), PathError> {
    let (module, path) = match address.find(SOURCE_PATH_SEPARATOR) {
        Some(idx) => (&address[..idx], &address[idx + SOURCE_PATH_SEPARATOR.len()..]),
        None => (address, ""),
    };
    let module = ModuleFilePath::new(module)?;
    let path = ModulePath::new(path)?;
    Ok((module, path))
}

/// Join a module file path and a module path into a combined address.
///
/// The module root is addressed by the bare module file path.
pub fn join_combined(module_file_path: &ModuleFilePath, module_path: &ModulePath) -> SourcePath {
    SourcePath::from_parts(module_file_path, module_path)
}

// ── Module paths ──────────────────────────────────────────────────────────

/// Parse a module path into segments.
///
/// Quoted segments are JSON strings and may contain escaped quotes and dots;
/// bare segments must be canonical decimal indices. Only canonical encodings
/// are accepted so that re-encoding reproduces the input exactly.
///
/// # Example
///
/// ```
/// use val_path::{parse_in_module, Segment};
///
/// assert_eq!(parse_in_module("").unwrap(), Vec::<Segment>::new());
/// assert_eq!(
///     parse_in_module(r#""a.b".2"#).unwrap(),
///     vec![Segment::Key("a.b".to_string()), Segment::Index(2)],
/// );
/// assert!(parse_in_module(r#""unterminated"#).is_err());
/// ```
pub fn parse_in_module(path: &str) -> Result<Vec<Segment>, PathError> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }
    let bytes = path.as_bytes();
    let mut pos = 0;
    loop {
        let start = pos;
        if pos >= bytes.len() {
            return Err(PathError::MalformedSegment {
                segment: String::new(),
                reason: "empty segment".to_string(),
            });
        }
        if bytes[pos] == b'"' {
            pos += 1;
            loop {
                match bytes.get(pos) {
                    None => return Err(PathError::UnterminatedQuote(path[start..].to_string())),
                    Some(b'\\') => pos += 2,
                    Some(b'"') => break,
                    Some(_) => pos += 1,
                }
            }
            pos += 1;
            let raw = &path[start..pos];
            let key: String = serde_json::from_str(raw).map_err(|e| PathError::MalformedSegment {
                segment: raw.to_string(),
                reason: e.to_string(),
            })?;
            let segment = Segment::Key(key);
            if segment.encode() != raw {
                return Err(PathError::MalformedSegment {
                    segment: raw.to_string(),
                    reason: "non-canonical quoting".to_string(),
                });
            }
            segments.push(segment);
        } else {
            while pos < bytes.len() && bytes[pos] != b'.' {
                pos += 1;
            }
            let raw = &path[start..pos];
            if !is_valid_index(raw) {
                return Err(PathError::InvalidIndex(raw.to_string()));
            }
            let idx = raw
                .parse::<usize>()
                .map_err(|_| PathError::InvalidIndex(raw.to_string()))?;
            segments.push(Segment::Index(idx));
        }
        match bytes.get(pos) {
            None => break,
            Some(b'.') => pos += 1,
            Some(_) => {
                return Err(PathError::MalformedSegment {
                    segment: path[start..].to_string(),
                    reason: "expected '.' after quoted segment".to_string(),
                })
            }
        }
    }
    Ok(segments)
}

/// Encode segments into a module path.
pub fn format_module_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&segment.encode());
    }
    out
}

/// Append one segment to a module path.
///
/// # Example
///
/// ```
/// use val_path::{append_segment, ModulePath, Segment};
///
/// let posts = append_segment(&ModulePath::root(), &Segment::Key("posts".into()));
/// let first = append_segment(&posts, &Segment::Index(0));
/// assert_eq!(first.as_str(), r#""posts".0"#);
/// ```
pub fn append_segment(module_path: &ModulePath, segment: &Segment) -> ModulePath {
    let mut out = String::with_capacity(module_path.as_str().len() + 8);
    out.push_str(module_path.as_str());
    if !module_path.is_root() {
        out.push('.');
    }
    out.push_str(&segment.encode());
    ModulePath::from_encoded(out)
}

/// Get the parent of a module path.
///
/// # Errors
///
/// Returns `PathError::NoParent` for the root.
pub fn parent(module_path: &ModulePath) -> Result<ModulePath, PathError> {
    let mut segments = module_path.segments();
    if segments.pop().is_none() {
        return Err(PathError::NoParent);
    }
    Ok(ModulePath::from_segments(&segments))
}

/// Check if `parent` is a strict ancestor of `child`.
pub fn is_child(parent: &ModulePath, child: &ModulePath) -> bool {
    let parent = parent.segments();
    let child = child.segments();
    parent.len() < child.len() && child[..parent.len()] == parent[..]
}

/// Last segment of a module path, `None` for the root.
pub fn last_segment(module_path: &ModulePath) -> Option<Segment> {
    module_path.segments().pop()
}

// ── Patch paths ───────────────────────────────────────────────────────────

/// Convert a module path into a patch path (quoted → raw).
///
/// # Example
///
/// ```
/// use val_path::to_patch_path;
///
/// assert_eq!(to_patch_path(r#""a"."0".1"#).unwrap(), vec!["a", "0", "1"]);
/// assert_eq!(to_patch_path("").unwrap(), Vec::<String>::new());
/// ```
pub fn to_patch_path(module_path: &str) -> Result<PatchPath, PathError> {
    Ok(parse_in_module(module_path)?.iter().map(Segment::to_raw).collect())
}

/// Convert a patch path into a module path (raw → quoted).
///
/// Without a schema a raw segment is taken as an array index exactly when it
/// is a canonical decimal; every other segment is quoted. For record keys
/// that look numeric use the schema-aware translation in `val-schema`.
pub fn from_patch_path(patch_path: &[String]) -> ModulePath {
    let segments: Vec<Segment> = patch_path
        .iter()
        .map(|raw| match raw.parse::<usize>() {
            Ok(idx) if is_valid_index(raw) => Segment::Index(idx),
            _ => Segment::Key(raw.clone()),
        })
        .collect();
    ModulePath::from_segments(&segments)
}

/// Check if a string represents a canonical non-negative integer index.
///
/// # Example
///
/// ```
/// use val_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("123"));
/// assert!(!is_valid_index("01"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index(""));
/// ```
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|&b| b.is_ascii_digit())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("module file path is empty")]
    EmptyModulePath,
    #[error("invalid module file path: {0}")]
    InvalidModulePath(String),
    #[error("malformed segment {segment}: {reason}")]
    MalformedSegment { segment: String, reason: String },
    #[error("unterminated quote in {0}")]
    UnterminatedQuote(String),
    #[error("invalid index: {0}")]
    InvalidIndex(String),
    #[error("NO_PARENT")]
    NoParent,
}
