//! `val-schema` — serialized schema shapes and the shallow resolver.
//!
//! Given a module's raw tree, its schema and a module path, the resolver
//! returns either a primitive value or one level of child addresses. It never
//! materializes whole subtrees.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use val_path::{ModuleFilePath, ModulePath};
//! use val_schema::{shallow_at, Schema, ShallowView};
//!
//! let module = ModuleFilePath::new("/content/blog.val.ts").unwrap();
//! let schema = Schema::from_json(&json!({
//!     "type": "object",
//!     "items": { "posts": { "type": "array", "item": { "type": "string" } } }
//! }))
//! .unwrap();
//! let tree = json!({ "posts": ["Hello"] });
//!
//! let view = shallow_at(&module, &schema, Some(&tree), &ModulePath::new(r#""posts""#).unwrap()).unwrap();
//! let ShallowView::Array(items) = view else { panic!() };
//! assert_eq!(items[0].as_str(), r#"/content/blog.val.ts?p="posts".0"#);
//! ```

use thiserror::Error;
use val_path::{ModuleFilePath, SourcePath};

pub mod schema;
pub mod shallow;
pub mod validate;
pub mod walk;

pub use schema::{
    ArraySchema, BooleanSchema, DateSchema, FileSchema, KeyOfSchema, LiteralSchema, NumberSchema,
    ObjectSchema, RecordSchema, RichTextSchema, RouteSchema, Schema, SchemaKind, SchemaSet,
    StringSchema, UnionKey, UnionSchema,
};
pub use shallow::{shallow_at, shallow_at_source_path, to_shallow_view, FileRef, ShallowView};
pub use validate::validate;
pub use walk::{patch_path_to_module_path, resolve, schema_at, walk, Resolved};

/// Resolver failures, returned as values so callers can render them inline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// The module has no tree loaded yet. Transient.
    #[error("module {module} is not loaded")]
    NotFound { module: ModuleFilePath },
    /// The address does not match the declared shape.
    #[error("{message} at {path}")]
    Structural { path: SourcePath, message: String },
}

impl ResolveError {
    pub fn is_structural(&self) -> bool {
        matches!(self, ResolveError::Structural { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }

    /// Offending address of a structural error.
    pub fn path(&self) -> Option<&SourcePath> {
        match self {
            ResolveError::Structural { path, .. } => Some(path),
            ResolveError::NotFound { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ResolveError::Structural { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
