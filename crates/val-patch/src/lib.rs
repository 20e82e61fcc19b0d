//! `val-patch` — patch operations against content module trees.
//!
//! Operations address nodes by raw patch paths. This crate builds them from
//! module paths, applies them locally for optimistic updates, encodes them
//! for the wire, splits inline file payloads into out-of-band uploads and
//! groups patch histories into change sets.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use val_patch::{apply_patch, codec::json::to_json_patch, Op};
//!
//! let ops = vec![Op::add(vec!["posts".into(), "0".into(), "title".into()], json!("Hello"))];
//! let mut doc = json!({ "posts": [{ "title": "Draft" }] });
//! apply_patch(&mut doc, &ops).unwrap();
//! assert_eq!(doc["posts"][0]["title"], "Hello");
//! assert_eq!(
//!     to_json_patch(&ops),
//!     json!([{ "op": "add", "path": ["posts", "0", "title"], "value": "Hello" }]),
//! );
//! ```

pub mod apply;
pub mod builder;
pub mod codec;
pub mod file;
pub mod patch_set;
pub mod types;
pub mod util;

pub use apply::{apply_op, apply_ops, apply_patch, get_at};
pub use builder::{module_patch_path, patch_path_of, PatchBuilder};
pub use file::{
    desugar_file_ops, FileKind, FileUploadRequest, FileUploadResponse, ParentRef, PendingUpload,
};
pub use patch_set::{aggregate, aggregate_with, summarize, EditSummary, PatchRecord, PatchSet};
pub use types::{Op, OpKind, OpResult, PatchError, PatchFailure, PatchId, PatchPath, PatchResult};
