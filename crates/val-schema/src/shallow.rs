//! One-level-deep, schema-validated views of tree nodes.
//!
//! Containers map each child to its source path without looking at the
//! child's value, so a view only changes when the node's own shape does.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use val_path::{join_combined, ModuleFilePath, ModulePath, Segment, SourcePath};

use crate::schema::{Schema, UnionKey};
use crate::walk::{describe, resolve, structural};
use crate::ResolveError;

/// Field holding the reference token of a file or image node.
pub const FILE_REF_PROP: &str = "_ref";
/// Field distinguishing local and remote file references.
pub const FILE_TYPE_PROP: &str = "_type";
/// Field holding file metadata.
pub const FILE_METADATA_PROP: &str = "metadata";

/// Reference token plus open metadata map of a file or image node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRef {
    #[serde(rename = "_ref")]
    pub reference: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub remote: bool,
}

/// Minimal rendering input for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ShallowView {
    Null,
    /// Object and object-union nodes: declared keys to child addresses.
    Object(IndexMap<String, SourcePath>),
    /// Record nodes: present keys to child addresses.
    Record(IndexMap<String, SourcePath>),
    Array(Vec<SourcePath>),
    String(String),
    Number(Number),
    Boolean(bool),
    Date(String),
    Literal(String),
    KeyOf(Value),
    Route(String),
    RichText(Value),
    File(FileRef),
    Image(FileRef),
}

impl ShallowView {
    pub fn is_null(&self) -> bool {
        matches!(self, ShallowView::Null)
    }

    /// Child address for a key or index, containers only.
    pub fn child(&self, segment: &Segment) -> Option<&SourcePath> {
        match (self, segment) {
            (ShallowView::Object(map) | ShallowView::Record(map), Segment::Key(key)) => map.get(key),
            (ShallowView::Array(items), Segment::Index(idx)) => items.get(*idx),
            _ => None,
        }
    }

    /// JSON form handed to rendering layers.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn mismatch(
    module: &ModuleFilePath,
    module_path: &ModulePath,
    expected: &str,
    value: &Value,
) -> ResolveError {
    structural(
        module,
        &module_path.segments(),
        format!("expected {expected}, found {}", describe(Some(value))),
    )
}

fn child_path(module: &ModuleFilePath, module_path: &ModulePath, segment: Segment) -> SourcePath {
    join_combined(module, &module_path.child(segment))
}

fn object_children<'a>(
    module: &ModuleFilePath,
    module_path: &ModulePath,
    keys: impl Iterator<Item = &'a String>,
) -> IndexMap<String, SourcePath> {
    keys.map(|key| (key.clone(), child_path(module, module_path, Segment::Key(key.clone()))))
        .collect()
}

fn file_ref(
    module: &ModuleFilePath,
    module_path: &ModulePath,
    value: &Value,
) -> Result<FileRef, ResolveError> {
    let Value::Object(map) = value else {
        return Err(mismatch(module, module_path, "file reference object", value));
    };
    let reference = match map.get(FILE_REF_PROP) {
        Some(Value::String(r)) => r.clone(),
        other => {
            return Err(structural(
                module,
                &module_path.segments(),
                format!(
                    "expected string {FILE_REF_PROP} on file reference, found {}",
                    describe(other)
                ),
            ))
        }
    };
    let metadata = match map.get(FILE_METADATA_PROP) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(other) => return Err(mismatch(module, module_path, "metadata object", other)),
    };
    let remote = map.get(FILE_TYPE_PROP).and_then(Value::as_str) == Some("remote");
    Ok(FileRef {
        reference,
        metadata,
        remote,
    })
}

/// Build the shallow view of an already-walked node.
///
/// `null` is always a valid view. Any other value must match the declared
/// schema shape; a mismatch names the expected and the actual shape.
pub fn to_shallow_view(
    module: &ModuleFilePath,
    module_path: &ModulePath,
    schema: &Schema,
    value: &Value,
) -> Result<ShallowView, ResolveError> {
    if value.is_null() {
        return Ok(ShallowView::Null);
    }
    match schema {
        Schema::Object(obj) => match value {
            Value::Object(_) => Ok(ShallowView::Object(object_children(
                module,
                module_path,
                obj.items.keys(),
            ))),
            other => Err(mismatch(module, module_path, "object", other)),
        },
        Schema::Record(_) => match value {
            Value::Object(map) => Ok(ShallowView::Record(object_children(
                module,
                module_path,
                map.keys(),
            ))),
            other => Err(mismatch(module, module_path, "record object", other)),
        },
        Schema::Array(_) => match value {
            Value::Array(items) => Ok(ShallowView::Array(
                (0..items.len())
                    .map(|idx| child_path(module, module_path, Segment::Index(idx)))
                    .collect(),
            )),
            other => Err(mismatch(module, module_path, "array", other)),
        },
        Schema::Union(union) => match (&union.key, value) {
            (UnionKey::Literal(_), Value::String(s)) => {
                if union.literals().any(|lit| lit == s) {
                    Ok(ShallowView::String(s.clone()))
                } else {
                    Err(structural(
                        module,
                        &module_path.segments(),
                        format!("expected one of the union literals, found {s:?}"),
                    ))
                }
            }
            (UnionKey::Literal(_), other) => Err(mismatch(module, module_path, "string", other)),
            (UnionKey::Discriminator(key), Value::Object(map)) => {
                let tag = match map.get(key) {
                    Some(Value::String(tag)) => tag,
                    other => {
                        return Err(structural(
                            module,
                            &module_path.segments(),
                            format!(
                                "expected string discriminator {key:?}, found {}",
                                describe(other)
                            ),
                        ))
                    }
                };
                let variant = union.variant(tag).ok_or_else(|| {
                    structural(
                        module,
                        &module_path.segments(),
                        format!("no union variant for discriminator {tag:?}"),
                    )
                })?;
                Ok(ShallowView::Object(object_children(
                    module,
                    module_path,
                    variant.items.keys(),
                )))
            }
            (UnionKey::Discriminator(_), other) => {
                Err(mismatch(module, module_path, "object", other))
            }
        },
        Schema::String(_) => match value {
            Value::String(s) => Ok(ShallowView::String(s.clone())),
            other => Err(mismatch(module, module_path, "string", other)),
        },
        Schema::Number(_) => match value {
            Value::Number(n) => Ok(ShallowView::Number(n.clone())),
            other => Err(mismatch(module, module_path, "number", other)),
        },
        Schema::Boolean(_) => match value {
            Value::Bool(b) => Ok(ShallowView::Boolean(*b)),
            other => Err(mismatch(module, module_path, "boolean", other)),
        },
        Schema::Date(_) => match value {
            Value::String(s) => Ok(ShallowView::Date(s.clone())),
            other => Err(mismatch(module, module_path, "date string", other)),
        },
        Schema::Literal(lit) => match value {
            Value::String(s) if *s == lit.value => Ok(ShallowView::Literal(s.clone())),
            Value::String(s) => Err(structural(
                module,
                &module_path.segments(),
                format!("expected literal {:?}, found {s:?}", lit.value),
            )),
            other => Err(mismatch(module, module_path, "string literal", other)),
        },
        Schema::KeyOf(_) => match value {
            Value::String(_) | Value::Number(_) => Ok(ShallowView::KeyOf(value.clone())),
            other => Err(mismatch(module, module_path, "string or number key", other)),
        },
        Schema::Route(_) => match value {
            Value::String(s) => Ok(ShallowView::Route(s.clone())),
            other => Err(mismatch(module, module_path, "route string", other)),
        },
        Schema::RichText(_) => match value {
            Value::Array(_) => Ok(ShallowView::RichText(value.clone())),
            other => Err(mismatch(module, module_path, "richtext array", other)),
        },
        Schema::File(_) => file_ref(module, module_path, value).map(ShallowView::File),
        Schema::Image(_) => file_ref(module, module_path, value).map(ShallowView::Image),
    }
}

/// Resolve `module_path` against a module's schema and tree, then build its
/// shallow view.
pub fn shallow_at(
    module: &ModuleFilePath,
    schema: &Schema,
    root: Option<&Value>,
    module_path: &ModulePath,
) -> Result<ShallowView, ResolveError> {
    let resolved = resolve(module, schema, root, module_path)?;
    to_shallow_view(module, module_path, resolved.schema, resolved.value)
}

/// Same as [`shallow_at`] for a combined address.
pub fn shallow_at_source_path(
    source_path: &SourcePath,
    schema: &Schema,
    root: Option<&Value>,
) -> Result<ShallowView, ResolveError> {
    let (module, module_path) = source_path.split();
    shallow_at(&module, schema, root, &module_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module() -> ModuleFilePath {
        ModuleFilePath::new("/content/blog.val.ts").unwrap()
    }

    fn schema(v: Value) -> Schema {
        Schema::from_json(&v).unwrap()
    }

    #[test]
    fn object_view_lists_declared_keys() {
        let s = schema(json!({"type": "object", "items": {"title": {"type": "string"}, "n": {"type": "number"}}}));
        let view = to_shallow_view(&module(), &ModulePath::root(), &s, &json!({"title": "x", "n": 1})).unwrap();
        let ShallowView::Object(map) = view else { panic!("expected object view") };
        assert_eq!(map["title"].as_str(), r#"/content/blog.val.ts?p="title""#);
        assert_eq!(map["n"].as_str(), r#"/content/blog.val.ts?p="n""#);
    }

    #[test]
    fn array_view_lists_indices() {
        let s = schema(json!({"type": "array", "item": {"type": "string"}}));
        let path = ModulePath::new(r#""posts""#).unwrap();
        let view = to_shallow_view(&module(), &path, &s, &json!(["a", "b"])).unwrap();
        let ShallowView::Array(items) = view else { panic!("expected array view") };
        assert_eq!(items[1].as_str(), r#"/content/blog.val.ts?p="posts".1"#);
    }

    #[test]
    fn null_short_circuits() {
        let s = schema(json!({"type": "image"}));
        assert_eq!(
            to_shallow_view(&module(), &ModulePath::root(), &s, &Value::Null).unwrap(),
            ShallowView::Null
        );
    }

    #[test]
    fn image_requires_ref() {
        let s = schema(json!({"type": "image"}));
        let err = to_shallow_view(&module(), &ModulePath::root(), &s, &json!({"metadata": {}})).unwrap_err();
        assert!(err.to_string().contains("_ref"));
        let view = to_shallow_view(
            &module(),
            &ModulePath::root(),
            &s,
            &json!({"_ref": "/public/val/a.png", "_type": "file", "metadata": {"width": 10}}),
        )
        .unwrap();
        let ShallowView::Image(file) = view else { panic!("expected image view") };
        assert_eq!(file.reference, "/public/val/a.png");
        assert_eq!(file.metadata["width"], json!(10));
        assert!(!file.remote);
    }

    #[test]
    fn mismatch_names_expected_and_actual() {
        let s = schema(json!({"type": "array", "item": {"type": "string"}}));
        let err = to_shallow_view(&module(), &ModulePath::root(), &s, &json!({"a": 1})).unwrap_err();
        assert_eq!(err.message(), "expected array, found object");
    }

    #[test]
    fn union_view_uses_matching_variant() {
        let s = schema(json!({
            "type": "union",
            "key": "kind",
            "items": [
                {"type": "object", "items": {"kind": {"type": "literal", "value": "text"}, "text": {"type": "string"}}},
                {"type": "object", "items": {"kind": {"type": "literal", "value": "quote"}, "by": {"type": "string"}}}
            ]
        }));
        let view = to_shallow_view(&module(), &ModulePath::root(), &s, &json!({"kind": "quote", "by": "me"})).unwrap();
        let ShallowView::Object(map) = view else { panic!("expected object view") };
        assert!(map.contains_key("by"));
        assert!(!map.contains_key("text"));
    }

    #[test]
    fn shallow_view_json_form() {
        let view = ShallowView::File(FileRef {
            reference: "/public/a.pdf".to_string(),
            metadata: Map::new(),
            remote: false,
        });
        assert_eq!(view.to_json(), json!({"_ref": "/public/a.pdf"}));
        assert_eq!(ShallowView::Null.to_json(), Value::Null);
    }
}
