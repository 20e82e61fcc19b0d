//! Descending a content tree by module path.
//!
//! `null` is a legal value only at the leaf. Descending through `null`, or
//! through a key that is absent, is a structural error; `NotFound` is reserved
//! for a module whose tree has not been loaded.

use serde_json::Value;
use val_path::{join_combined, ModuleFilePath, ModulePath, Segment};

use crate::schema::{ObjectSchema, Schema};
use crate::ResolveError;

/// Short shape name for error messages.
pub fn describe(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

pub(crate) fn structural(
    module: &ModuleFilePath,
    segments: &[Segment],
    message: impl Into<String>,
) -> ResolveError {
    ResolveError::Structural {
        path: join_combined(module, &ModulePath::from_segments(segments)),
        message: message.into(),
    }
}

/// One step into a container value. `None` means the key or index is absent.
fn step<'a>(
    module: &ModuleFilePath,
    parent: &[Segment],
    current: &'a Value,
    segment: &Segment,
) -> Result<Option<&'a Value>, ResolveError> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => Ok(map.get(key)),
        (Value::Array(arr), Segment::Index(idx)) => Ok(arr.get(*idx)),
        (Value::Object(_), Segment::Index(idx)) => Err(structural(
            module,
            parent,
            format!("expected array for index {idx}, found object"),
        )),
        (Value::Array(_), Segment::Key(key)) => Err(structural(
            module,
            parent,
            format!("expected object for key {key:?}, found array"),
        )),
        (Value::Null, _) => Err(structural(
            module,
            parent,
            format!("cannot descend into {segment} through null"),
        )),
        (other, _) => Err(structural(
            module,
            parent,
            format!(
                "expected object or array to descend into {segment}, found {}",
                describe(Some(other))
            ),
        )),
    }
}

/// Walk `root` to the node at `module_path`.
///
/// # Errors
///
/// - `ResolveError::NotFound` if `root` is `None` (module not loaded yet)
/// - `ResolveError::Structural` when descending through `null`, through an
///   absent key, or when the final key is absent
pub fn walk<'a>(
    root: Option<&'a Value>,
    module: &ModuleFilePath,
    module_path: &ModulePath,
) -> Result<&'a Value, ResolveError> {
    let root = root.ok_or_else(|| ResolveError::NotFound {
        module: module.clone(),
    })?;
    let segments = module_path.segments();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        match step(module, &segments[..i], current, segment)? {
            Some(next) => current = next,
            None if i + 1 == segments.len() => {
                return Err(structural(module, &segments, "no value at path (undefined)"))
            }
            None => {
                return Err(structural(
                    module,
                    &segments[..=i],
                    "cannot descend through undefined",
                ))
            }
        }
    }
    Ok(current)
}

/// Leaf schema and leaf value of a resolved address.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'s, 'v> {
    pub schema: &'s Schema,
    pub value: &'v Value,
}

/// Child schema of `schema` for `segment`, choosing union variants by the
/// discriminator found in `value` when present.
pub(crate) fn child_schema<'s>(
    module: &ModuleFilePath,
    parent: &[Segment],
    schema: &'s Schema,
    value: Option<&Value>,
    segment: &Segment,
) -> Result<&'s Schema, ResolveError> {
    match (schema, segment) {
        (Schema::Object(obj), Segment::Key(key)) => object_item(module, parent, obj, key),
        (Schema::Record(rec), Segment::Key(_)) => Ok(rec.item.as_ref()),
        (Schema::Array(arr), Segment::Index(_)) => Ok(arr.item.as_ref()),
        (Schema::Union(union), Segment::Key(key)) => {
            if union.is_string_union() {
                return Err(structural(module, parent, "cannot descend into a string union"));
            }
            let tag = match value {
                Some(Value::Object(map)) => match &union.key {
                    crate::schema::UnionKey::Discriminator(k) => map.get(k).and_then(Value::as_str),
                    crate::schema::UnionKey::Literal(_) => None,
                },
                _ => None,
            };
            let variant = match tag {
                Some(tag) => union.variant(tag).ok_or_else(|| {
                    structural(module, parent, format!("no union variant for discriminator {tag:?}"))
                })?,
                // Without a value pick the first variant declaring the key.
                None => union
                    .items
                    .iter()
                    .find_map(|item| match item {
                        Schema::Object(obj) if obj.items.contains_key(key) => Some(obj),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        structural(module, parent, format!("no union variant declares key {key:?}"))
                    })?,
            };
            object_item(module, parent, variant, key)
        }
        (other, segment) => Err(structural(
            module,
            parent,
            format!("cannot descend into {} schema with segment {segment}", other.kind()),
        )),
    }
}

fn object_item<'s>(
    module: &ModuleFilePath,
    parent: &[Segment],
    obj: &'s ObjectSchema,
    key: &str,
) -> Result<&'s Schema, ResolveError> {
    obj.items
        .get(key)
        .ok_or_else(|| structural(module, parent, format!("object schema has no key {key:?}")))
}

/// Walk schema and value together to the node at `module_path`.
pub fn resolve<'s, 'v>(
    module: &ModuleFilePath,
    schema: &'s Schema,
    root: Option<&'v Value>,
    module_path: &ModulePath,
) -> Result<Resolved<'s, 'v>, ResolveError> {
    let root = root.ok_or_else(|| ResolveError::NotFound {
        module: module.clone(),
    })?;
    let segments = module_path.segments();
    let mut current_schema = schema;
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        current_schema = child_schema(module, &segments[..i], current_schema, Some(current), segment)?;
        match step(module, &segments[..i], current, segment)? {
            Some(next) => current = next,
            None if i + 1 == segments.len() => {
                return Err(structural(module, &segments, "no value at path (undefined)"))
            }
            None => {
                return Err(structural(
                    module,
                    &segments[..=i],
                    "cannot descend through undefined",
                ))
            }
        }
    }
    Ok(Resolved {
        schema: current_schema,
        value: current,
    })
}

/// Schema of the node at `module_path`, using `root` only to pick union
/// variants. The node itself need not exist.
pub fn schema_at<'s>(
    module: &ModuleFilePath,
    schema: &'s Schema,
    root: Option<&Value>,
    module_path: &ModulePath,
) -> Result<&'s Schema, ResolveError> {
    let segments = module_path.segments();
    let mut current_schema = schema;
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        current_schema = child_schema(module, &segments[..i], current_schema, current, segment)?;
        current = match (current, segment) {
            (Some(Value::Object(map)), Segment::Key(key)) => map.get(key),
            (Some(Value::Array(arr)), Segment::Index(idx)) => arr.get(*idx),
            _ => None,
        };
    }
    Ok(current_schema)
}

/// Translate a patch path to a module path using the schema at each depth:
/// array children become indices and every other child is a quoted key, so
/// record keys that look numeric survive.
pub fn patch_path_to_module_path(
    module: &ModuleFilePath,
    schema: &Schema,
    root: Option<&Value>,
    patch_path: &[String],
) -> Result<ModulePath, ResolveError> {
    let mut segments: Vec<Segment> = Vec::with_capacity(patch_path.len());
    let mut current_schema = schema;
    let mut current = root;
    for raw in patch_path {
        let segment = match current_schema {
            Schema::Array(_) => match raw.parse::<usize>() {
                Ok(idx) if val_path::is_valid_index(raw) => Segment::Index(idx),
                // `-` appends; it addresses the slot after the last element.
                _ if raw == "-" => Segment::Index(match current {
                    Some(Value::Array(arr)) => arr.len(),
                    _ => 0,
                }),
                _ => {
                    return Err(structural(
                        module,
                        &segments,
                        format!("expected array index, found {raw:?}"),
                    ))
                }
            },
            _ => Segment::Key(raw.clone()),
        };
        current_schema = child_schema(module, &segments, current_schema, current, &segment)?;
        current = match (current, &segment) {
            (Some(Value::Object(map)), Segment::Key(key)) => map.get(key),
            (Some(Value::Array(arr)), Segment::Index(idx)) => arr.get(*idx),
            _ => None,
        };
        segments.push(segment);
    }
    Ok(ModulePath::from_segments(&segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module() -> ModuleFilePath {
        ModuleFilePath::new("/content/blog.val.ts").unwrap()
    }

    fn mp(s: &str) -> ModulePath {
        ModulePath::new(s).unwrap()
    }

    #[test]
    fn walk_to_leaf() {
        let doc = json!({"posts": [{"title": "Hello"}]});
        let v = walk(Some(&doc), &module(), &mp(r#""posts".0."title""#)).unwrap();
        assert_eq!(v, &json!("Hello"));
    }

    #[test]
    fn walk_root() {
        let doc = json!({"a": 1});
        assert_eq!(walk(Some(&doc), &module(), &ModulePath::root()).unwrap(), &doc);
    }

    #[test]
    fn walk_without_tree_is_not_found() {
        let err = walk(None, &module(), &mp(r#""a""#)).unwrap_err();
        assert_eq!(err, ResolveError::NotFound { module: module() });
    }

    #[test]
    fn walk_to_null_leaf_is_ok() {
        let doc = json!({"a": null});
        assert_eq!(walk(Some(&doc), &module(), &mp(r#""a""#)).unwrap(), &Value::Null);
    }

    #[test]
    fn walk_through_null_is_structural() {
        let doc = json!({"a": null});
        let err = walk(Some(&doc), &module(), &mp(r#""a"."b""#)).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn walk_to_absent_leaf_is_structural() {
        let doc = json!({"a": {}});
        let err = walk(Some(&doc), &module(), &mp(r#""a"."b""#)).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("undefined"));
    }

    #[test]
    fn walk_through_absent_is_structural() {
        let doc = json!({});
        let err = walk(Some(&doc), &module(), &mp(r#""a"."b""#)).unwrap_err();
        assert!(err.to_string().contains("through undefined"));
    }

    #[test]
    fn numeric_record_key_stays_a_key() {
        let schema = Schema::from_json(&json!({
            "type": "object",
            "items": {
                "codes": { "type": "record", "item": { "type": "string" } },
                "list": { "type": "array", "item": { "type": "string" } }
            }
        }))
        .unwrap();
        let doc = json!({"codes": {"404": "Not found"}, "list": ["x"]});
        let path = patch_path_to_module_path(
            &module(),
            &schema,
            Some(&doc),
            &["codes".to_string(), "404".to_string()],
        )
        .unwrap();
        assert_eq!(path.as_str(), r#""codes"."404""#);
        let path = patch_path_to_module_path(
            &module(),
            &schema,
            Some(&doc),
            &["list".to_string(), "0".to_string()],
        )
        .unwrap();
        assert_eq!(path.as_str(), r#""list".0"#);
        let path = patch_path_to_module_path(
            &module(),
            &schema,
            Some(&doc),
            &["list".to_string(), "-".to_string()],
        )
        .unwrap();
        assert_eq!(path.as_str(), r#""list".1"#);
    }
}
