//! Patch apply logic.
//!
//! Applies operations to a module tree in place. Used for optimistic updates:
//! the authoritative application happens server side.

use serde_json::Value;
use val_schema::shallow::{FILE_METADATA_PROP, FILE_REF_PROP};

use super::types::{Op, OpResult, PatchError, PatchResult};

// ── Path navigation ───────────────────────────────────────────────────────

/// Convert a raw patch path to a JSON Pointer string (RFC 6901).
fn path_to_pointer(path: &[String]) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut ptr = String::with_capacity(path.len() * 8);
    for key in path {
        ptr.push('/');
        ptr.push_str(&key.replace('~', "~0").replace('/', "~1"));
    }
    ptr
}

/// Immutable navigation to the value at `path`.
pub fn get_at<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    doc.pointer(&path_to_pointer(path))
}

/// Mutable navigation to the value at `path` (must exist).
fn get_mut_at<'a>(doc: &'a mut Value, path: &[String]) -> Result<&'a mut Value, PatchError> {
    doc.pointer_mut(&path_to_pointer(path)).ok_or(PatchError::NotFound)
}

fn parse_index(key: &str) -> Result<usize, PatchError> {
    if !val_path::is_valid_index(key) {
        return Err(PatchError::InvalidIndex);
    }
    key.parse().map_err(|_| PatchError::InvalidIndex)
}

// ── Individual operation applicators ─────────────────────────────────────

fn apply_add(doc: &mut Value, path: &[String], value: Value) -> Result<Option<Value>, PatchError> {
    let Some((key, parent_path)) = path.split_last() else {
        return Ok(Some(std::mem::replace(doc, value)));
    };
    match get_mut_at(doc, parent_path)? {
        Value::Object(map) => Ok(map.insert(key.clone(), value)),
        Value::Array(arr) => {
            if key == "-" {
                arr.push(value);
                return Ok(None);
            }
            let idx = parse_index(key)?;
            if idx > arr.len() {
                return Err(PatchError::InvalidIndex);
            }
            arr.insert(idx, value);
            Ok(None)
        }
        _ => Err(PatchError::InvalidTarget),
    }
}

fn apply_remove(doc: &mut Value, path: &[String]) -> Result<Option<Value>, PatchError> {
    let Some((key, parent_path)) = path.split_last() else {
        return Err(PatchError::InvalidTarget);
    };
    match get_mut_at(doc, parent_path)? {
        Value::Object(map) => map.shift_remove(key).ok_or(PatchError::NotFound).map(Some),
        Value::Array(arr) => {
            let idx = parse_index(key)?;
            if idx >= arr.len() {
                return Err(PatchError::NotFound);
            }
            Ok(Some(arr.remove(idx)))
        }
        _ => Err(PatchError::InvalidTarget),
    }
}

fn apply_replace(doc: &mut Value, path: &[String], value: Value) -> Result<Option<Value>, PatchError> {
    let Some((key, parent_path)) = path.split_last() else {
        return Ok(Some(std::mem::replace(doc, value)));
    };
    match get_mut_at(doc, parent_path)? {
        Value::Object(map) => {
            let slot = map.get_mut(key).ok_or(PatchError::NotFound)?;
            Ok(Some(std::mem::replace(slot, value)))
        }
        Value::Array(arr) => {
            let idx = parse_index(key)?;
            let slot = arr.get_mut(idx).ok_or(PatchError::NotFound)?;
            Ok(Some(std::mem::replace(slot, value)))
        }
        _ => Err(PatchError::InvalidTarget),
    }
}

fn apply_copy(doc: &mut Value, path: &[String], from: &[String]) -> Result<Option<Value>, PatchError> {
    let src = get_at(doc, from).ok_or(PatchError::NotFound)?.clone();
    apply_add(doc, path, src)
}

fn apply_move(doc: &mut Value, path: &[String], from: &[String]) -> Result<Option<Value>, PatchError> {
    // path must not be a child of from
    if path.len() > from.len() && path[..from.len()] == from[..] {
        return Err(PatchError::InvalidTarget);
    }
    if path == from {
        return Ok(None);
    }
    let value = apply_remove(doc, from)?.ok_or(PatchError::NotFound)?;
    apply_add(doc, path, value)
}

fn apply_test(doc: &Value, path: &[String], value: &Value) -> Result<(), PatchError> {
    let actual = get_at(doc, path).ok_or(PatchError::NotFound)?;
    if actual == value {
        Ok(())
    } else {
        Err(PatchError::Test)
    }
}

/// File operations only touch the reference node: the new file path becomes
/// its `_ref` and metadata is replaced. The bytes travel separately.
fn apply_file(
    doc: &mut Value,
    path: &[String],
    file_path: Option<&str>,
    metadata: Option<&Value>,
) -> Result<Option<Value>, PatchError> {
    let target = get_mut_at(doc, path)?;
    let old = target.clone();
    let Value::Object(map) = target else {
        return Err(PatchError::InvalidTarget);
    };
    if !map.get(FILE_REF_PROP).is_some_and(Value::is_string) {
        return Err(PatchError::InvalidTarget);
    }
    if let Some(file_path) = file_path {
        map.insert(FILE_REF_PROP.to_string(), Value::String(file_path.to_string()));
    }
    if let Some(metadata) = metadata {
        map.insert(FILE_METADATA_PROP.to_string(), metadata.clone());
    }
    Ok(Some(old))
}

// ── Main apply function ───────────────────────────────────────────────────

/// Apply a single operation to the document (in-place mutation).
///
/// Returns the old value at the path for mutating ops, or `None` for `test`.
pub fn apply_op(doc: &mut Value, op: &Op) -> Result<Option<Value>, PatchError> {
    match op {
        Op::Add { path, value } => apply_add(doc, path, value.clone()),
        Op::Remove { path } => apply_remove(doc, path),
        Op::Replace { path, value } => apply_replace(doc, path, value.clone()),
        Op::Copy { path, from } => apply_copy(doc, path, from),
        Op::Move { path, from } => apply_move(doc, path, from),
        Op::Test { path, value } => {
            apply_test(doc, path, value)?;
            Ok(None)
        }
        Op::File {
            path,
            file_path,
            metadata,
            ..
        } => apply_file(doc, path, file_path.as_deref(), metadata.as_ref()),
    }
}

/// Apply a sequence of operations, returning the final document and per-op
/// results. A failing operation aborts the whole patch.
pub fn apply_ops(mut doc: Value, ops: &[Op]) -> Result<PatchResult, PatchError> {
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        let old = apply_op(&mut doc, op)?;
        results.push(OpResult { old });
    }
    Ok(PatchResult { doc, res: results })
}

/// Apply a patch atomically to `doc`: on failure `doc` is left untouched.
pub fn apply_patch(doc: &mut Value, ops: &[Op]) -> Result<(), PatchError> {
    let mut working = doc.clone();
    for op in ops {
        apply_op(&mut working, op)?;
    }
    *doc = working;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Vec<String> {
        if s.is_empty() {
            return vec![];
        }
        s.split('/').filter(|p| !p.is_empty()).map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_to_object() {
        let mut doc = json!({"a": 1});
        apply_op(&mut doc, &Op::add(path("b"), json!(2))).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn add_to_array() {
        let mut doc = json!([1, 2, 3]);
        apply_op(&mut doc, &Op::add(path("1"), json!(99))).unwrap();
        assert_eq!(doc, json!([1, 99, 2, 3]));
    }

    #[test]
    fn add_append_array() {
        let mut doc = json!([1, 2]);
        apply_op(&mut doc, &Op::add(path("-"), json!(3))).unwrap();
        assert_eq!(doc, json!([1, 2, 3]));
    }

    #[test]
    fn add_past_end_is_invalid() {
        let mut doc = json!([1]);
        assert_eq!(apply_op(&mut doc, &Op::add(path("5"), json!(3))), Err(PatchError::InvalidIndex));
    }

    #[test]
    fn numeric_key_on_object_is_a_key() {
        let mut doc = json!({"codes": {}});
        apply_op(&mut doc, &Op::add(path("codes/404"), json!("Not found"))).unwrap();
        assert_eq!(doc, json!({"codes": {"404": "Not found"}}));
    }

    #[test]
    fn remove_from_object_keeps_order() {
        let mut doc = json!({"a": 1, "b": 2, "c": 3});
        let old = apply_op(&mut doc, &Op::remove(path("a"))).unwrap();
        assert_eq!(old, Some(json!(1)));
        assert_eq!(doc.as_object().unwrap().keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn replace_requires_existing() {
        let mut doc = json!({"a": 1});
        apply_op(&mut doc, &Op::replace(path("a"), json!(99))).unwrap();
        assert_eq!(doc, json!({"a": 99}));
        assert_eq!(apply_op(&mut doc, &Op::replace(path("z"), json!(1))), Err(PatchError::NotFound));
    }

    #[test]
    fn copy_op() {
        let mut doc = json!({"a": {"x": 1}, "b": {}});
        apply_op(&mut doc, &Op::copy(path("a/x"), path("b/x"))).unwrap();
        assert_eq!(doc["b"]["x"], json!(1));
    }

    #[test]
    fn move_op() {
        let mut doc = json!({"a": 1, "b": 2});
        apply_op(&mut doc, &Op::move_op(path("a"), path("c"))).unwrap();
        assert_eq!(doc, json!({"b": 2, "c": 1}));
    }

    #[test]
    fn move_into_own_child_rejected() {
        let mut doc = json!({"a": {"b": 1}});
        assert_eq!(
            apply_op(&mut doc, &Op::move_op(path("a"), path("a/b/c"))),
            Err(PatchError::InvalidTarget)
        );
    }

    #[test]
    fn test_pass_and_fail() {
        let mut doc = json!({"a": 42});
        apply_op(&mut doc, &Op::test(path("a"), json!(42))).unwrap();
        assert_eq!(apply_op(&mut doc, &Op::test(path("a"), json!(99))), Err(PatchError::Test));
    }

    #[test]
    fn file_op_updates_reference() {
        let mut doc = json!({"hero": {"_ref": "/public/val/old.png", "_type": "file"}});
        let op = Op::File {
            path: path("hero"),
            file_path: Some("/public/val/new.png".to_string()),
            value: json!("abc123"),
            metadata: Some(json!({"width": 2})),
            remote: false,
        };
        apply_op(&mut doc, &op).unwrap();
        assert_eq!(doc["hero"]["_ref"], json!("/public/val/new.png"));
        assert_eq!(doc["hero"]["metadata"], json!({"width": 2}));
    }

    #[test]
    fn file_op_on_plain_value_rejected() {
        let mut doc = json!({"title": "x"});
        let op = Op::File {
            path: path("title"),
            file_path: None,
            value: json!("abc"),
            metadata: None,
            remote: false,
        };
        assert_eq!(apply_op(&mut doc, &op), Err(PatchError::InvalidTarget));
    }

    #[test]
    fn apply_patch_is_atomic() {
        let mut doc = json!({"a": 1});
        let ops = vec![Op::replace(path("a"), json!(2)), Op::remove(path("missing"))];
        assert_eq!(apply_patch(&mut doc, &ops), Err(PatchError::NotFound));
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn apply_ops_sequence() {
        let doc = json!({"a": 1});
        let ops = vec![Op::add(path("b"), json!(2)), Op::replace(path("a"), json!(10))];
        let result = apply_ops(doc, &ops).unwrap();
        assert_eq!(result.doc, json!({"a": 10, "b": 2}));
        assert_eq!(result.res[1].old, Some(json!(1)));
    }
}
