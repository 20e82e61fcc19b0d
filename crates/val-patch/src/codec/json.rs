//! JSON codec for patch operations.
//!
//! Wire shape: `path` and `from` are arrays of raw segments, never JSON
//! Pointer strings. File operations carry `filePath`, `metadata` and `remote`
//! only when set.

use serde_json::{json, Map, Value};

use crate::types::{Op, OpKind, PatchError, PatchPath};

// ── Path helpers ──────────────────────────────────────────────────────────

fn encode_path(path: &[String]) -> Value {
    Value::Array(path.iter().cloned().map(Value::String).collect())
}

fn decode_path(v: &Value, field: &str) -> Result<PatchPath, PatchError> {
    let arr = v
        .as_array()
        .ok_or_else(|| PatchError::InvalidOp(format!("{field} must be an array of strings")))?;
    arr.iter()
        .map(|seg| {
            seg.as_str()
                .map(str::to_string)
                .ok_or_else(|| PatchError::InvalidOp(format!("{field} segments must be strings")))
        })
        .collect()
}

// ── Serialization ─────────────────────────────────────────────────────────

/// Serialize an `Op` to its wire object.
pub fn to_json(op: &Op) -> Value {
    match op {
        Op::Add { path, value } => json!({"op": "add", "path": encode_path(path), "value": value}),
        Op::Remove { path } => json!({"op": "remove", "path": encode_path(path)}),
        Op::Replace { path, value } => {
            json!({"op": "replace", "path": encode_path(path), "value": value})
        }
        Op::Move { from, path } => {
            json!({"op": "move", "from": encode_path(from), "path": encode_path(path)})
        }
        Op::Copy { from, path } => {
            json!({"op": "copy", "from": encode_path(from), "path": encode_path(path)})
        }
        Op::Test { path, value } => json!({"op": "test", "path": encode_path(path), "value": value}),
        Op::File {
            path,
            file_path,
            value,
            metadata,
            remote,
        } => {
            let mut m = Map::new();
            m.insert("op".into(), json!("file"));
            m.insert("path".into(), encode_path(path));
            if let Some(fp) = file_path {
                m.insert("filePath".into(), json!(fp));
            }
            m.insert("value".into(), value.clone());
            if let Some(md) = metadata {
                m.insert("metadata".into(), md.clone());
            }
            if *remote {
                m.insert("remote".into(), json!(true));
            }
            Value::Object(m)
        }
    }
}

/// Serialize a list of ops to a JSON array.
pub fn to_json_patch(ops: &[Op]) -> Value {
    Value::Array(ops.iter().map(to_json).collect())
}

// ── Deserialization ───────────────────────────────────────────────────────

/// Deserialize a wire object into an `Op`.
pub fn from_json(v: &Value) -> Result<Op, PatchError> {
    let obj = v
        .as_object()
        .ok_or_else(|| PatchError::InvalidOp("op must be an object".into()))?;
    let op_str = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| PatchError::InvalidOp("missing op field".into()))?;
    let kind = OpKind::from_str(op_str)?;
    let path = decode_path(
        obj.get("path")
            .ok_or_else(|| PatchError::InvalidOp("missing path".into()))?,
        "path",
    )?;
    let value = || {
        obj.get("value")
            .cloned()
            .ok_or_else(|| PatchError::InvalidOp(format!("{op_str} requires value")))
    };
    let from = || {
        obj.get("from")
            .ok_or_else(|| PatchError::InvalidOp(format!("{op_str} requires from")))
            .and_then(|f| decode_path(f, "from"))
    };

    Ok(match kind {
        OpKind::Add => Op::Add { path, value: value()? },
        OpKind::Remove => Op::Remove { path },
        OpKind::Replace => Op::Replace { path, value: value()? },
        OpKind::Move => Op::Move { from: from()?, path },
        OpKind::Copy => Op::Copy { from: from()?, path },
        OpKind::Test => Op::Test { path, value: value()? },
        OpKind::File => {
            let file_path = match obj.get("filePath") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(PatchError::InvalidOp("filePath must be a string".into())),
            };
            let remote = match obj.get("remote") {
                None => false,
                Some(Value::Bool(b)) => *b,
                Some(_) => return Err(PatchError::InvalidOp("remote must be a boolean".into())),
            };
            Op::File {
                path,
                file_path,
                value: value()?,
                metadata: obj.get("metadata").filter(|m| !m.is_null()).cloned(),
                remote,
            }
        }
    })
}

/// Deserialize a JSON array of ops.
pub fn from_json_patch(v: &Value) -> Result<Vec<Op>, PatchError> {
    let arr = v
        .as_array()
        .ok_or_else(|| PatchError::InvalidOp("patch must be an array".into()))?;
    arr.iter().map(from_json).collect()
}
