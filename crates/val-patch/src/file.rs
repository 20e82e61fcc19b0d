//! File operation desugaring.
//!
//! A `file` op carries its bytes inline until it is queued. Desugaring swaps
//! the payload for its SHA-256 hex digest and emits a [`PendingUpload`] that
//! ships the bytes out of band, keyed by the patch id.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use val_schema::SchemaKind;

use crate::types::{Op, PatchError, PatchId};

/// Directory new files are written to when the op names no file path.
pub const DEFAULT_FILE_DIRECTORY: &str = "/public/val";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Image,
}

impl TryFrom<SchemaKind> for FileKind {
    type Error = PatchError;

    fn try_from(kind: SchemaKind) -> Result<Self, Self::Error> {
        match kind {
            SchemaKind::File => Ok(FileKind::File),
            SchemaKind::Image => Ok(FileKind::Image),
            other => Err(PatchError::FileNotAllowed(other)),
        }
    }
}

/// What the uploaded file's patch builds on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParentRef {
    Head {
        #[serde(rename = "headBaseSha")]
        head_base_sha: String,
    },
    Patch {
        #[serde(rename = "patchId")]
        patch_id: PatchId,
    },
}

/// Body of `POST /upload/patches/{patchId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadRequest {
    pub file_path: String,
    pub parent_ref: ParentRef,
    pub data: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResponse {
    pub patch_id: PatchId,
    pub file_path: String,
}

/// An upload scheduled by desugaring; the patch is incomplete until it acks.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub patch_id: PatchId,
    pub sha256: String,
    pub request: FileUploadRequest,
}

/// Decoded inline payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Decode a data URL (`data:image/png;base64,...`) or bare base64.
pub fn decode_payload(payload: &str) -> Result<Payload, PatchError> {
    let Some(rest) = payload.strip_prefix("data:") else {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| PatchError::InvalidPayload(e.to_string()))?;
        return Ok(Payload {
            mime_type: None,
            bytes,
        });
    };
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| PatchError::InvalidPayload("data url without ','".into()))?;
    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (header, false),
    };
    let mime = media_type.split(';').next().unwrap_or_default().trim();
    let bytes = if is_base64 {
        STANDARD
            .decode(data)
            .map_err(|e| PatchError::InvalidPayload(e.to_string()))?
    } else {
        urlencoding::decode_binary(data.as_bytes()).into_owned()
    };
    Ok(Payload {
        mime_type: (!mime.is_empty()).then(|| mime.to_string()),
        bytes,
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A value already replaced by its digest needs no upload.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn extension_of(mime_type: Option<&str>) -> &str {
    let Some(subtype) = mime_type.and_then(|m| m.split_once('/')).map(|(_, s)| s) else {
        return "bin";
    };
    match subtype {
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        "plain" => "txt",
        "markdown" => "md",
        "javascript" => "js",
        "mpeg" => "mp3",
        "quicktime" => "mov",
        "x-icon" | "vnd.microsoft.icon" => "ico",
        other => {
            let base = other.split('+').next().unwrap_or_default();
            let base = base.strip_prefix("x-").unwrap_or(base);
            if base.is_empty() || !base.bytes().all(|b| b.is_ascii_alphanumeric()) {
                "bin"
            } else {
                base
            }
        }
    }
}

/// Replace inline payloads of `file` ops with their digest.
///
/// Ops without a file path get one under [`DEFAULT_FILE_DIRECTORY`] named by
/// digest so the optimistic tree and the upload agree. Returns the rewritten
/// ops and one upload per rewritten op.
pub fn desugar_file_ops(
    ops: Vec<Op>,
    patch_id: PatchId,
    parent_ref: &ParentRef,
) -> Result<(Vec<Op>, Vec<PendingUpload>), PatchError> {
    let mut uploads = Vec::new();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        let (path, file_path, value, metadata, remote) = match op {
            Op::File {
                path,
                file_path,
                value,
                metadata,
                remote,
            } => (path, file_path, value, metadata, remote),
            other => {
                out.push(other);
                continue;
            }
        };
        let data = value
            .as_str()
            .ok_or_else(|| PatchError::InvalidPayload("file value must be a string".into()))?;
        if is_sha256_hex(data) {
            out.push(Op::File {
                path,
                file_path,
                value,
                metadata,
                remote,
            });
            continue;
        }
        let payload = decode_payload(data)?;
        let sha256 = sha256_hex(&payload.bytes);
        let mime = payload.mime_type.as_deref();
        let kind = if mime.is_some_and(|m| m.starts_with("image/")) {
            FileKind::Image
        } else {
            FileKind::File
        };
        let file_path = file_path.unwrap_or_else(|| {
            format!("{DEFAULT_FILE_DIRECTORY}/{}.{}", &sha256[..16], extension_of(mime))
        });
        uploads.push(PendingUpload {
            patch_id,
            sha256: sha256.clone(),
            request: FileUploadRequest {
                file_path: file_path.clone(),
                parent_ref: parent_ref.clone(),
                data: data.to_string(),
                kind,
                metadata: metadata.clone(),
                remote,
            },
        });
        out.push(Op::File {
            path,
            file_path: Some(file_path),
            value: Value::String(sha256),
            metadata,
            remote,
        });
    }
    Ok((out, uploads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HELLO_SHA: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn file_op(value: &str) -> Op {
        Op::File {
            path: vec!["hero".into()],
            file_path: None,
            value: json!(value),
            metadata: Some(json!({"alt": "x"})),
            remote: false,
        }
    }

    #[test]
    fn decodes_data_url() {
        let p = decode_payload("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(p.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(p.bytes, b"hello");
    }

    #[test]
    fn plain_data_url_is_percent_decoded() {
        let p = decode_payload("data:text/plain;charset=utf-8,hel%6Co").unwrap();
        assert_eq!(p.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(p.bytes, b"hello");
        assert_eq!(sha256_hex(&p.bytes), HELLO_SHA);
    }

    #[test]
    fn extensions_follow_mime_type() {
        assert_eq!(extension_of(Some("image/png")), "png");
        assert_eq!(extension_of(Some("image/jpeg")), "jpg");
        assert_eq!(extension_of(Some("image/svg+xml")), "svg");
        assert_eq!(extension_of(Some("text/plain")), "txt");
        assert_eq!(extension_of(Some("application/x-tar")), "tar");
        assert_eq!(extension_of(Some("application/vnd.ms-excel")), "bin");
        assert_eq!(extension_of(None), "bin");
    }

    #[test]
    fn desugared_text_file_gets_txt_name() {
        let parent = ParentRef::Head { head_base_sha: "abc".into() };
        let (ops, _) = desugar_file_ops(vec![file_op("data:text/plain,hello")], PatchId::new(), &parent).unwrap();
        let Op::File { value, file_path, .. } = &ops[0] else { panic!("expected file op") };
        assert_eq!(value, &json!(HELLO_SHA));
        assert_eq!(file_path.as_deref(), Some("/public/val/2cf24dba5fb0a30e.txt"));
    }

    #[test]
    fn decodes_bare_base64() {
        assert_eq!(decode_payload("aGVsbG8=").unwrap().bytes, b"hello");
        assert!(decode_payload("not base64!").is_err());
    }

    #[test]
    fn hashes_hello() {
        assert_eq!(sha256_hex(b"hello"), HELLO_SHA);
        assert!(is_sha256_hex(HELLO_SHA));
    }

    #[test]
    fn desugar_replaces_payload_with_hash() {
        let id = PatchId::new();
        let parent = ParentRef::Head {
            head_base_sha: "abc".into(),
        };
        let ops = vec![
            Op::replace(vec!["title".into()], json!("x")),
            file_op("data:image/png;base64,aGVsbG8="),
        ];
        let (ops, uploads) = desugar_file_ops(ops, id, &parent).unwrap();
        assert_eq!(uploads.len(), 1);
        let Op::File { value, file_path, .. } = &ops[1] else { panic!("expected file op") };
        assert_eq!(value, &json!(HELLO_SHA));
        assert_eq!(file_path.as_deref(), Some("/public/val/2cf24dba5fb0a30e.png"));
        assert_eq!(uploads[0].patch_id, id);
        assert_eq!(uploads[0].request.kind, FileKind::Image);
        assert_eq!(uploads[0].request.data, "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn hashed_values_are_left_alone() {
        let parent = ParentRef::Patch { patch_id: PatchId::new() };
        let (ops, uploads) = desugar_file_ops(vec![file_op(HELLO_SHA)], PatchId::new(), &parent).unwrap();
        assert!(uploads.is_empty());
        assert_eq!(ops[0], file_op(HELLO_SHA));
    }

    #[test]
    fn upload_request_wire_shape() {
        let id: PatchId = "6f9619ff-8b86-4011-b42d-00c04fc964ff".parse().unwrap();
        let req = FileUploadRequest {
            file_path: "/public/val/a.png".into(),
            parent_ref: ParentRef::Patch { patch_id: id },
            data: "aGVsbG8=".into(),
            kind: FileKind::Image,
            metadata: None,
            remote: false,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "filePath": "/public/val/a.png",
                "parentRef": {"type": "patch", "patchId": "6f9619ff-8b86-4011-b42d-00c04fc964ff"},
                "data": "aGVsbG8=",
                "type": "image",
                "metadata": null,
                "remote": false
            })
        );
    }
}
