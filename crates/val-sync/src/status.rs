//! Status values exposed to UI layers.

use serde::Serialize;
use serde_json::Value;
use val_patch::PatchFailure;

/// Per-module sync status. This is the only shape UI layers branch on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
    Loading,
    Success { data: Value },
    Error { errors: Vec<PatchFailure> },
}

impl SyncStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, SyncStatus::Loading)
    }

    pub fn errors(&self) -> &[PatchFailure] {
        match self {
            SyncStatus::Error { errors } => errors,
            _ => &[],
        }
    }
}

/// Engine-wide reachability of the content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Available,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        assert_eq!(serde_json::to_value(SyncStatus::Loading).unwrap(), json!({"status": "loading"}));
        assert_eq!(
            serde_json::to_value(SyncStatus::Success { data: json!({"a": 1}) }).unwrap(),
            json!({"status": "success", "data": {"a": 1}})
        );
        let failed = SyncStatus::Error {
            errors: vec![PatchFailure::new("boom", None)],
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "error", "errors": [{"message": "boom"}]})
        );
        assert_eq!(failed.errors().len(), 1);
    }
}
