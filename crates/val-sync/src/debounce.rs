//! Per-address buffer for continuous-input edits.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use val_path::{ModuleFilePath, SourcePath};
use val_patch::{util::collapse_replaces, Op};
use val_schema::SchemaKind;

/// Edits to one combined address, waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct DebouncedEdit {
    pub module: ModuleFilePath,
    pub kind: SchemaKind,
    pub ops: Vec<Op>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DebounceBuffer {
    entries: IndexMap<SourcePath, DebouncedEdit>,
}

impl DebounceBuffer {
    pub fn push(&mut self, source_path: &SourcePath, kind: SchemaKind, ops: Vec<Op>, created_at: DateTime<Utc>) {
        match self.entries.get_mut(source_path) {
            Some(edit) => {
                edit.kind = kind;
                let mut merged = std::mem::take(&mut edit.ops);
                merged.extend(ops);
                edit.ops = collapse_replaces(merged);
            }
            None => {
                self.entries.insert(
                    source_path.clone(),
                    DebouncedEdit {
                        module: source_path.module_file_path(),
                        kind,
                        ops: collapse_replaces(ops),
                        created_at,
                    },
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Take every buffered edit in first-seen order, one per address.
    /// Keystroke runs are already collapsed as they arrive.
    pub fn drain(&mut self) -> Vec<(SourcePath, DebouncedEdit)> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn title() -> SourcePath {
        SourcePath::new(r#"/content/blog.val.ts?p="title""#).unwrap()
    }

    #[test]
    fn coalesces_per_address() {
        let mut buffer = DebounceBuffer::default();
        let now = Utc::now();
        for text in ["H", "He", "Hey"] {
            buffer.push(&title(), SchemaKind::String, vec![Op::replace(vec!["title".into()], json!(text))], now);
        }
        let other = SourcePath::new(r#"/content/blog.val.ts?p="body""#).unwrap();
        buffer.push(&other, SchemaKind::String, vec![Op::replace(vec!["body".into()], json!("b"))], now);
        assert_eq!(buffer.len(), 2);

        let drained = buffer.drain();
        assert!(buffer.is_empty());
        assert_eq!(drained[0].0, title());
        assert_eq!(drained[0].1.ops, vec![Op::replace(vec!["title".into()], json!("Hey"))]);
        assert_eq!(drained[0].1.module.as_str(), "/content/blog.val.ts");
        assert_eq!(drained[1].0, other);
    }

    #[test]
    fn keystroke_runs_stay_bounded_before_drain() {
        let mut buffer = DebounceBuffer::default();
        let now = Utc::now();
        for n in 0..500 {
            buffer.push(&title(), SchemaKind::String, vec![Op::replace(vec!["title".into()], json!(n))], now);
        }
        assert_eq!(buffer.entries[&title()].ops, vec![Op::replace(vec!["title".into()], json!(499))]);
    }
}
