//! Grouping of raw patches into display change sets.
//!
//! [`aggregate`] is a pure function of its input: callers rebuild the sets on
//! every queue change instead of updating them in place.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use val_path::{from_patch_path, ModuleFilePath, ModulePath, SourcePath};

use crate::types::{Op, OpKind, PatchFailure, PatchId};

/// One raw patch as queued or reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRecord {
    pub patch_id: PatchId,
    pub module_file_path: ModuleFilePath,
    pub ops: Vec<Op>,
    pub created_at: DateTime<Utc>,
    pub author: Option<String>,
}

/// Patches sharing one (module, module path) target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSet {
    pub module_file_path: ModuleFilePath,
    pub module_path: ModulePath,
    pub op_kinds: BTreeSet<OpKind>,
    pub first_created_at: DateTime<Utc>,
    pub last_created_at: DateTime<Utc>,
    pub authors: Vec<String>,
    pub patch_ids: Vec<PatchId>,
}

impl PatchSet {
    pub fn source_path(&self) -> SourcePath {
        self.module_file_path.source_path(&self.module_path)
    }
}

/// Group `records` by the address each operation targets.
///
/// Groups appear in first-seen order. A record whose patch id was already
/// seen is ignored, so resubmitting the same patch never duplicates effects.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use serde_json::json;
/// use val_path::ModuleFilePath;
/// use val_patch::{aggregate, Op, PatchId, PatchRecord};
///
/// let module = ModuleFilePath::new("/content/blog.val.ts").unwrap();
/// let record = |path: &str| PatchRecord {
///     patch_id: PatchId::new(),
///     module_file_path: module.clone(),
///     ops: vec![Op::replace(vec![path.to_string()], json!("x"))],
///     created_at: Utc::now(),
///     author: None,
/// };
/// let sets = aggregate(&[record("title"), record("title"), record("body")]);
/// assert_eq!(sets.len(), 2);
/// assert_eq!(sets[0].patch_ids.len(), 2);
/// ```
pub fn aggregate(records: &[PatchRecord]) -> Vec<PatchSet> {
    aggregate_with(records, |_, path| from_patch_path(path))
}

/// [`aggregate`] with a caller-supplied translation from patch path to
/// module path, for callers that can tell record keys from array indices.
pub fn aggregate_with<F>(records: &[PatchRecord], mut module_path_of: F) -> Vec<PatchSet>
where
    F: FnMut(&ModuleFilePath, &[String]) -> ModulePath,
{
    let mut seen: HashSet<PatchId> = HashSet::new();
    let mut groups: IndexMap<(ModuleFilePath, ModulePath), PatchSet> = IndexMap::new();
    for record in records {
        if !seen.insert(record.patch_id) {
            continue;
        }
        for op in &record.ops {
            let module_path = module_path_of(&record.module_file_path, op.path().as_slice());
            let set = groups
                .entry((record.module_file_path.clone(), module_path.clone()))
                .or_insert_with(|| PatchSet {
                    module_file_path: record.module_file_path.clone(),
                    module_path,
                    op_kinds: BTreeSet::new(),
                    first_created_at: record.created_at,
                    last_created_at: record.created_at,
                    authors: Vec::new(),
                    patch_ids: Vec::new(),
                });
            set.op_kinds.insert(op.kind());
            set.first_created_at = set.first_created_at.min(record.created_at);
            set.last_created_at = set.last_created_at.max(record.created_at);
            if let Some(author) = &record.author {
                if !set.authors.contains(author) {
                    set.authors.push(author.clone());
                }
            }
            if set.patch_ids.last() != Some(&record.patch_id) {
                set.patch_ids.push(record.patch_id);
            }
        }
    }
    groups.into_values().collect()
}

/// Counts shown in the edit summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSummary {
    pub modules: usize,
    pub changes: usize,
    pub patches: usize,
    pub errors: usize,
}

/// Summarize change sets and server failures. Skipped failures stay visible
/// for revert but are not counted.
pub fn summarize(sets: &[PatchSet], errors: &[PatchFailure]) -> EditSummary {
    let modules: HashSet<&ModuleFilePath> = sets.iter().map(|s| &s.module_file_path).collect();
    let patches: HashSet<&PatchId> = sets.iter().flat_map(|s| &s.patch_ids).collect();
    EditSummary {
        modules: modules.len(),
        changes: sets.len(),
        patches: patches.len(),
        errors: errors.iter().filter(|e| !e.skipped).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use val_path::Segment;
    use serde_json::json;

    fn module(s: &str) -> ModuleFilePath {
        ModuleFilePath::new(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(m: &str, ops: Vec<Op>, secs: i64, author: Option<&str>) -> PatchRecord {
        PatchRecord {
            patch_id: PatchId::new(),
            module_file_path: module(m),
            ops,
            created_at: at(secs),
            author: author.map(str::to_string),
        }
    }

    fn title() -> Vec<String> {
        vec!["posts".into(), "0".into(), "title".into()]
    }

    #[test]
    fn groups_by_module_and_path() {
        let records = vec![
            record("/content/blog.val.ts", vec![Op::replace(title(), json!("a"))], 20, Some("ann")),
            record("/content/blog.val.ts", vec![Op::test(title(), json!("a"))], 10, Some("bob")),
            record("/content/blog.val.ts", vec![Op::remove(vec!["posts".into(), "1".into()])], 30, Some("ann")),
        ];
        let sets = aggregate(&records);
        assert_eq!(sets.len(), 2);
        let shared = &sets[0];
        assert_eq!(shared.module_path.as_str(), r#""posts".0."title""#);
        assert_eq!(shared.op_kinds, BTreeSet::from([OpKind::Replace, OpKind::Test]));
        assert_eq!(shared.first_created_at, at(10));
        assert_eq!(shared.last_created_at, at(20));
        assert_eq!(shared.authors, vec!["ann", "bob"]);
        assert_eq!(shared.patch_ids, vec![records[0].patch_id, records[1].patch_id]);
        assert_eq!(
            shared.source_path().as_str(),
            r#"/content/blog.val.ts?p="posts".0."title""#
        );
    }

    #[test]
    fn same_path_in_other_module_is_separate() {
        let records = vec![
            record("/content/blog.val.ts", vec![Op::replace(title(), json!("a"))], 1, None),
            record("/content/news.val.ts", vec![Op::replace(title(), json!("a"))], 1, None),
        ];
        assert_eq!(aggregate(&records).len(), 2);
    }

    #[test]
    fn duplicate_patch_ids_do_not_duplicate() {
        let r = record("/content/blog.val.ts", vec![Op::replace(title(), json!("a"))], 1, None);
        let sets = aggregate(&[r.clone(), r.clone()]);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].patch_ids, vec![r.patch_id]);
    }

    #[test]
    fn one_patch_touching_a_path_twice_is_listed_once() {
        let r = record(
            "/content/blog.val.ts",
            vec![Op::test(title(), json!("a")), Op::replace(title(), json!("b"))],
            1,
            None,
        );
        let sets = aggregate(&[r]);
        assert_eq!(sets[0].patch_ids.len(), 1);
        assert_eq!(sets[0].op_kinds.len(), 2);
    }

    #[test]
    fn resolver_keeps_numeric_record_keys() {
        let codes = vec!["codes".to_string(), "404".to_string()];
        let records = vec![record("/content/blog.val.ts", vec![Op::replace(codes.clone(), json!("x"))], 1, None)];
        assert_eq!(aggregate(&records)[0].module_path.as_str(), r#""codes".404"#);

        let sets = aggregate_with(&records, |_, path| {
            ModulePath::from_segments(&path.iter().cloned().map(Segment::Key).collect::<Vec<_>>())
        });
        assert_eq!(sets[0].module_path.as_str(), r#""codes"."404""#);
        assert_eq!(sets[0].source_path().as_str(), r#"/content/blog.val.ts?p="codes"."404""#);
    }

    #[test]
    fn summary_excludes_skipped_errors() {
        let records = vec![
            record("/content/blog.val.ts", vec![Op::replace(title(), json!("a"))], 1, None),
            record("/content/news.val.ts", vec![Op::replace(title(), json!("a"))], 1, None),
        ];
        let sets = aggregate(&records);
        let errors = vec![
            PatchFailure::new("conflict", Some(records[0].patch_id)),
            PatchFailure {
                skipped: true,
                ..PatchFailure::new("skipped", Some(records[1].patch_id))
            },
        ];
        assert_eq!(
            summarize(&sets, &errors),
            EditSummary {
                modules: 2,
                changes: 2,
                patches: 2,
                errors: 1
            }
        );
    }
}
