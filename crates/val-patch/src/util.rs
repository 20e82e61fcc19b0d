//! Helpers over operation lists.

use crate::types::Op;

/// Returns `true` when `path` equals `prefix` or lies below it.
pub fn path_starts_with(path: &[String], prefix: &[String]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

/// Closure matching ops whose target lies at or below `prefix`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use val_patch::{util::matcher, Op};
///
/// let prefix = vec!["posts".to_string()];
/// let under_posts = matcher(&prefix);
/// assert!(under_posts(&Op::add(vec!["posts".into(), "0".into()], json!({}))));
/// assert!(!under_posts(&Op::remove(vec!["pages".into()])));
/// ```
pub fn matcher(prefix: &[String]) -> impl Fn(&Op) -> bool + '_ {
    move |op: &Op| path_starts_with(op.path(), prefix)
}

/// Collapse runs of `replace` on the same path into the last one.
///
/// Continuous input produces one replace per keystroke; only the final value
/// matters. Any other op in between breaks the run.
pub fn collapse_replaces(ops: Vec<Op>) -> Vec<Op> {
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());
    for op in ops {
        let same_target = matches!(
            (out.last(), &op),
            (Some(Op::Replace { path: last, .. }), Op::Replace { path, .. }) if last == path
        );
        if same_target {
            out.pop();
        }
        out.push(op);
    }
    out
}
