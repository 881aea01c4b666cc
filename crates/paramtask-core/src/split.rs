//! Task-bucket splitting of a flat token stream

use indexmap::IndexMap;
use tracing::trace;

use crate::flags::{is_flag, is_flag_with_value};

/// Raw tokens grouped by the task name they follow, in first-seen order.
///
/// The untargeted `None` bucket is always present and always first.
pub type TaskBuckets = IndexMap<Option<String>, Vec<String>>;

/// Split tokens into per-task buckets.
///
/// A bare token opens a new bucket named after it unless it directly follows
/// a flag without an inline value, in which case it is that flag's value.
pub fn split_into_tasks<S: AsRef<str>>(tokens: &[S]) -> TaskBuckets {
    let mut buckets: TaskBuckets = IndexMap::new();
    buckets.insert(None, Vec::new());

    let mut current: Option<String> = None;
    let mut expecting_value = false;

    for token in tokens {
        let token = token.as_ref();

        if is_flag_with_value(token) {
            push(&mut buckets, &current, token);
            expecting_value = false;
        } else if is_flag(token) {
            push(&mut buckets, &current, token);
            expecting_value = true;
        } else if expecting_value {
            push(&mut buckets, &current, token);
            expecting_value = false;
        } else {
            trace!(task = token, "task boundary");
            current = Some(token.to_string());
            // A repeated task name starts its bucket over
            buckets.insert(current.clone(), Vec::new());
            expecting_value = false;
        }
    }

    buckets
}

fn push(buckets: &mut TaskBuckets, current: &Option<String>, token: &str) {
    buckets
        .entry(current.clone())
        .or_default()
        .push(token.to_string());
}
