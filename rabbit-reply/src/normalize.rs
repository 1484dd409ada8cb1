use std::ops::ControlFlow;

use tracing::{debug, error, trace};

use crate::model::{MetricMap, ObjectStats};
use crate::value::ReplyValue;

/// Fields that identify an object in the per-object endpoints. Most
/// endpoints use `name`, federation links use `id`
pub const DEFAULT_IDENTIFIERS: &[&str] = &["name", "id"];

/// Path of `key` nested under `prefix`
fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Length to report for a list value.
///
/// Lists of plain values are counted. A non-empty list that is itself
/// a key/value collection is a nested document instead and is not
/// counted. An empty list could be either, so it is always counted.
fn array_len<V: ReplyValue>(value: &V) -> Option<usize> {
    let len = value.list_len()?;
    (len == 0 || !value.is_key_value()).then_some(len)
}

/// Record `value` and everything below it in `map` under `prefix`
pub(crate) fn flatten_into<V: ReplyValue>(map: &mut MetricMap, prefix: &str, value: &V) {
    if let Some(number) = value.as_float() {
        map.insert(prefix.to_string(), number);
        return;
    }
    if let Some(len) = array_len(value) {
        map.insert(format!("{prefix}_len"), len as f64);
    }
    flatten_children(map, prefix, value);
}

/// Flatten each pair of a key/value collection. Anything else is a
/// leaf that has no metric and is dropped
pub(crate) fn flatten_children<V: ReplyValue>(map: &mut MetricMap, prefix: &str, value: &V) {
    let walked = value.visit_pairs(|key, child| {
        flatten_into(map, &join(prefix, key), child);
        ControlFlow::Continue(())
    });
    if let Err(err) = walked {
        trace!(prefix, "dropping value: {err}");
    }
}

/// Flatten a whole reply document
pub(crate) fn metric_map<V: ReplyValue>(root: &V) -> MetricMap {
    let mut map = MetricMap::new();
    flatten_children(&mut map, "", root);
    map
}

/// Build one [`ObjectStats`] per document in a list reply.
///
/// Documents that are not key/value collections, or that have none of
/// the `identifiers` fields, are skipped. An empty `identifiers` list
/// accepts every document.
pub(crate) fn object_stats<V: ReplyValue>(
    root: &V,
    labels: &[&str],
    identifiers: &[&str],
) -> Vec<ObjectStats> {
    let Some(documents) = root.elements() else {
        error!(
            got = root.kind(),
            "per-object reply should be a list of documents"
        );
        return Vec::new();
    };

    let mut objects = Vec::with_capacity(documents.len());
    for (index, document) in documents.iter().enumerate() {
        let mut stats = ObjectStats::with_labels(labels);
        let mut identified = identifiers.is_empty();
        let walked = document.visit_pairs(|key, value| {
            if identifiers.iter().any(|id| *id == key) {
                identified = true;
            }
            if let Some(label) = stats.labels.get_mut(key) {
                if let Some(text) = value.as_label() {
                    *label = text;
                }
            }
            flatten_into(&mut stats.metrics, key, value);
            ControlFlow::Continue(())
        });
        match walked {
            Err(err) => debug!(index, "skipping object: {err}"),
            Ok(()) if !identified => debug!(index, ?identifiers, "skipping object without an identifier"),
            Ok(()) => objects.push(stats),
        }
    }
    objects
}

/// Text of the top level field `key`. Stops at the first field with
/// that name
pub(crate) fn get_string<V: ReplyValue>(root: &V, key: &str) -> Option<String> {
    let mut found = None;
    let walked = root.visit_pairs(|name, value| {
        if name == key {
            found = Some(value.as_label());
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    if let Err(err) = walked {
        debug!(key, "cannot look up field: {err}");
    }
    found.flatten()
}
