//! Format independent output of the normalizers

use std::collections::BTreeMap;

/// Flat map from a dotted path, like `message_stats.publish`, to its
/// numeric value.
///
/// Nested documents contribute their keys joined with `.`. Lists of
/// values contribute a single `<key>_len` entry holding their length.
pub type MetricMap = BTreeMap<String, f64>;

/// Labels and metrics of one object managed by the broker: a queue,
/// exchange, node, connection, shovel or federation link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectStats {
    /// Exactly the label names that were asked for. A label missing
    /// from the reply, or one that is not a string, has the value `""`
    pub labels: BTreeMap<String, String>,

    /// Metrics of this object, flattened the same way as a whole reply
    pub metrics: MetricMap,
}

impl ObjectStats {
    /// New record with every label in `names` set to the empty string
    pub(crate) fn with_labels(names: &[&str]) -> Self {
        Self {
            labels: names
                .iter()
                .map(|name| ((*name).to_string(), String::new()))
                .collect(),
            metrics: MetricMap::new(),
        }
    }

    /// Value of the label `name`, or `""` if the label was not
    /// requested
    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map_or("", String::as_str)
    }

    /// Value of the metric at `path`, if the object had one
    pub fn metric(&self, path: &str) -> Option<f64> {
        self.metrics.get(path).copied()
    }
}

#[cfg(test)]
mod test {
    use super::ObjectStats;

    #[test]
    fn labels_start_empty() {
        let stats = ObjectStats::with_labels(&["vhost", "name"]);
        assert_eq!(stats.labels.len(), 2);
        assert_eq!(stats.label("vhost"), "");
        assert_eq!(stats.label("not-requested"), "");
        assert!(!stats.labels.contains_key("not-requested"));
        assert_eq!(stats.metric("messages"), None);
    }
}
