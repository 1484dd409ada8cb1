//! Replies encoded as JSON

use std::ops::ControlFlow;

use serde_json::Value;
use tracing::warn;

use crate::model::{MetricMap, ObjectStats};
use crate::normalize;
use crate::reply::{Format, Reply, ReplyError};
use crate::value::{NotKeyValue, ReplyValue};

impl ReplyValue for Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn visit_pairs<'a, F>(&'a self, mut visit: F) -> Result<(), NotKeyValue>
    where
        F: FnMut(&str, &'a Self) -> ControlFlow<()>,
    {
        let Value::Object(fields) = self else {
            return Err(NotKeyValue(self.kind()));
        };
        for (key, value) in fields {
            if visit(key, value).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64(),
            Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn as_label(&self) -> Option<String> {
        match self {
            Value::String(text) => Some(text.clone()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    fn list_len(&self) -> Option<usize> {
        self.as_array().map(Vec::len)
    }

    fn elements(&self) -> Option<&[Self]> {
        self.as_array().map(Vec::as_slice)
    }
}

/// A management API reply decoded from JSON
#[derive(Debug)]
pub struct JsonReply {
    /// The decoded document, or why it could not be decoded
    root: Result<Value, ReplyError>,
}

impl JsonReply {
    /// Decode `body`. A body that is not valid JSON still makes a
    /// reply, one that has no metrics or objects
    pub fn new(body: &[u8]) -> Self {
        let root: Result<Value, ReplyError> = serde_json::from_slice(body).map_err(ReplyError::from);
        if let Err(err) = &root {
            warn!(bytes = body.len(), "{err}");
        }
        Self { root }
    }
}

impl Reply for JsonReply {
    fn format(&self) -> Format {
        Format::Json
    }

    fn metric_map(&self) -> MetricMap {
        self.root
            .as_ref()
            .map(normalize::metric_map)
            .unwrap_or_default()
    }

    fn object_stats(&self, labels: &[&str], identifiers: &[&str]) -> Vec<ObjectStats> {
        self.root
            .as_ref()
            .map(|root| normalize::object_stats(root, labels, identifiers))
            .unwrap_or_default()
    }

    fn get_string(&self, key: &str) -> Option<String> {
        normalize::get_string(self.root.as_ref().ok()?, key)
    }

    fn decode_error(&self) -> Option<&ReplyError> {
        self.root.as_ref().err()
    }
}
