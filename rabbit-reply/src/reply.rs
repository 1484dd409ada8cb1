//! The format independent reply interface

use std::fmt;

use crate::json::JsonReply;
use crate::model::{MetricMap, ObjectStats};

/// Why a reply body could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// The body is not a JSON document
    #[error("invalid JSON reply: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is not a supported Erlang term
    #[cfg(feature = "bert")]
    #[error("invalid BERT reply: {0}")]
    Bert(#[from] crate::bert::DecodeError),
}

/// Wire format of a management API reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `application/json`
    Json,

    /// Erlang external term format, `application/bert`
    #[cfg(feature = "bert")]
    Bert,
}

impl Format {
    /// Format of a response with the given `Content-Type` header.
    /// Parameters such as `charset` are ignored
    ///
    /// ```rust
    /// use rabbit_reply::Format;
    /// assert_eq!(
    ///     Format::from_content_type("application/json; charset=utf-8"),
    ///     Some(Format::Json)
    /// );
    /// assert_eq!(Format::from_content_type("text/html"), None);
    /// ```
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if media_type.eq_ignore_ascii_case("application/json") {
            return Some(Format::Json);
        }
        #[cfg(feature = "bert")]
        if media_type.eq_ignore_ascii_case("application/bert")
            || media_type.eq_ignore_ascii_case("application/x-erlang-binary")
        {
            return Some(Format::Bert);
        }
        None
    }

    /// Media type to ask for in an `Accept` header
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            #[cfg(feature = "bert")]
            Format::Bert => "application/bert",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            #[cfg(feature = "bert")]
            Format::Bert => f.write_str("bert"),
        }
    }
}

/// A decoded management API reply.
///
/// The body is decoded once when the reply is made. None of these
/// operations fail: a reply that could not be decoded has no metrics,
/// no objects and no fields.
pub trait Reply: fmt::Debug + Send + Sync {
    /// Wire format the reply was decoded from
    fn format(&self) -> Format;

    /// Every numeric value in the document, keyed by its dotted path
    fn metric_map(&self) -> MetricMap;

    /// One record per document of a list reply, such as `/api/queues`.
    ///
    /// Each record has exactly the label names in `labels`. Documents
    /// without any of the `identifiers` fields are skipped, see
    /// [`DEFAULT_IDENTIFIERS`](crate::DEFAULT_IDENTIFIERS).
    fn object_stats(&self, labels: &[&str], identifiers: &[&str]) -> Vec<ObjectStats>;

    /// Text of the top level field `key`, if there is one and it has a
    /// textual form
    fn get_string(&self, key: &str) -> Option<String>;

    /// Why the body could not be decoded, if it could not
    fn decode_error(&self) -> Option<&ReplyError>;
}

/// Decode `body` with the decoder for `format`
pub fn make_reply(format: Format, body: &[u8]) -> Box<dyn Reply> {
    match format {
        Format::Json => Box::new(JsonReply::new(body)),
        #[cfg(feature = "bert")]
        Format::Bert => Box::new(crate::bert::BertReply::new(body)),
    }
}
