//! Normalize replies from the `RabbitMQ` management API.
//!
//! The management plugin answers either in JSON or, when asked with
//! `Accept: application/bert`, in the Erlang external term format. The
//! two encodings carry the same data with different conventions for
//! key/value collections, so this crate reduces both to one model:
//!
//! - a [`MetricMap`], a flat map from dotted paths to `f64` values, and
//! - a list of [`ObjectStats`], one per queue, exchange, node, etc.,
//!   each holding a fixed set of labels and its own [`MetricMap`].
//!
//! Pick the decoder with [`make_reply`] based on the `Content-Type` of
//! the response and use the returned [`Reply`]:
//!
//! ```rust
//! use rabbit_reply::{make_reply, Format, Reply};
//!
//! let body = br#"{"object_totals":{"queues":3},"node":"rabbit@host","partitions":[]}"#;
//! let reply = make_reply(Format::Json, body);
//!
//! let metrics = reply.metric_map();
//! assert_eq!(metrics["object_totals.queues"], 3.0);
//! assert_eq!(metrics["partitions_len"], 0.0);
//! assert_eq!(reply.get_string("node").as_deref(), Some("rabbit@host"));
//! ```
//!
//! Per-object replies, like `/api/queues`, are a list of documents:
//!
//! ```rust
//! use rabbit_reply::{make_reply, Format, Reply, DEFAULT_IDENTIFIERS};
//!
//! let body = br#"[{"name":"q1","messages":14},{"name":"q2","vhost":"foo","messages":24}]"#;
//! let reply = make_reply(Format::Json, body);
//! let queues = reply.object_stats(&["name", "vhost"], DEFAULT_IDENTIFIERS);
//! assert_eq!(queues.len(), 2);
//! assert_eq!(queues[0].label("vhost"), "");
//! assert_eq!(queues[1].metric("messages"), Some(24.0));
//! ```
//!
//! Replies that fail to decode are never an error for these
//! operations. They produce an empty map or an empty list and log the
//! cause, so that one broken endpoint only loses its own metrics. The
//! cause is still available from [`Reply::decode_error`].
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::single_match_else)]
#![warn(
    clippy::missing_docs_in_private_items,
    clippy::self_named_module_files,
    clippy::perf,
    clippy::missing_panics_doc,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::enum_variant_names
)]
#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]

mod json;
mod model;
/// Generic flattening over any decoded value
mod normalize;
mod reply;
mod value;

#[cfg(feature = "bert")]
pub mod bert;

pub use json::JsonReply;
pub use model::{MetricMap, ObjectStats};
pub use normalize::DEFAULT_IDENTIFIERS;
pub use reply::{make_reply, Format, Reply, ReplyError};
pub use value::{NotKeyValue, ReplyValue};

#[cfg(feature = "bert")]
pub use bert::BertReply;
