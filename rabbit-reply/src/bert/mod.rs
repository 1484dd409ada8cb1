//! Replies encoded in the Erlang external term format.
//!
//! Depending on its version, the broker encodes a JSON object in one of
//! three ways:
//!
//! - a map, `#{<<"name">> => <<"q1">>}`,
//! - a proplist, `[{name, <<"q1">>}]`,
//! - a proplist tagged for the old JSON encoder,
//!   `{struct, [{name, <<"q1">>}]}`.
//!
//! All three are read as key/value collections, so the result of
//! normalizing a reply is the same as for its JSON form.

use std::borrow::Cow;
use std::ops::ControlFlow;

use eetf::{Atom, List, Tuple};
use tracing::{trace, warn};

use crate::model::{MetricMap, ObjectStats};
use crate::normalize;
use crate::reply::{Format, Reply, ReplyError};
use crate::value::{NotKeyValue, ReplyValue};

pub mod term;

pub use term::{decode, DecodeError, Term};

/// Tag atom of the `{struct, Proplist}` wrapping
const STRUCT_TAG: &str = "struct";

/// Whether `term` can be the body of a `{struct, V}` object
fn is_object_body(term: &Term) -> bool {
    matches!(term, Term::List(_) | Term::Map(_))
}

/// `V` if `term` is `{struct, V}` and `V` is a list or a map
fn struct_tagged(term: &Term) -> Option<&Term> {
    let (Term::Tuple(Tuple { elements }) | Term::List(List { elements })) = term else {
        return None;
    };
    match elements.as_slice() {
        [Term::Atom(Atom { name }), inner] if name == STRUCT_TAG && is_object_body(inner) => {
            Some(inner)
        }
        _ => None,
    }
}

/// Key and value if `term` is one `{Key, Value}` element of a
/// proplist. A `{struct, V}` tuple around a list or map is a whole
/// object, not a pair, while `{struct, 5}` is the pair for a `struct`
/// field
fn proplist_pair(term: &Term) -> Option<(Cow<'_, str>, &Term)> {
    if struct_tagged(term).is_some() {
        return None;
    }
    let Term::Tuple(Tuple { elements }) = term else {
        return None;
    };
    match elements.as_slice() {
        [Term::Atom(Atom { name }), value] => Some((Cow::Borrowed(name.as_str()), value)),
        [Term::Binary(key), value] => std::str::from_utf8(&key.bytes)
            .ok()
            .map(|key| (Cow::Borrowed(key), value)),
        _ => None,
    }
}

/// Text of a map key
fn key_text(term: &Term) -> Option<Cow<'_, str>> {
    match term {
        Term::Atom(Atom { name }) => Some(Cow::Borrowed(name.as_str())),
        Term::Binary(binary) => Some(String::from_utf8_lossy(&binary.bytes)),
        Term::ByteList(list) => Some(String::from_utf8_lossy(&list.bytes)),
        _ => None,
    }
}

impl ReplyValue for Term {
    fn kind(&self) -> &'static str {
        match self {
            Term::Atom(_) => "atom",
            Term::FixInteger(_) | Term::BigInteger(_) => "integer",
            Term::Float(_) => "float",
            Term::Binary(_) => "binary",
            Term::ByteList(_) => "string",
            Term::List(_) => "list",
            Term::ImproperList(_) => "improper list",
            Term::Tuple(_) => "tuple",
            Term::Map(_) => "map",
            _ => "unsupported",
        }
    }

    fn visit_pairs<'a, F>(&'a self, mut visit: F) -> Result<(), NotKeyValue>
    where
        F: FnMut(&str, &'a Self) -> ControlFlow<()>,
    {
        if let Some(inner) = struct_tagged(self) {
            return inner.visit_pairs(visit);
        }
        match self {
            Term::List(List { elements }) => {
                if !elements.iter().all(|item| proplist_pair(item).is_some()) {
                    return Err(NotKeyValue("list"));
                }
                for (key, value) in elements.iter().filter_map(proplist_pair) {
                    if visit(&key, value).is_break() {
                        break;
                    }
                }
                Ok(())
            }
            Term::Map(map) => {
                for (key, value) in &map.entries {
                    let Some(key) = key_text(key) else {
                        trace!(key = key.kind(), "skipping map entry");
                        continue;
                    };
                    if visit(&key, value).is_break() {
                        break;
                    }
                }
                Ok(())
            }
            other => Err(NotKeyValue(other.kind())),
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Term::FixInteger(n) => Some(f64::from(n.value)),
            // nearest float, as for a native integer of the same value
            Term::BigInteger(n) => n.value.to_string().parse().ok(),
            Term::Float(x) => Some(x.value),
            Term::Atom(Atom { name }) if name == "true" => Some(1.0),
            Term::Atom(Atom { name }) if name == "false" => Some(0.0),
            _ => None,
        }
    }

    fn as_label(&self) -> Option<String> {
        match self {
            // JSON null
            Term::Atom(Atom { name }) if name == "null" => None,
            Term::Atom(Atom { name }) => Some(name.clone()),
            Term::Binary(text) => Some(String::from_utf8_lossy(&text.bytes).into_owned()),
            _ => None,
        }
    }

    fn list_len(&self) -> Option<usize> {
        match self {
            Term::List(list) => Some(list.elements.len()),
            Term::ByteList(list) => Some(list.bytes.len()),
            _ => None,
        }
    }

    fn elements(&self) -> Option<&[Self]> {
        match self {
            Term::List(list) => Some(&list.elements),
            _ => None,
        }
    }
}

/// A management API reply decoded from the Erlang external term format
#[derive(Debug)]
pub struct BertReply {
    /// The decoded term, or why it could not be decoded
    root: Result<Term, ReplyError>,
}

impl BertReply {
    /// Decode `body`. A body that is not a supported term still makes
    /// a reply, one that has no metrics or objects
    pub fn new(body: &[u8]) -> Self {
        let root: Result<Term, ReplyError> = decode(body).map_err(ReplyError::from);
        if let Err(err) = &root {
            warn!(bytes = body.len(), "{err}");
        }
        Self { root }
    }
}

impl Reply for BertReply {
    fn format(&self) -> Format {
        Format::Bert
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
