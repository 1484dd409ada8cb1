//! Broken or unexpected replies degrade to empty results
#![cfg(feature = "bert")]

use proptest::prelude::*;
use serde_json::{Map, Value};

use rabbit_reply::{make_reply, Format, DEFAULT_IDENTIFIERS};

const FIXTURE: &[u8] = include_bytes!("data/queues-3.7.0.struct.bert");

/// Arbitrary JSON documents shaped roughly like management API replies
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        (-1e12f64..1e12).prop_map(Value::from),
        "[a-z_]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            proptest::collection::vec(("[a-z_]{1,6}", inner), 0..8)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

#[test]
fn truncated_terms_are_empty() {
    assert!(!make_reply(Format::Bert, FIXTURE).object_stats(&["name"], DEFAULT_IDENTIFIERS).is_empty());
    for end in 0..FIXTURE.len() {
        let reply = make_reply(Format::Bert, &FIXTURE[..end]);
        assert!(reply.decode_error().is_some(), "prefix of {end} bytes decoded");
        assert!(reply.metric_map().is_empty());
        assert!(reply.object_stats(&["name"], DEFAULT_IDENTIFIERS).is_empty());
        assert_eq!(reply.get_string("name"), None);
    }
}

#[test]
fn wrong_format_is_empty() {
    let json = br#"{"object_totals":{"queues":4}}"#;
    let reply = make_reply(Format::Bert, json);
    assert!(reply.metric_map().is_empty());

    let reply = make_reply(Format::Json, FIXTURE);
    assert!(reply.object_stats(&["name"], DEFAULT_IDENTIFIERS).is_empty());
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(body in proptest::collection::vec(any::<u8>(), 0..512)) {
        for format in [Format::Json, Format::Bert] {
            let reply = make_reply(format, &body);
            let _ = reply.metric_map();
            let _ = reply.object_stats(&["name", "vhost"], DEFAULT_IDENTIFIERS);
            let _ = reply.get_string("node");
        }
    }

    #[test]
    fn corrupted_terms_never_panic(index in 0..FIXTURE.len(), byte in any::<u8>()) {
        let mut body = FIXTURE.to_vec();
        body[index] = byte;
        let reply = make_reply(Format::Bert, &body);
        let _ = reply.object_stats(&["name", "vhost"], DEFAULT_IDENTIFIERS);
        let _ = reply.metric_map();
    }

    #[test]
    fn normalizing_twice_is_identical(doc in json_value()) {
        let body = serde_json::to_vec(&doc).unwrap();
        let first = make_reply(Format::Json, &body);
        let second = make_reply(Format::Json, &body);
        prop_assert_eq!(first.metric_map(), second.metric_map());
        prop_assert_eq!(first.metric_map(), first.metric_map());
        prop_assert_eq!(
            first.object_stats(&["name", "missing"], &[]),
            second.object_stats(&["name", "missing"], &[])
        );
    }

    #[test]
    fn labels_are_always_complete(doc in json_value()) {
        let body = serde_json::to_vec(&Value::Array(vec![doc])).unwrap();
        let reply = make_reply(Format::Json, &body);
        for object in reply.object_stats(&["name", "vhost", "state"], &[]) {
            let names: Vec<_> = object.labels.keys().map(String::as_str).collect();
            prop_assert_eq!(names, vec!["name", "state", "vhost"]);
        }
    }
}
