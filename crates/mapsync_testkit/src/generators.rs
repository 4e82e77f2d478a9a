//! Property-based test generators using proptest.

use crate::fixtures::PROFILE_URL;
use mapsync_codec::{Record, Value};
use proptest::prelude::*;

/// Strategy for generating profile URLs.
pub fn profile_url_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}".prop_map(|host| format!("https://{host}.example/profile.json"))
}

/// Strategy for generating leaf values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-180.0f64..180.0).prop_map(Value::Float),
        "[A-Za-z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating nested values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Map(m.into_iter().collect())),
        ]
    })
}

/// Strategy for generating profiles with a non-null identity.
pub fn profile_strategy() -> impl Strategy<Value = Record> {
    (
        profile_url_strategy(),
        prop::collection::btree_map("[a-z]{1,8}", value_strategy(), 0..5),
    )
        .prop_map(|(url, fields)| {
            let mut record = Record::new().with(PROFILE_URL, url);
            for (field, value) in fields {
                if field != PROFILE_URL {
                    record.insert(field, value);
                }
            }
            record
        })
}

/// Strategy for generating opaque sort tokens as the upstream issues them.
pub fn sort_token_strategy() -> impl Strategy<Value = Value> {
    (any::<u32>(), profile_url_strategy()).prop_map(|(ts, url)| {
        Value::Array(vec![Value::Integer(i64::from(ts)), Value::Text(url)])
    })
}
