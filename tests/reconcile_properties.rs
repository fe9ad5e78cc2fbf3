//! Property-based tests for reconciliation.
//!
//! Tests the following properties:
//! - reconciling a tree with itself returns it unchanged
//! - the result always equals `next`
//! - an equal copy of `previous` yields `previous`
//! - untouched siblings keep their identity
//! - inputs are never modified

use proptest::prelude::*;
use serde_json::Value as Json;
use state_tree::{diff_values, reconcile, Mapping, Reconciler, Value};

// =============================================================================
// Strategies
// =============================================================================

fn arb_leaf() -> impl Strategy<Value = Json> {
    prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::Bool),
        (-1000i64..1000i64).prop_map(Json::from),
        "[a-z]{0,6}".prop_map(Json::String),
    ]
}

fn arb_json() -> impl Strategy<Value = Json> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Json::Array),
            prop::collection::vec(("[a-e]{1,2}", inner), 0..6)
                .prop_map(|entries| Json::Object(entries.into_iter().collect())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Json> {
    prop::collection::vec(("[a-e]{1,2}", arb_json()), 1..6)
        .prop_map(|entries| Json::Object(entries.into_iter().collect()))
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn reconcile_with_itself_is_identity(json in arb_json()) {
        let v = Value::from(json);
        prop_assert!(reconcile(&v, &v).is_same(&v));
    }

    #[test]
    fn result_equals_next(previous in arb_json(), next in arb_json()) {
        let previous = Value::from(previous);
        let next = Value::from(next);
        let result = reconcile(&previous, &next);
        prop_assert_eq!(&result, &next);
        prop_assert!(diff_values(&next, &result).is_empty());
        prop_assert_eq!(result.fingerprint(), next.fingerprint());
    }

    #[test]
    fn equal_copy_yields_previous(json in arb_json()) {
        let previous = Value::from(json);
        let next = previous.deep_clone();
        prop_assert!(reconcile(&previous, &next).is_same(&previous));
    }

    #[test]
    fn untouched_siblings_keep_identity(json in arb_object()) {
        let previous = Value::from(json);
        let prev_map = previous.as_mapping().unwrap();
        let keys = prev_map.keys();
        let changed = &keys[0];

        // Same handles everywhere except one fresh value under `changed`.
        let next = Value::mapping(keys.iter().map(|key| {
            let item = if key == changed {
                Value::from("__changed__")
            } else {
                prev_map.get(key).unwrap()
            };
            (key.clone(), item)
        }));

        let result = reconcile(&previous, &next);
        prop_assert_eq!(&result, &next);
        for key in keys.iter().filter(|k| *k != changed) {
            prop_assert!(result.get(key).unwrap().is_same(&prev_map.get(key).unwrap()));
        }
    }

    #[test]
    fn inputs_are_not_modified(previous in arb_json(), next in arb_json()) {
        let previous = Value::from(previous);
        let next = Value::from(next);
        let (prev_hash, next_hash) = (previous.fingerprint(), next.fingerprint());
        let _ = reconcile(&previous, &next);
        prop_assert_eq!(previous.fingerprint(), prev_hash);
        prop_assert_eq!(next.fingerprint(), next_hash);
    }

    #[test]
    fn stats_cover_every_visit(previous in arb_json(), next in arb_json()) {
        let previous = Value::from(previous);
        let next = Value::from(next);
        let result = Reconciler::default().reconcile_with_stats(&previous, &next);
        prop_assert!(result.stats.visited() >= 1);
        prop_assert_eq!(result.stats.cycles, 0);
        prop_assert_eq!(result.stats.depth_limited, 0);
    }
}

// =============================================================================
// Fixed scenarios
// =============================================================================

#[test]
fn self_referencing_next_terminates() {
    let map = Mapping::default();
    map.insert("title", Value::from("x"));
    map.insert("child", Value::Mapping(map.clone()));
    let next = Value::Mapping(map);

    for previous in [Value::Null, next.deep_clone(), Value::from(serde_json::json!({"title": "x"}))] {
        let result = reconcile(&previous, &next);
        assert_eq!(result, next);
    }
}

#[test]
fn type_change_returns_next() {
    let previous = Value::from(serde_json::json!([1, 2, 3]));
    let next = Value::from(serde_json::json!({"a": 1}));
    assert!(reconcile(&previous, &next).is_same(&next));
}

#[test]
fn concurrent_calls_on_disjoint_inputs() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let previous = Value::from(serde_json::json!({"i": i, "list": [1, 2, 3]}));
                let next = Value::from(serde_json::json!({"i": i, "list": [1, 2, 4]}));
                let result = reconcile(&previous, &next);
                result == next && !result.is_same(&previous)
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
