use crate::db::{
    aggregate::{Aggregator, FieldIndexAggregator},
    document::{Attribute, Document},
    key::{Key, Range},
    store::{KeySource, MemoryCursor, MemoryStore, SortedKeyCursor},
};
use proptest::prelude::*;
use std::{collections::BTreeSet, sync::Arc};

fn fi(field: &str, value: &str, uid: &str) -> Key {
    Key::new(
        "shard",
        format!("fi\0{field}"),
        format!("{value}\0typeA\0{uid}"),
    )
    .with_timestamp(100)
}

fn cursor(keys: impl IntoIterator<Item = Key>) -> MemoryCursor {
    let mut cursor = keys
        .into_iter()
        .map(|key| (key, Vec::new()))
        .collect::<MemoryStore>()
        .into_cursor();
    cursor.seek(&Range::all()).unwrap();
    cursor
}

fn scenario_cursor() -> MemoryCursor {
    cursor([
        fi("NAME", "alice", "abc.def.ghi.1").with_visibility("A"),
        fi("NAME", "alice", "abc.def.ghi.1").with_visibility("B"),
        fi("NAME", "alice", "abc.def.ghi.2"),
        fi("NAME", "alice", "xyz.def.ghi.1"),
    ])
}

#[test]
fn top_level_run_folds_children_into_root() {
    let mut source = scenario_cursor();
    let mut document = Document::new();

    let key = Aggregator::top_level()
        .aggregate(&mut source, &mut document)
        .unwrap()
        .unwrap();

    assert_eq!(key.row(), b"shard");
    assert_eq!(key.column_family(), b"typeA\0abc.def.ghi");
    assert_eq!(key.column_qualifier(), b"NAME\0alice");
    assert_eq!(key.timestamp(), 100);

    assert_eq!(document.kept_fields().count(), 3);
    let children: Vec<_> = document
        .document_keys()
        .map(|key| key.column_family().to_vec())
        .collect();
    assert_eq!(
        children,
        vec![
            b"typeA\0abc.def.ghi.1".to_vec(),
            b"typeA\0abc.def.ghi.2".to_vec()
        ]
    );

    // positioned on the first entry of the next root
    assert_eq!(
        source.peek_key().unwrap().column_qualifier(),
        b"alice\0typeA\0xyz.def.ghi.1"
    );
}

#[test]
fn identity_run_stops_at_each_document() {
    let mut source = scenario_cursor();
    let aggregator = Aggregator::identity();

    let first = aggregator.aggregate_key_only(&mut source).unwrap().unwrap();
    let second = aggregator.aggregate_key_only(&mut source).unwrap().unwrap();

    assert_eq!(first.column_family(), b"typeA\0abc.def.ghi.1");
    assert_eq!(second.column_family(), b"typeA\0abc.def.ghi.2");
}

#[test]
fn run_stops_at_foreign_column_family() {
    let mut source = cursor([
        fi("NAME", "alice", "abc.def.ghi"),
        Key::new("shard", "typeA\0abc.def.ghi", "NAME\0alice"),
    ]);

    let key = Aggregator::top_level()
        .aggregate_key_only(&mut source)
        .unwrap()
        .unwrap();

    assert_eq!(key.column_family(), b"typeA\0abc.def.ghi");
    assert!(source.has_next());
}

#[test]
fn exhausted_source_yields_none() {
    let mut source = cursor([]);

    assert!(
        Aggregator::top_level()
            .aggregate(&mut source, &mut Document::new())
            .unwrap()
            .is_none()
    );
}

#[test]
fn malformed_entry_surfaces_key_error() {
    let mut source = cursor([Key::new("shard", "fi\0NAME", "no separators")]);
    let err = Aggregator::top_level()
        .aggregate(&mut source, &mut Document::new())
        .unwrap_err();

    assert!(err.is_malformed_key());
}

#[test]
fn keep_flags_follow_requested_fields_and_filter() {
    let mut source = cursor([
        fi("AGE", "7", "abc.def.ghi.1"),
        fi("AGE", "7", "abc.def.ghi.2"),
    ]);
    let aggregator = Aggregator::top_level()
        .with_fields_to_keep(BTreeSet::from(["AGE".to_string()]))
        .with_filter(Arc::new(|key: &Key| {
            key.column_qualifier().ends_with(b".1")
        }));

    let mut document = Document::new();
    aggregator.aggregate(&mut source, &mut document).unwrap();

    let keeps: Vec<bool> = document
        .iter()
        .filter_map(|attr| match attr {
            Attribute::Field { keep, .. } => Some(*keep),
            Attribute::DocumentKey { .. } => None,
        })
        .collect();
    assert_eq!(keeps, vec![true, false]);

    let mut source = cursor([fi("AGE", "7", "abc.def.ghi.1")]);
    let mut document = Document::new();
    Aggregator::top_level()
        .with_fields_to_keep(BTreeSet::from(["NAME".to_string()]))
        .aggregate(&mut source, &mut document)
        .unwrap();
    assert_eq!(document.kept_fields().count(), 0);
    assert_eq!(document.values_of("AGE").collect::<Vec<_>>(), vec![&b"7"[..]]);
}

///
/// PROPERTIES
///

fn arb_entries() -> impl Strategy<Value = Vec<Key>> {
    let root = prop_oneof![Just("r1.a.b"), Just("r2.a.b"), Just("r3.a.b")];
    let child = prop::option::of("[0-9]{1,2}");
    let value = prop_oneof![Just("x"), Just("y")];

    prop::collection::vec((root, child, value), 0..24).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(root, child, value)| {
                let uid = match child {
                    Some(child) => format!("{root}.{child}"),
                    None => root.to_string(),
                };
                fi("FIELD", value, &uid)
            })
            .collect()
    })
}

fn drain_runs(source: &mut dyn KeySource, with_document: bool) -> Vec<(Key, Option<Key>)> {
    let aggregator = Aggregator::top_level();
    let mut out = Vec::new();

    loop {
        let key = if with_document {
            aggregator.aggregate(source, &mut Document::new()).unwrap()
        } else {
            aggregator.aggregate_key_only(source).unwrap()
        };
        let Some(key) = key else {
            return out;
        };
        out.push((key, source.peek_key().cloned()));
    }
}

proptest! {
    #[test]
    fn key_only_consumes_identical_runs(entries in arb_entries()) {
        let full = cursor(entries);
        let mut key_only = full.deep_copy();
        let mut full = full;

        let left = drain_runs(&mut full, true);
        let right = drain_runs(key_only.as_mut(), false);

        prop_assert_eq!(left, right);
    }
}
