use canopy_core::{
    config::ScanOptions,
    db::{
        aggregate::{Aggregator, FieldIndexAggregator},
        cursor::DocumentCursor,
        document::{Attribute, Document},
        key::{
            Key, PartialKey, Range, document_uid, field_index_pointer, field_index_root_pointer,
            is_root, root_pointer,
        },
        plan::QueryNode,
        scan::DocumentScanner,
        store::{MemoryStore, SortedKeyCursor},
    },
};
use proptest::prelude::*;
use std::{collections::BTreeMap, ops::Bound};

const ROW: &str = "20240301_7";

fn ingest(store: &mut MemoryStore, uid: &str, field: &str, value: &str) {
    store.insert(
        Key::new(ROW, format!("typeA\0{uid}"), format!("{field}\0{value}")),
        Vec::new(),
    );
    store.insert(
        Key::new(ROW, format!("fi\0{field}"), format!("{value}\0typeA\0{uid}")),
        Vec::new(),
    );
}

fn shard_end() -> Bound<Key> {
    Bound::Excluded(Key::row_only(ROW).following(PartialKey::Row))
}

fn scanner(source: &dyn SortedKeyCursor, options: ScanOptions) -> DocumentScanner {
    DocumentScanner::new(
        source.deep_copy(),
        QueryNode::equals("NAME", "x"),
        options,
    )
    .unwrap()
}

fn family(key: &Key) -> String {
    String::from_utf8_lossy(key.column_family()).into_owned()
}

fn scan_all(source: &dyn SortedKeyCursor, range: &Range) -> Vec<String> {
    let mut scanner = scanner(source, ScanOptions::default());
    scanner.seek(range).unwrap();

    let mut out = Vec::new();
    while let Some(found) = scanner.next().unwrap() {
        out.push(family(&found.key));
    }
    out
}

// One document per scan, resuming after the last returned key each time.
fn scan_paged(source: &dyn SortedKeyCursor, range: &Range) -> Vec<String> {
    let mut out = Vec::new();
    let mut range = range.clone();
    loop {
        let mut scanner = scanner(source, ScanOptions::default());
        scanner.seek(&range).unwrap();
        let Some(found) = scanner.next().unwrap() else {
            return out;
        };

        out.push(family(&found.key));
        range = Range::new(Bound::Excluded(found.key), range.end().clone());
    }
}

#[test]
fn document_ids_resolve_to_their_root() {
    assert!(is_root(b"abc.def.ghi"));
    assert_eq!(root_pointer(b"abc.def.ghi"), b"abc.def.ghi");
    assert_eq!(root_pointer(b"abc.def.ghi.child1"), b"abc.def.ghi");

    let cq = b"value1\0typeA\0abc.def.ghi.child1";
    assert_eq!(field_index_pointer(cq).unwrap(), b"abc.def.ghi.child1");
    assert_eq!(field_index_root_pointer(cq).unwrap(), b"abc.def.ghi");
}

#[test]
fn child_run_aggregates_into_one_parent() {
    let mut store = MemoryStore::new();
    for (uid, timestamp) in [("child1", 2), ("child1", 1), ("child2", 1)] {
        store.insert(
            Key::new(ROW, "fi\0NAME", format!("x\0typeA\0abc.def.ghi.{uid}"))
                .with_timestamp(timestamp),
            Vec::new(),
        );
    }
    let mut cursor = store.into_cursor();
    cursor.seek(&Range::all()).unwrap();

    let mut document = Document::new();
    let parent = Aggregator::top_level()
        .aggregate(&mut cursor, &mut document)
        .unwrap()
        .unwrap();

    assert_eq!(parent.column_family(), b"typeA\0abc.def.ghi");
    assert_eq!(parent.column_qualifier(), b"NAME\0x");
    let kept = document
        .iter()
        .filter(|attr| matches!(attr, Attribute::Field { keep: true, .. }))
        .count();
    assert_eq!(kept, 3);
    assert_eq!(document.document_keys().count(), 2);
}

#[test]
fn resumed_scan_never_returns_a_remaining_child() {
    let mut store = MemoryStore::new();
    ingest(&mut store, "abc.def.ghi", "NAME", "x");
    ingest(&mut store, "abc.def.ghi.child1", "NAME", "x");
    ingest(&mut store, "abc.def.ghi.child2", "NAME", "x");
    ingest(&mut store, "abd.aaa.aaa", "NAME", "x");
    let source = store.into_cursor();

    let start = Key::new(ROW, "typeA\0abc.def.ghi", "");
    let range = Range::new(Bound::Excluded(start), shard_end());

    assert_eq!(scan_all(&source, &range), vec!["typeA\0abd.aaa.aaa"]);
}

#[test]
fn toml_options_drive_a_generic_scan() {
    let mut store = MemoryStore::new();
    ingest(&mut store, "abc.def.ghi", "NAME", "x");
    ingest(&mut store, "abc.def.ghi.1", "NAME", "x");
    ingest(&mut store, "abc.def.ghi", "SECRET", "s");
    let source = store.into_cursor();

    let options = ScanOptions::from_toml_str(
        r#"
        plan_builder = "generic"

        [event_filter]
        deny_fields = ["SECRET"]
        "#,
    )
    .unwrap();
    let mut scanner = scanner(&source, options);
    scanner.seek(&Range::row(ROW)).unwrap();

    let first = scanner.next().unwrap().unwrap();
    let second = scanner.next().unwrap().unwrap();
    assert_eq!(family(&first.key), "typeA\0abc.def.ghi");
    assert_eq!(family(&second.key), "typeA\0abc.def.ghi.1");
    assert!(scanner.next().unwrap().is_none());

    let loaded = scanner.load_document(&first).unwrap();
    assert_eq!(loaded.values_of("NAME").count(), 1);
    assert_eq!(loaded.values_of("SECRET").count(), 0);
}

fn arb_shard() -> impl Strategy<Value = BTreeMap<String, Vec<bool>>> {
    // root id -> NAME=x flags for the root and each child
    prop::collection::btree_map(
        "[a-z]{3}",
        prop::collection::vec(any::<bool>(), 1..4),
        1..8,
    )
}

proptest! {
    #[test]
    fn paged_scan_matches_single_pass(shard in arb_shard()) {
        let mut store = MemoryStore::new();
        for (root, flags) in &shard {
            let root = format!("{root}.aaa.bbb");
            for (index, matches) in flags.iter().enumerate() {
                let uid = if index == 0 { root.clone() } else { format!("{root}.{index}") };
                let value = if *matches { "x" } else { "y" };
                ingest(&mut store, &uid, "NAME", value);
            }
        }
        let source = store.into_cursor();
        let range = Range::row(ROW);

        let single = scan_all(&source, &range);
        let paged = scan_paged(&source, &range);
        prop_assert_eq!(&single, &paged);

        let expected: Vec<String> = shard
            .iter()
            .filter(|(_, flags)| flags.contains(&true))
            .map(|(root, _)| format!("typeA\0{root}.aaa.bbb"))
            .collect();
        prop_assert_eq!(&single, &expected);

        for family in &single {
            let uid = document_uid(family.as_bytes()).unwrap();
            prop_assert!(is_root(uid));
        }
    }
}
