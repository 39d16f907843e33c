use crate::db::{
    key::{Key, Range},
    store::{MemoryStore, SortedKeyCursor},
};

///
/// ShardFixture
///
/// Test builder for shard rows holding event cells plus their field-index
/// cells, the way ingest lays them out.
///

pub(crate) struct ShardFixture {
    store: MemoryStore,
    timestamp: i64,
}

impl ShardFixture {
    pub(crate) fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            timestamp: 1_000,
        }
    }

    /// Add one indexed field of document `uid` in `row`.
    pub(crate) fn field(mut self, row: &str, uid: &str, field: &str, value: &str) -> Self {
        self.store.insert(
            Key::new(row, format!("typeA\0{uid}"), format!("{field}\0{value}"))
                .with_timestamp(self.timestamp),
            Vec::new(),
        );
        self.store.insert(
            Key::new(row, format!("fi\0{field}"), format!("{value}\0typeA\0{uid}"))
                .with_timestamp(self.timestamp),
            Vec::new(),
        );
        self
    }

    /// Add a cell verbatim.
    pub(crate) fn cell(mut self, key: Key, value: impl Into<Vec<u8>>) -> Self {
        self.store.insert(key, value);
        self
    }

    pub(crate) fn cursor(self) -> Box<dyn SortedKeyCursor> {
        Box::new(self.store.into_cursor())
    }
}

pub(crate) const SAMPLE_ROW: &str = "20240101_0";

/// Two shard rows of small documents, some with children.
///
/// - `abc.def.ghi` NAME=bob; children `.1` NAME=alice and `.2` NAME=alice AGE=7
/// - `jkl.mno.pqr` NAME=alice AGE=7
/// - `stu.vwx.yz0.1` AGE=9 (its root holds no fields)
/// - next row: `aaa.bbb.ccc` NAME=alice
pub(crate) fn sample_shard() -> ShardFixture {
    ShardFixture::new()
        .field(SAMPLE_ROW, "abc.def.ghi", "NAME", "bob")
        .field(SAMPLE_ROW, "abc.def.ghi.1", "NAME", "alice")
        .field(SAMPLE_ROW, "abc.def.ghi.2", "NAME", "alice")
        .field(SAMPLE_ROW, "abc.def.ghi.2", "AGE", "7")
        .field(SAMPLE_ROW, "jkl.mno.pqr", "NAME", "alice")
        .field(SAMPLE_ROW, "jkl.mno.pqr", "AGE", "7")
        .field(SAMPLE_ROW, "stu.vwx.yz0.1", "AGE", "9")
        .field("20240101_1", "aaa.bbb.ccc", "NAME", "alice")
}

/// Collect the column families of every match a cursor yields.
pub(crate) fn drain_families(
    cursor: &mut dyn crate::db::cursor::DocumentCursor,
) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(matched) = cursor.next().unwrap() {
        out.push(String::from_utf8_lossy(matched.key.column_family()).into_owned());
    }
    out
}

/// Range covering one whole shard row.
pub(crate) fn shard(row: &str) -> Range {
    Range::row(row)
}
