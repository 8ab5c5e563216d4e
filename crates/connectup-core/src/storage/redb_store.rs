//! redb-backed record store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
    TableHandle,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::formats::{decode_record, encode_record};
use crate::{CoreError, CoreResult};

/// Table holding one record kind, keyed by record id.
pub type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Unique secondary index: string key -> record id.
pub type IndexTable = TableDefinition<'static, &'static str, u64>;

/// Id counters, one per record kind.
const META: TableDefinition<'static, &'static str, u64> = TableDefinition::new("meta");

/// Unique lookup indexes.
pub mod index {
    use super::IndexTable;
    use redb::TableDefinition;

    /// Lower-cased email -> user id (live accounts only).
    pub const EMAIL: IndexTable = TableDefinition::new("idx_email");
    /// Phone number -> user id (live accounts only).
    pub const PHONE: IndexTable = TableDefinition::new("idx_phone");
    /// Auth token -> user id.
    pub const AUTH_TOKEN: IndexTable = TableDefinition::new("idx_auth_token");
    /// Session token -> session id.
    pub const SESSION_TOKEN: IndexTable = TableDefinition::new("idx_session_token");
    /// Email verification link token -> link id.
    pub const EMAIL_LINK: IndexTable = TableDefinition::new("idx_email_link");
}

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A value stored in its own table.
pub trait Record: Serialize + DeserializeOwned {
    /// Backing table.
    const TABLE: RecordTable;

    /// Human readable kind, used for id counters and `NotFound` errors.
    const KIND: &'static str;

    /// Primary key.
    fn key(&self) -> u64;
}

/// Read access shared by read and write transactions.
pub trait Reader {
    /// Fetch a record by id.
    fn get<R: Record>(&self, id: u64) -> CoreResult<Option<R>>;

    /// All records of a kind in id order.
    fn all<R: Record>(&self) -> CoreResult<Vec<R>>;

    /// Resolve a unique index key.
    fn lookup(&self, index: IndexTable, key: &str) -> CoreResult<Option<u64>>;

    /// Fetch a record or fail with `NotFound`.
    fn require<R: Record>(&self, id: u64) -> CoreResult<R> {
        self.get(id)?.ok_or(CoreError::NotFound(R::KIND))
    }

    /// Records matching a predicate, in id order.
    fn filter<R: Record>(&self, pred: impl Fn(&R) -> bool) -> CoreResult<Vec<R>> {
        Ok(self.all::<R>()?.into_iter().filter(|r| pred(r)).collect())
    }

    /// First record (lowest id) matching a predicate.
    fn find<R: Record>(&self, pred: impl Fn(&R) -> bool) -> CoreResult<Option<R>> {
        Ok(self.all::<R>()?.into_iter().find(|r| pred(r)))
    }

    /// Number of records of a kind.
    fn count<R: Record>(&self) -> CoreResult<usize> {
        Ok(self.all::<R>()?.len())
    }
}

fn read_one<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> CoreResult<Option<R>> {
    match table.get(id)? {
        Some(guard) => decode_record(guard.value()).map(Some),
        None => Ok(None),
    }
}

fn read_all<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> CoreResult<Vec<R>> {
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(decode_record(value.value())?);
    }
    Ok(out)
}

fn read_index(
    table: &impl ReadableTable<&'static str, u64>,
    key: &str,
) -> CoreResult<Option<u64>> {
    Ok(table.get(key)?.map(|guard| guard.value()))
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Read-only snapshot.
pub struct ReadTx {
    txn: redb::ReadTransaction,
}

impl Reader for ReadTx {
    fn get<R: Record>(&self, id: u64) -> CoreResult<Option<R>> {
        match self.txn.open_table(R::TABLE) {
            Ok(table) => read_one(&table, id),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn all<R: Record>(&self) -> CoreResult<Vec<R>> {
        match self.txn.open_table(R::TABLE) {
            Ok(table) => read_all(&table),
            Err(TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn lookup(&self, index: IndexTable, key: &str) -> CoreResult<Option<u64>> {
        match self.txn.open_table(index) {
            Ok(table) => read_index(&table, key),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Write transaction; committed by [`Store::write`] when the closure succeeds.
pub struct WriteTx {
    txn: redb::WriteTransaction,
}

impl Reader for WriteTx {
    fn get<R: Record>(&self, id: u64) -> CoreResult<Option<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_one(&table, id)
    }

    fn all<R: Record>(&self) -> CoreResult<Vec<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_all(&table)
    }

    fn lookup(&self, index: IndexTable, key: &str) -> CoreResult<Option<u64>> {
        let table = self.txn.open_table(index)?;
        read_index(&table, key)
    }
}

impl WriteTx {
    /// Allocate the next id for a record kind (ids start at 1).
    pub fn next_id<R: Record>(&self) -> CoreResult<u64> {
        let mut meta = self.txn.open_table(META)?;
        let current = meta.get(R::KIND)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current.saturating_add(1);
        meta.insert(R::KIND, next)?;
        Ok(next)
    }

    /// Insert or replace a record.
    pub fn put<R: Record>(&self, record: &R) -> CoreResult<()> {
        let bytes = encode_record(record)?;
        let mut table = self.txn.open_table(R::TABLE)?;
        table.insert(record.key(), bytes.as_slice())?;
        Ok(())
    }

    /// Delete a record. Missing ids are ignored.
    pub fn remove<R: Record>(&self, id: u64) -> CoreResult<()> {
        let mut table = self.txn.open_table(R::TABLE)?;
        table.remove(id)?;
        Ok(())
    }

    /// Point an index key at a record id.
    pub fn set_index(&self, index: IndexTable, key: &str, id: u64) -> CoreResult<()> {
        let mut table = self.txn.open_table(index)?;
        table.insert(key, id)?;
        Ok(())
    }

    /// Drop an index key.
    pub fn remove_index(&self, index: IndexTable, key: &str) -> CoreResult<()> {
        let mut table = self.txn.open_table(index)?;
        table.remove(key)?;
        Ok(())
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Handle to the embedded database.
pub struct Store {
    db: Database,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Ok(Self {
            db: Database::create(path)?,
        })
    }

    /// Database that lives only in memory; lost on drop.
    pub fn in_memory() -> CoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Ok(Self { db })
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> CoreResult<T>) -> CoreResult<T> {
        let tx = ReadTx {
            txn: self.db.begin_read()?,
        };
        f(&tx)
    }

    /// Run `f` in a write transaction. Commits on `Ok`, aborts on `Err`.
    pub fn write<T>(&self, f: impl FnOnce(&WriteTx) -> CoreResult<T>) -> CoreResult<T> {
        let tx = WriteTx {
            txn: self.db.begin_write()?,
        };
        let out = f(&tx)?;
        tx.txn.commit()?;
        Ok(out)
    }

    /// Row count of every table, keyed by table name.
    pub fn table_counts(&self) -> CoreResult<BTreeMap<String, u64>> {
        let txn = self.db.begin_read()?;
        let mut out = BTreeMap::new();
        for handle in txn.list_tables()? {
            let name = handle.name().to_string();
            let table = txn.open_untyped_table(handle)?;
            out.insert(name, table.len()?);
        }
        Ok(out)
    }

    /// Create every table up front so fresh databases read cleanly.
    pub fn initialize(&self) -> CoreResult<()> {
        self.write(|tx| {
            tx.txn.open_table(META)?;
            for table in [
                index::EMAIL,
                index::PHONE,
                index::AUTH_TOKEN,
                index::SESSION_TOKEN,
                index::EMAIL_LINK,
            ] {
                tx.txn.open_table(table)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: u64,
        text: String,
    }

    impl Record for Note {
        const TABLE: RecordTable = TableDefinition::new("test_notes");
        const KIND: &'static str = "note";
        fn key(&self) -> u64 {
            self.id
        }
    }

    const NOTE_INDEX: IndexTable = TableDefinition::new("idx_test_notes");

    #[test]
    fn empty_store_reads_nothing() {
        let store = Store::in_memory().unwrap();
        let got: Option<Note> = store.read(|tx| tx.get(1)).unwrap();
        assert!(got.is_none());
        let all: Vec<Note> = store.read(|tx| tx.all()).unwrap();
        assert!(all.is_empty());
        assert_eq!(store.read(|tx| tx.lookup(NOTE_INDEX, "x")).unwrap(), None);
    }

    #[test]
    fn put_get_and_index() {
        let store = Store::in_memory().unwrap();
        let id = store
            .write(|tx| {
                let id = tx.next_id::<Note>()?;
                tx.put(&Note {
                    id,
                    text: "hello".into(),
                })?;
                tx.set_index(NOTE_INDEX, "hello", id)?;
                Ok(id)
            })
            .unwrap();
        assert_eq!(id, 1);

        let note: Note = store.read(|tx| tx.require(id)).unwrap();
        assert_eq!(note.text, "hello");
        assert_eq!(
            store.read(|tx| tx.lookup(NOTE_INDEX, "hello")).unwrap(),
            Some(1)
        );

        let second = store.write(|tx| tx.next_id::<Note>()).unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn failed_write_is_rolled_back() {
        let store = Store::in_memory().unwrap();
        let result: CoreResult<()> = store.write(|tx| {
            tx.put(&Note {
                id: 5,
                text: "gone".into(),
            })?;
            Err(CoreError::invalid("abort"))
        });
        assert!(result.is_err());
        let got: Option<Note> = store.read(|tx| tx.get(5)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn require_reports_kind() {
        let store = Store::in_memory().unwrap();
        let err = store.read(|tx| tx.require::<Note>(3)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("note")));
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let store = Store::open(&path).unwrap();
            store.initialize().unwrap();
            store
                .write(|tx| {
                    tx.put(&Note {
                        id: 1,
                        text: "kept".into(),
                    })
                })
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let note: Note = store.read(|tx| tx.require(1)).unwrap();
        assert_eq!(note.text, "kept");
        let counts = store.table_counts().unwrap();
        assert_eq!(counts.get("test_notes"), Some(&1));
        assert_eq!(counts.get("idx_email"), Some(&0));
    }
}
