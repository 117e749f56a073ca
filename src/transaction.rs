//! Unit of work shared by the inventory, cart and ledger stores.
//!
//! A [`Transaction`] stages its writes in a [`WriteSet`] and holds row locks
//! until it finishes. Commit applies the write set through the backend in one
//! atomic step and only then releases the locks, so the next holder of a row
//! sees the committed value. Dropping a transaction without committing is a
//! rollback: the staged writes are discarded and nothing reaches the backend.
use crate::cart::CartStore;
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::inventory::InventoryStore;
use crate::ledger::OrderLedger;
use crate::lock::{LockTable, RowKey, TxId};
use crate::storage::{Backend, Key, MemoryBackend, SledBackend, Table, WriteSet, id_key};
use crate::types::{CartLine, UserId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait Commit {
    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self);
}

/// Source of transactions. The order service only depends on this trait, so
/// tests can wrap a store and intercept individual store calls.
pub trait UnitOfWork: Send + Sync {
    type Tx<'a>: InventoryStore + CartStore + OrderLedger + Commit
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;

    /// The buyer's committed cart, read without opening a transaction.
    fn cart_snapshot(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError>;
}

pub struct Store<B: Backend> {
    backend: B,
    locks: LockTable,
    next_tx: AtomicU64,
    lock_timeout: Duration,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            locks: LockTable::new(),
            next_tx: AtomicU64::new(1),
            lock_timeout: crate::config::DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_config(backend: B, config: &EngineConfig) -> Self {
        Self::new(backend).with_lock_timeout(config.lock_timeout)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn transaction(&self) -> Transaction<'_, B> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(tx = id, "transaction started");
        Transaction {
            id,
            store: self,
            held: Vec::new(),
            writes: WriteSet::new(),
            finished: false,
        }
    }
}

impl Store<MemoryBackend> {
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::with_config(MemoryBackend::new(), config)
    }
}

impl Store<SledBackend> {
    pub fn open(config: &EngineConfig) -> Result<Self, StoreError> {
        Ok(Self::with_config(SledBackend::open(config)?, config))
    }
}

impl<B: Backend> UnitOfWork for Store<B> {
    type Tx<'a>
        = Transaction<'a, B>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        Ok(self.transaction())
    }

    fn cart_snapshot(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        match self.backend.get(Table::Carts, &id_key(buyer_id))? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

pub struct Transaction<'a, B: Backend> {
    id: TxId,
    store: &'a Store<B>,
    held: Vec<RowKey>,
    writes: WriteSet,
    finished: bool,
}

impl<B: Backend> Transaction<'_, B> {
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Takes the exclusive lock on `key` for the rest of the transaction.
    pub fn lock(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.holds(key) {
            return Ok(());
        }
        self.store
            .locks
            .acquire(key, self.id, self.store.lock_timeout)?;
        self.held.push(key);
        Ok(())
    }

    pub fn holds(&self, key: RowKey) -> bool {
        self.held.contains(&key)
    }

    pub(crate) fn read<T>(&self, table: Table, key: &[u8]) -> Result<Option<T>, StoreError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let bytes = match self.writes.get(table, key) {
            Some(staged) => staged.map(<[u8]>::to_vec),
            None => self.store.backend.get(table, key)?,
        };
        match bytes {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn write<T>(&mut self, table: Table, key: Key, value: &T) -> Result<(), StoreError>
    where
        T: minicbor::Encode<()>,
    {
        let bytes = minicbor::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.writes.insert(table, key, bytes);
        Ok(())
    }

    pub(crate) fn mark(&mut self, table: Table, key: Key) {
        self.writes.insert(table, key, Vec::new());
    }

    pub(crate) fn delete(&mut self, table: Table, key: Key) {
        self.writes.remove(table, key);
    }

    /// Prefix scan that sees this transaction's own staged writes.
    pub(crate) fn scan(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Key, Vec<u8>)>, StoreError> {
        let mut rows: BTreeMap<Key, Vec<u8>> = self
            .store
            .backend
            .scan_prefix(table, prefix)?
            .into_iter()
            .collect();
        for (key, value) in self.writes.with_prefix(table, prefix) {
            match value {
                Some(value) => {
                    rows.insert(key.to_vec(), value.to_vec());
                }
                None => {
                    rows.remove(key);
                }
            }
        }
        Ok(rows.into_iter().collect())
    }

    pub(crate) fn generate_id(&self) -> Result<u64, StoreError> {
        self.store.backend.generate_id()
    }

    fn release_locks(&mut self) {
        for key in self.held.drain(..) {
            self.store.locks.release(key, self.id);
        }
    }
}

impl<B: Backend> Commit for Transaction<'_, B> {
    fn commit(mut self) -> Result<(), StoreError> {
        let writes = std::mem::take(&mut self.writes);
        let result = if writes.is_empty() {
            Ok(())
        } else {
            self.store.backend.apply(&writes)
        };
        self.finished = true;
        self.release_locks();

        match &result {
            Ok(()) => tracing::trace!(tx = self.id, writes = writes.len(), "transaction committed"),
            Err(err) => tracing::error!(tx = self.id, error = %err, "transaction commit failed"),
        }
        result
    }

    fn rollback(mut self) {
        self.writes = WriteSet::new();
        self.finished = true;
        self.release_locks();
        tracing::trace!(tx = self.id, "transaction rolled back");
    }
}

impl<B: Backend> Drop for Transaction<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                tx = self.id,
                discarded = self.writes.len(),
                "transaction dropped without commit, rolling back"
            );
            self.release_locks();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, Money};

    fn item(id: u64, available: u32) -> Item {
        Item {
            id,
            seller_id: 1,
            title: format!("item {id}"),
            description: None,
            price: Money::from_cents(500),
            available,
        }
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let store = Store::new(MemoryBackend::new());
        let mut tx = store.transaction();
        tx.write(Table::Items, id_key(1), &item(1, 3)).unwrap();

        // visible to the writer
        let staged: Option<Item> = tx.read(Table::Items, &id_key(1)).unwrap();
        assert_eq!(staged.map(|i| i.available), Some(3));

        // invisible to everyone else
        let other = store.transaction();
        let unseen: Option<Item> = other.read(Table::Items, &id_key(1)).unwrap();
        assert!(unseen.is_none());
        other.rollback();

        tx.commit().unwrap();
        let reader = store.transaction();
        let seen: Option<Item> = reader.read(Table::Items, &id_key(1)).unwrap();
        assert_eq!(seen, Some(item(1, 3)));
    }

    #[test]
    fn dropping_discards_writes_and_releases_locks() {
        let store = Store::new(MemoryBackend::new());
        {
            let mut tx = store.transaction();
            tx.lock(RowKey::Item(1)).unwrap();
            tx.write(Table::Items, id_key(1), &item(1, 3)).unwrap();
        }
        assert_eq!(store.locks().holder(RowKey::Item(1)), None);
        assert!(store.locks().is_empty());
        assert_eq!(store.backend().len(Table::Items), 0);
    }

    #[test]
    fn commit_releases_locks() {
        let store = Store::new(MemoryBackend::new()).with_lock_timeout(Duration::from_millis(20));
        let mut first = store.transaction();
        first.lock(RowKey::Item(1)).unwrap();

        let mut second = store.transaction();
        assert!(second.lock(RowKey::Item(1)).unwrap_err().is_busy());

        first.commit().unwrap();
        second.lock(RowKey::Item(1)).unwrap();
        assert!(second.holds(RowKey::Item(1)));
    }

    #[test]
    fn scan_merges_staged_writes() {
        let store = Store::new(MemoryBackend::new());
        let mut tx = store.transaction();
        tx.mark(Table::BuyerOrders, crate::storage::pair_key(1, 1));
        tx.commit().unwrap();

        let mut tx = store.transaction();
        tx.mark(Table::BuyerOrders, crate::storage::pair_key(1, 2));
        tx.delete(Table::BuyerOrders, crate::storage::pair_key(1, 1));
        let keys: Vec<Key> = tx
            .scan(Table::BuyerOrders, &id_key(1))
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec![crate::storage::pair_key(1, 2)]);
    }
}
