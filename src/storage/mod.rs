//! Raw key/value storage underneath the transactional stores.
//!
//! A backend only has to read single keys, scan by prefix, hand out unique
//! ids and apply a [`WriteSet`] atomically. Locking, staging and record
//! encoding live in [`crate::transaction`].
mod memory;
mod sled_backend;

pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;

use crate::error::StoreError;
use std::collections::BTreeMap;

pub type Key = Vec<u8>;

/// The canonical tables. Keys are big-endian ids so that byte order matches
/// numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// item id -> `Item`
    Items,
    /// buyer id -> `Vec<CartLine>`
    Carts,
    /// order id -> `Order`
    Orders,
    /// buyer id ++ order id -> ()
    BuyerOrders,
    /// seller id ++ order id -> ()
    SellerOrders,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Items,
        Table::Carts,
        Table::Orders,
        Table::BuyerOrders,
        Table::SellerOrders,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Items => "items",
            Table::Carts => "carts",
            Table::Orders => "orders",
            Table::BuyerOrders => "buyer_orders",
            Table::SellerOrders => "seller_orders",
        }
    }
}

pub fn id_key(id: u64) -> Key {
    id.to_be_bytes().to_vec()
}

pub fn pair_key(owner: u64, id: u64) -> Key {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&owner.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Reads the trailing id from a key built with [`pair_key`].
pub fn trailing_id(key: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

/// Staged writes of one transaction. `None` marks a removal.
#[derive(Debug, Default)]
pub struct WriteSet {
    writes: BTreeMap<(Table, Key), Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, table: Table, key: Key, value: Vec<u8>) {
        self.writes.insert((table, key), Some(value));
    }
    pub fn remove(&mut self, table: Table, key: Key) {
        self.writes.insert((table, key), None);
    }
    /// `Some(None)` means the key was removed in this write set.
    pub fn get(&self, table: Table, key: &[u8]) -> Option<Option<&[u8]>> {
        self.writes
            .get(&(table, key.to_vec()))
            .map(|value| value.as_deref())
    }
    pub fn with_prefix<'a>(
        &'a self,
        table: Table,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a [u8], Option<&'a [u8]>)> + 'a {
        self.writes
            .range((table, prefix.to_vec())..)
            .take_while(move |((t, key), _)| *t == table && key.starts_with(prefix))
            .map(|((_, key), value)| (key.as_slice(), value.as_deref()))
    }
    pub fn iter(&self) -> impl Iterator<Item = (Table, &[u8], Option<&[u8]>)> {
        self.writes
            .iter()
            .map(|((table, key), value)| (*table, key.as_slice(), value.as_deref()))
    }
    pub fn len(&self) -> usize {
        self.writes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

pub trait Backend: Send + Sync {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Key, Vec<u8>)>, StoreError>;

    /// Applies every write or none of them.
    fn apply(&self, writes: &WriteSet) -> Result<(), StoreError>;

    /// Monotonically increasing, never returns the same id twice.
    fn generate_id(&self) -> Result<u64, StoreError>;
}
