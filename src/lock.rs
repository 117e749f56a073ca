//! Exclusive row locks held for the lifetime of a transaction.
//!
//! Each row is guarded by a `Mutex<Option<TxId>>` plus a `Condvar`. A
//! transaction that finds the row owned by someone else waits on the condvar
//! until the owner releases it or the deadline passes. Re-acquiring a row the
//! transaction already owns is a no-op, so stores can lock defensively.
//!
//! Row entries live only while someone owns or waits on them. Releasing a row
//! nobody is waiting for drops its entry, so the table stays proportional to
//! the rows currently in use.
use crate::error::StoreError;
use crate::types::{ItemId, OrderId, UserId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type TxId = u64;

/// Identifies a lockable row. The derived ordering puts carts before items,
/// which is the order a checkout acquires them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Cart(UserId),
    Item(ItemId),
    Order(OrderId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Cart(buyer_id) => write!(f, "cart of buyer {}", buyer_id),
            RowKey::Item(item_id) => write!(f, "item {}", item_id),
            RowKey::Order(order_id) => write!(f, "order {}", order_id),
        }
    }
}

struct RowLock {
    owner: Mutex<Option<TxId>>,
    released: Condvar,
}

impl RowLock {
    fn new() -> Self {
        RowLock {
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }
}

#[derive(Default)]
pub struct LockTable {
    rows: Mutex<HashMap<RowKey, Arc<RowLock>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, key: RowKey) -> Arc<RowLock> {
        self.rows
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(RowLock::new()))
            .clone()
    }

    /// Blocks until `tx` owns `key`, or fails with `Busy` once `timeout` elapses.
    pub fn acquire(&self, key: RowKey, tx: TxId, timeout: Duration) -> Result<(), StoreError> {
        let row = self.row(key);
        let started = Instant::now();
        let deadline = started + timeout;

        let mut owner = row.owner.lock();
        if *owner == Some(tx) {
            return Ok(());
        }
        if owner.is_some() {
            tracing::debug!(%key, tx, holder = ?*owner, "waiting for row lock");
        }
        while owner.is_some() {
            if row.released.wait_until(&mut owner, deadline).timed_out() && owner.is_some() {
                let waited = started.elapsed();
                tracing::debug!(%key, tx, ?waited, "row lock wait timed out");
                drop(owner);
                self.prune(key, &row);
                return Err(StoreError::Busy { key, waited });
            }
        }
        *owner = Some(tx);
        tracing::trace!(%key, tx, "row lock acquired");
        Ok(())
    }

    /// Releases `key` if `tx` owns it and wakes the waiters.
    pub fn release(&self, key: RowKey, tx: TxId) {
        let row = match self.rows.lock().get(&key) {
            Some(row) => row.clone(),
            None => return,
        };
        {
            let mut owner = row.owner.lock();
            if *owner != Some(tx) {
                return;
            }
            *owner = None;
            row.released.notify_all();
            tracing::trace!(%key, tx, "row lock released");
        }
        self.prune(key, &row);
    }

    /// Drops the entry for `key` if it is free and only the table and the
    /// caller still reference it. New handles are only cloned under the map
    /// lock, so a waiter always shows up in the strong count.
    fn prune(&self, key: RowKey, row: &Arc<RowLock>) {
        let mut rows = self.rows.lock();
        let idle = Arc::strong_count(row) == 2 && row.owner.lock().is_none();
        if idle && rows.get(&key).is_some_and(|entry| Arc::ptr_eq(entry, row)) {
            rows.remove(&key);
        }
    }

    /// Number of rows currently tracked.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn holder(&self, key: RowKey) -> Option<TxId> {
        let row = self.rows.lock().get(&key).cloned()?;
        let owner = *row.owner.lock();
        owner
    }
}
