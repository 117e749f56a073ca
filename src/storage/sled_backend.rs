use super::{Backend, Key, Table, WriteSet};
use crate::config::EngineConfig;
use crate::error::StoreError;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::sync::Arc;

/// Durable backend: one sled tree per table, write sets applied as a single
/// multi-tree sled transaction.
pub struct SledBackend {
    instance: Arc<sled::Db>,
    items: Tree,
    carts: Tree,
    orders: Tree,
    buyer_orders: Tree,
    seller_orders: Tree,
    flush_on_commit: bool,
}

impl SledBackend {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        Ok(Self {
            items: instance.open_tree(Table::Items.name())?,
            carts: instance.open_tree(Table::Carts.name())?,
            orders: instance.open_tree(Table::Orders.name())?,
            buyer_orders: instance.open_tree(Table::BuyerOrders.name())?,
            seller_orders: instance.open_tree(Table::SellerOrders.name())?,
            instance,
            flush_on_commit: false,
        })
    }

    /// Opens (or creates) the database at `config.db_path`.
    pub fn open(config: &EngineConfig) -> Result<Self, StoreError> {
        let db = sled::open(&config.db_path)?;
        tracing::info!(path = %config.db_path.display(), "opened order database");
        Ok(Self::new(Arc::new(db))?.with_flush_on_commit(config.flush_on_commit))
    }

    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Items => &self.items,
            Table::Carts => &self.carts,
            Table::Orders => &self.orders,
            Table::BuyerOrders => &self.buyer_orders,
            Table::SellerOrders => &self.seller_orders,
        }
    }
}

impl Backend for SledBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree(table).get(key)?.map(|value| value.to_vec()))
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Key, Vec<u8>)>, StoreError> {
        self.tree(table)
            .scan_prefix(prefix)
            .map(|entry| -> Result<(Key, Vec<u8>), StoreError> {
                let (key, value) = entry?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }

    fn apply(&self, writes: &WriteSet) -> Result<(), StoreError> {
        let trees = (
            &self.items,
            &self.carts,
            &self.orders,
            &self.buyer_orders,
            &self.seller_orders,
        );
        let result = trees.transaction(|(items, carts, orders, buyer_orders, seller_orders)| {
            for (table, key, value) in writes.iter() {
                let tree = match table {
                    Table::Items => items,
                    Table::Carts => carts,
                    Table::Orders => orders,
                    Table::BuyerOrders => buyer_orders,
                    Table::SellerOrders => seller_orders,
                };
                match value {
                    Some(value) => {
                        tree.insert(key, value)?;
                    }
                    None => {
                        tree.remove(key)?;
                    }
                }
            }
            Ok::<(), ConflictableTransactionError<()>>(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Storage(err)) => return Err(StoreError::Sled(err)),
            Err(TransactionError::Abort(())) => {
                return Err(StoreError::Backend("sled transaction aborted".into()));
            }
        }

        if self.flush_on_commit {
            self.instance.flush()?;
        }
        Ok(())
    }

    fn generate_id(&self) -> Result<u64, StoreError> {
        Ok(self.instance.generate_id()? + 1)
    }
}
