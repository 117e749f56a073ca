//! Per-item stock: locked reads and checked decrements
use crate::error::StoreError;
use crate::lock::RowKey;
use crate::storage::{Backend, Table, id_key};
use crate::transaction::Transaction;
use crate::types::{Item, ItemId, StockLevel};

/// Authoritative source of item prices and available quantities.
pub trait InventoryStore {
    /// Reads an item without locking it.
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Every listed item in id order.
    fn items(&self) -> Result<Vec<Item>, StoreError>;

    /// Locks the item's row until the transaction ends, waiting while another
    /// transaction holds it, then reads its price and stock.
    fn lock_and_read(&mut self, item_id: ItemId) -> Result<StockLevel, StoreError>;

    /// Takes `quantity` off the available stock. Fails instead of clamping.
    fn decrement(&mut self, item_id: ItemId, quantity: u32) -> Result<(), StoreError>;

    fn next_item_id(&mut self) -> Result<ItemId, StoreError>;

    /// Creates or overwrites an item, locking its row.
    fn put_item(&mut self, item: &Item) -> Result<(), StoreError>;

    /// Returns false when there was nothing to remove.
    fn remove_item(&mut self, item_id: ItemId) -> Result<bool, StoreError>;
}

impl<B: Backend> InventoryStore for Transaction<'_, B> {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        self.read(Table::Items, &id_key(item_id))
    }

    fn items(&self) -> Result<Vec<Item>, StoreError> {
        self.scan(Table::Items, &[])?
            .into_iter()
            .map(|(_, bytes)| -> Result<Item, StoreError> { Ok(minicbor::decode(&bytes)?) })
            .collect()
    }

    fn lock_and_read(&mut self, item_id: ItemId) -> Result<StockLevel, StoreError> {
        self.lock(RowKey::Item(item_id))?;
        let item = self.item(item_id)?.ok_or(StoreError::ItemNotFound(item_id))?;
        Ok(StockLevel::from(&item))
    }

    fn decrement(&mut self, item_id: ItemId, quantity: u32) -> Result<(), StoreError> {
        self.lock(RowKey::Item(item_id))?;
        let mut item = self.item(item_id)?.ok_or(StoreError::ItemNotFound(item_id))?;
        item.available = item
            .available
            .checked_sub(quantity)
            .ok_or(StoreError::InsufficientStock {
                item_id,
                requested: quantity,
                available: item.available,
            })?;
        self.write(Table::Items, id_key(item_id), &item)
    }

    fn next_item_id(&mut self) -> Result<ItemId, StoreError> {
        self.generate_id()
    }

    fn put_item(&mut self, item: &Item) -> Result<(), StoreError> {
        self.lock(RowKey::Item(item.id))?;
        self.write(Table::Items, id_key(item.id), item)
    }

    fn remove_item(&mut self, item_id: ItemId) -> Result<bool, StoreError> {
        self.lock(RowKey::Item(item_id))?;
        if self.item(item_id)?.is_none() {
            return Ok(false);
        }
        self.delete(Table::Items, id_key(item_id));
        Ok(true)
    }
}
