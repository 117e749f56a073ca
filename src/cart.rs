//! Buyers' carts: the store contract and the mutations built on top of it
use crate::error::{CartError, StoreError, ValidationError};
use crate::inventory::InventoryStore;
use crate::lock::RowKey;
use crate::storage::{Backend, Table, id_key};
use crate::transaction::{Commit, Transaction, UnitOfWork};
use crate::types::{CartLine, ItemId, UserId};
use std::sync::Arc;
use tracing::instrument;

pub trait CartStore {
    /// The buyer's lines in insertion order.
    fn lines(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError>;

    /// Same as [`CartStore::lines`], after taking the lock on the buyer's cart.
    fn lines_for_update(&mut self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError>;

    /// Replaces the buyer's whole line set. An empty set removes the cart.
    fn replace_lines(&mut self, buyer_id: UserId, lines: Vec<CartLine>) -> Result<(), StoreError>;

    fn clear(&mut self, buyer_id: UserId) -> Result<(), StoreError>;
}

impl<B: Backend> CartStore for Transaction<'_, B> {
    fn lines(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        Ok(self
            .read::<Vec<CartLine>>(Table::Carts, &id_key(buyer_id))?
            .unwrap_or_default())
    }

    fn lines_for_update(&mut self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        self.lock(RowKey::Cart(buyer_id))?;
        self.lines(buyer_id)
    }

    fn replace_lines(&mut self, buyer_id: UserId, lines: Vec<CartLine>) -> Result<(), StoreError> {
        for (idx, line) in lines.iter().enumerate() {
            if line.quantity == 0 {
                return Err(StoreError::ZeroQuantity(line.item_id));
            }
            if lines[..idx].iter().any(|prev| prev.item_id == line.item_id) {
                return Err(StoreError::DuplicateCartLine(line.item_id));
            }
        }

        self.lock(RowKey::Cart(buyer_id))?;
        if lines.is_empty() {
            self.delete(Table::Carts, id_key(buyer_id));
            Ok(())
        } else {
            self.write(Table::Carts, id_key(buyer_id), &lines)
        }
    }

    fn clear(&mut self, buyer_id: UserId) -> Result<(), StoreError> {
        self.lock(RowKey::Cart(buyer_id))?;
        self.delete(Table::Carts, id_key(buyer_id));
        Ok(())
    }
}

/// Cart mutations. Each one computes the buyer's new full line set and
/// stores it with [`CartStore::replace_lines`]. Every line of the new set is
/// validated against current stock, including lines the mutation did not
/// touch. Dropping a line is the one mutation accepted without validation.
pub struct CartService<U> {
    store: Arc<U>,
}

impl<U: UnitOfWork> CartService<U> {
    pub fn new(store: Arc<U>) -> Self {
        Self { store }
    }

    pub fn cart(&self, buyer_id: UserId) -> Result<Vec<CartLine>, CartError> {
        let tx = self.store.begin()?;
        let lines = tx.lines(buyer_id)?;
        tx.rollback();
        Ok(lines)
    }

    /// Adds `quantity` of an item, or increments the line already present.
    #[instrument(level = "debug", skip(self))]
    pub fn add_item(
        &self,
        buyer_id: UserId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Vec<CartLine>, CartError> {
        let added = CartLine::new(item_id, quantity)?;
        self.mutate(buyer_id, Stock::Check, |mut lines| {
            match lines.iter_mut().find(|line| line.item_id == item_id) {
                Some(line) => line.quantity = line.quantity.saturating_add(added.quantity),
                None => lines.push(added),
            }
            Ok(lines)
        })
    }

    /// Sets the quantity of a listed item's line; zero removes it.
    #[instrument(level = "debug", skip(self))]
    pub fn set_quantity(
        &self,
        buyer_id: UserId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Vec<CartLine>, CartError> {
        {
            let tx = self.store.begin()?;
            let listed = tx.item(item_id)?.is_some();
            tx.rollback();
            if !listed {
                return Err(CartError::ItemNotFound(item_id));
            }
        }
        if quantity == 0 {
            return self.drop_line(buyer_id, item_id);
        }
        self.mutate(buyer_id, Stock::Check, |mut lines| {
            match lines.iter_mut().find(|line| line.item_id == item_id) {
                Some(line) => line.quantity = quantity,
                None => lines.push(CartLine { item_id, quantity }),
            }
            Ok(lines)
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn remove_item(
        &self,
        buyer_id: UserId,
        item_id: ItemId,
    ) -> Result<Vec<CartLine>, CartError> {
        self.drop_line(buyer_id, item_id)
    }

    /// Replaces the whole cart. Repeated items are merged by summing.
    #[instrument(level = "debug", skip(self, lines), fields(lines = lines.len()))]
    pub fn set_cart(
        &self,
        buyer_id: UserId,
        lines: Vec<CartLine>,
    ) -> Result<Vec<CartLine>, CartError> {
        let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(ValidationError::ZeroQuantity(line.item_id).into());
            }
            match merged.iter_mut().find(|m| m.item_id == line.item_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity)
                }
                None => merged.push(line),
            }
        }
        self.mutate(buyer_id, Stock::Check, move |_| Ok(merged))
    }

    /// Removing a line never asks for stock, so a buyer can always shrink a
    /// cart that has gone over.
    fn drop_line(&self, buyer_id: UserId, item_id: ItemId) -> Result<Vec<CartLine>, CartError> {
        self.mutate(buyer_id, Stock::Skip, |mut lines| {
            lines.retain(|line| line.item_id != item_id);
            Ok(lines)
        })
    }

    fn mutate<F>(
        &self,
        buyer_id: UserId,
        stock: Stock,
        change: F,
    ) -> Result<Vec<CartLine>, CartError>
    where
        F: FnOnce(Vec<CartLine>) -> Result<Vec<CartLine>, CartError>,
    {
        let mut tx = self.store.begin()?;
        let current = tx.lines_for_update(buyer_id)?;
        let next = change(current)?;

        if stock == Stock::Check {
            for line in &next {
                let item = tx
                    .item(line.item_id)?
                    .ok_or(CartError::ItemNotFound(line.item_id))?;
                if line.quantity > item.available {
                    return Err(CartError::InsufficientStock {
                        item_id: line.item_id,
                        requested: line.quantity,
                        available: item.available,
                    });
                }
            }
        }

        tx.replace_lines(buyer_id, next.clone())?;
        tx.commit()?;
        tracing::debug!(buyer_id, lines = next.len(), "cart updated");
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stock {
    Check,
    Skip,
}
