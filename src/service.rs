//! Service layer API for checkout, order and catalog operations
use crate::checkout::place_order_in;
use crate::config::{EngineConfig, StatusPolicy};
use crate::error::{CatalogError, CheckoutError, OrderError};
use crate::inventory::InventoryStore;
use crate::ledger::OrderLedger;
use crate::transaction::{Commit, UnitOfWork};
use crate::types::{
    Item, ItemDraft, ItemId, ItemUpdate, Order, OrderId, OrderStatus, ShippingInfo, UserId,
};
use std::sync::Arc;
use tracing::instrument;

/// Checkout plus everything that happens to an order afterwards. Shared
/// between request handlers through an `Arc`.
pub struct OrderService<U> {
    store: Arc<U>,
    policy: StatusPolicy,
}

impl<U: UnitOfWork> OrderService<U> {
    pub fn new(store: Arc<U>, config: &EngineConfig) -> Self {
        Self {
            store,
            policy: config.status_policy,
        }
    }

    /// Converts the buyer's cart into a pending order. Stock is deducted, the
    /// order recorded and the cart cleared in one transaction; on any error
    /// none of that happens.
    #[instrument(skip(self, shipping))]
    pub fn place_order(
        &self,
        buyer_id: UserId,
        shipping: ShippingInfo,
    ) -> Result<Order, CheckoutError> {
        let result = self.checkout(buyer_id, shipping);
        match &result {
            Ok(order) => tracing::info!(
                order_id = order.id,
                reference = %order.reference,
                total = %order.total,
                lines = order.lines.len(),
                "order placed"
            ),
            Err(CheckoutError::Storage(source)) => {
                tracing::error!(buyer_id, error = %source, detail = ?source, "checkout failed")
            }
            Err(err) => tracing::warn!(buyer_id, error = %err, "checkout rejected"),
        }
        result
    }

    fn checkout(&self, buyer_id: UserId, shipping: ShippingInfo) -> Result<Order, CheckoutError> {
        // An empty cart is rejected before any transaction is opened
        if self.store.cart_snapshot(buyer_id)?.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut tx = self.store.begin()?;
        let order = place_order_in(&mut tx, buyer_id, shipping)?;
        tx.commit()?;
        Ok(order)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let tx = self.store.begin()?;
        let order = tx.order(order_id)?;
        tx.rollback();
        order.ok_or(OrderError::NotFound(order_id))
    }

    /// Most recent first.
    pub fn orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderError> {
        let tx = self.store.begin()?;
        let orders = tx.find_by_buyer(buyer_id)?;
        tx.rollback();
        Ok(orders)
    }

    /// Orders with at least one line from the seller, most recent first.
    pub fn orders_for_seller(&self, seller_id: UserId) -> Result<Vec<Order>, OrderError> {
        let tx = self.store.begin()?;
        let orders = tx.find_by_seller(seller_id)?;
        tx.rollback();
        Ok(orders)
    }

    /// Moves an order to `status` on behalf of a seller with a line in it.
    #[instrument(skip(self))]
    pub fn update_status(
        &self,
        seller_id: UserId,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut tx = self.store.begin()?;
        let order = tx.order_for_update(order_id)?;

        // Verify the seller has something in this order
        if !order.involves_seller(seller_id) {
            return Err(OrderError::Forbidden {
                order_id,
                seller_id,
            });
        }

        let allowed = match self.policy {
            StatusPolicy::Strict => order.status.can_advance_to(status),
            StatusPolicy::Permissive => true,
        };
        if !allowed {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        let updated = tx.update_status(order_id, status)?;
        tx.commit()?;
        tracing::info!(order_id, from = %order.status, to = %status, "order status updated");
        Ok(updated)
    }
}

/// Seller-side management of listings.
pub struct CatalogService<U> {
    store: Arc<U>,
}

impl<U: UnitOfWork> CatalogService<U> {
    pub fn new(store: Arc<U>) -> Self {
        Self { store }
    }

    /// List a new item for `seller_id`
    #[instrument(skip(self, draft))]
    pub fn create_item(&self, seller_id: UserId, draft: ItemDraft) -> Result<Item, CatalogError> {
        let mut tx = self.store.begin()?;
        let item_id = tx.next_item_id()?;
        let item = draft.finalise(item_id, seller_id)?;
        tx.put_item(&item)?;
        tx.commit()?;

        tracing::info!(
            item_id,
            seller_id,
            price = %item.price,
            stock = item.available,
            "item listed"
        );
        Ok(item)
    }

    /// Edit a listing. Takes the item's row lock, so the edit waits for
    /// in-flight checkouts of the same item.
    #[instrument(skip(self, update))]
    pub fn update_item(
        &self,
        seller_id: UserId,
        item_id: ItemId,
        update: ItemUpdate,
    ) -> Result<Item, CatalogError> {
        let mut tx = self.store.begin()?;
        tx.lock_and_read(item_id)?;
        let mut item = tx.item(item_id)?.ok_or(CatalogError::NotFound(item_id))?;

        if item.seller_id != seller_id {
            return Err(CatalogError::Forbidden { item_id, seller_id });
        }
        if update.is_empty() {
            tx.rollback();
            return Ok(item);
        }

        update.apply_to(&mut item)?;
        tx.put_item(&item)?;
        tx.commit()?;

        tracing::info!(item_id, price = %item.price, stock = item.available, "item updated");
        Ok(item)
    }

    /// Delist an item. Past orders keep their captured copy of it.
    #[instrument(skip(self))]
    pub fn remove_item(&self, seller_id: UserId, item_id: ItemId) -> Result<(), CatalogError> {
        let mut tx = self.store.begin()?;
        let stock = tx.lock_and_read(item_id)?;
        if stock.seller_id != seller_id {
            return Err(CatalogError::Forbidden { item_id, seller_id });
        }
        tx.remove_item(item_id)?;
        tx.commit()?;

        tracing::info!(item_id, seller_id, "item removed");
        Ok(())
    }

    pub fn item(&self, item_id: ItemId) -> Result<Item, CatalogError> {
        let tx = self.store.begin()?;
        let item = tx.item(item_id)?;
        tx.rollback();
        item.ok_or(CatalogError::NotFound(item_id))
    }

    pub fn items(&self) -> Result<Vec<Item>, CatalogError> {
        let tx = self.store.begin()?;
        let items = tx.items()?;
        tx.rollback();
        Ok(items)
    }
}
