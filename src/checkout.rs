//! Converting a cart into an order inside one transaction.
//!
//! Locks are always taken in the same order: the buyer's cart row first,
//! then every item row in ascending id order. Two checkouts with overlapping
//! items therefore wait on each other instead of deadlocking.
use crate::cart::CartStore;
use crate::error::CheckoutError;
use crate::inventory::InventoryStore;
use crate::ledger::OrderLedger;
use crate::types::{LineItem, Order, ShippingInfo, UserId};

/// Runs the checkout steps against an open transaction. The caller owns the
/// transaction and decides whether to commit; on error nothing has to be
/// undone beyond dropping it.
pub fn place_order_in<T>(
    tx: &mut T,
    buyer_id: UserId,
    shipping: ShippingInfo,
) -> Result<Order, CheckoutError>
where
    T: InventoryStore + CartStore + OrderLedger,
{
    let mut lines = tx.lines_for_update(buyer_id)?;
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    lines.sort_by_key(|line| line.item_id);

    let mut accepted = Vec::with_capacity(lines.len());
    for line in &lines {
        let stock = tx.lock_and_read(line.item_id)?;
        if line.quantity > stock.available {
            return Err(CheckoutError::InsufficientStock {
                item_id: line.item_id,
                requested: line.quantity,
                available: stock.available,
            });
        }
        accepted.push(LineItem::from_stock(&stock, line.quantity));
    }

    for line in &accepted {
        tx.decrement(line.item_id, line.quantity)?;
    }

    let order = tx.append(buyer_id, accepted, shipping)?;
    tx.clear(buyer_id)?;
    Ok(order)
}
