//! Append-only order records with buyer and seller indexes
use crate::error::StoreError;
use crate::lock::RowKey;
use crate::storage::{Backend, Table, id_key, pair_key, trailing_id};
use crate::transaction::Transaction;
use crate::types::{
    LineItem, Money, Order, OrderId, OrderLine, OrderStatus, ShippingInfo, TimeStamp, UserId,
};
use crate::utils::order_reference;

pub trait OrderLedger {
    /// Records a new pending order for `buyer_id`. The total is computed
    /// here from the captured unit prices.
    fn append(
        &mut self,
        buyer_id: UserId,
        lines: Vec<LineItem>,
        shipping: ShippingInfo,
    ) -> Result<Order, StoreError>;

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Locks the order row and reads it.
    fn order_for_update(&mut self, order_id: OrderId) -> Result<Order, StoreError>;

    /// The buyer's orders, most recent first.
    fn find_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Orders containing at least one line sold by `seller_id`, most recent first.
    fn find_by_seller(&self, seller_id: UserId) -> Result<Vec<Order>, StoreError>;

    fn update_status(&mut self, order_id: OrderId, status: OrderStatus)
    -> Result<Order, StoreError>;
}

impl<B: Backend> Transaction<'_, B> {
    fn indexed_orders(&self, index: Table, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders = Vec::new();
        // ids grow monotonically, so reverse key order is newest first
        for (key, _) in self.scan(index, &id_key(owner))?.into_iter().rev() {
            let Some(order_id) = trailing_id(&key) else {
                continue;
            };
            match self.order(order_id)? {
                Some(order) => orders.push(order),
                None => tracing::warn!(?index, owner, order_id, "index entry without order"),
            }
        }
        Ok(orders)
    }
}

impl<B: Backend> OrderLedger for Transaction<'_, B> {
    fn append(
        &mut self,
        buyer_id: UserId,
        lines: Vec<LineItem>,
        shipping: ShippingInfo,
    ) -> Result<Order, StoreError> {
        if lines.is_empty() {
            return Err(StoreError::EmptyOrder);
        }

        let mut total = Money::ZERO;
        for line in &lines {
            if line.quantity == 0 {
                return Err(StoreError::ZeroQuantity(line.item_id));
            }
            let subtotal = line
                .unit_price
                .checked_mul(line.quantity)
                .ok_or(StoreError::AmountOverflow)?;
            total = total
                .checked_add(subtotal)
                .ok_or(StoreError::AmountOverflow)?;
        }

        let order_id = self.generate_id()?;
        self.lock(RowKey::Order(order_id))?;

        let order = Order {
            id: order_id,
            reference: order_reference()?,
            buyer_id,
            lines: lines
                .into_iter()
                .map(|line| OrderLine {
                    order_id,
                    item_id: line.item_id,
                    seller_id: line.seller_id,
                    title: line.title,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            total,
            status: OrderStatus::Pending,
            shipping,
            created_at: TimeStamp::new(),
        };

        self.write(Table::Orders, id_key(order_id), &order)?;
        self.mark(Table::BuyerOrders, pair_key(buyer_id, order_id));

        let mut sellers: Vec<UserId> = order.lines.iter().map(|line| line.seller_id).collect();
        sellers.sort_unstable();
        sellers.dedup();
        for seller_id in sellers {
            self.mark(Table::SellerOrders, pair_key(seller_id, order_id));
        }

        Ok(order)
    }

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.read(Table::Orders, &id_key(order_id))
    }

    fn order_for_update(&mut self, order_id: OrderId) -> Result<Order, StoreError> {
        self.lock(RowKey::Order(order_id))?;
        self.order(order_id)?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    fn find_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.indexed_orders(Table::BuyerOrders, buyer_id)
    }

    fn find_by_seller(&self, seller_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.indexed_orders(Table::SellerOrders, seller_id)
    }

    fn update_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let mut order = self.order_for_update(order_id)?;
        order.status = status;
        self.write(Table::Orders, id_key(order_id), &order)?;
        Ok(order)
    }
}
