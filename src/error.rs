use crate::lock::RowKey;
use crate::types::{ItemId, OrderId, OrderStatus, UserId};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("quantity for item {0} must be at least 1")]
    ZeroQuantity(ItemId),
    #[error("item title is missing")]
    MissingTitle,
    #[error("item price is missing")]
    MissingPrice,
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),
}

/// Failures raised by the stores and the transaction they run in.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },
    #[error("gave up waiting for {key} after {waited:?}")]
    Busy { key: RowKey, waited: Duration },
    #[error("an order needs at least one line")]
    EmptyOrder,
    #[error("order total overflowed")]
    AmountOverflow,
    #[error("cart line for item {0} has a zero quantity")]
    ZeroQuantity(ItemId),
    #[error("cart contains item {0} more than once")]
    DuplicateCartLine(ItemId),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy { .. })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("item {0} is no longer available")]
    ItemNotFound(ItemId),
    #[error("not enough stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },
    #[error("checkout is busy, try again")]
    Busy,
    // the source is logged, never shown to the buyer
    #[error("order could not be placed")]
    Storage(#[source] StoreError),
}

impl CheckoutError {
    /// Transient failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::Busy)
    }

    /// Failures caused by the buyer's cart rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CheckoutError::EmptyCart
                | CheckoutError::ItemNotFound(_)
                | CheckoutError::InsufficientStock { .. }
        )
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(item_id) => CheckoutError::ItemNotFound(item_id),
            StoreError::InsufficientStock {
                item_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                item_id,
                requested,
                available,
            },
            StoreError::Busy { .. } => CheckoutError::Busy,
            other => CheckoutError::Storage(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CartError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    #[error("not enough stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },
    #[error("cart is busy, try again")]
    Busy,
    #[error("cart could not be updated")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(item_id) => CartError::ItemNotFound(item_id),
            StoreError::ZeroQuantity(item_id) => {
                CartError::Invalid(ValidationError::ZeroQuantity(item_id))
            }
            StoreError::InsufficientStock {
                item_id,
                requested,
                available,
            } => CartError::InsufficientStock {
                item_id,
                requested,
                available,
            },
            StoreError::Busy { .. } => CartError::Busy,
            other => CartError::Storage(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("item {item_id} does not belong to seller {seller_id}")]
    Forbidden { item_id: ItemId, seller_id: UserId },
    #[error("item is busy, try again")]
    Busy,
    #[error("catalog could not be updated")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(item_id) => CatalogError::NotFound(item_id),
            StoreError::Busy { .. } => CatalogError::Busy,
            other => CatalogError::Storage(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderId),
    #[error("seller {seller_id} has no items in order {order_id}")]
    Forbidden { order_id: OrderId, seller_id: UserId },
    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order is busy, try again")]
    Busy,
    #[error("order could not be loaded or saved")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(order_id) => OrderError::NotFound(order_id),
            StoreError::Busy { .. } => OrderError::Busy,
            other => OrderError::Storage(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}
