//! Failures injected part way through a checkout must leave no trace
mod common;

use common::{init_tracing, list_item};
use craftly_orders::storage::{Backend, Key, MemoryBackend, Table, WriteSet};
use craftly_orders::types::{
    CartLine, Item, ItemId, LineItem, Order, OrderId, OrderStatus, ShippingInfo, StockLevel,
    UserId,
};
use craftly_orders::{
    CartService, CartStore, CatalogService, CheckoutError, Commit, EngineConfig, InventoryStore,
    OrderLedger, OrderService, Store, StoreError, Transaction, UnitOfWork,
};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const SELLER: u64 = 3;
const BUYER: u64 = 4;

#[derive(Debug, Clone, Copy)]
enum Fault {
    Begin,
    Decrement(ItemId),
    Append,
    Clear,
}

/// Store wrapper whose transactions fail one chosen call
struct Faulty {
    inner: Arc<Store<MemoryBackend>>,
    fault: Fault,
}

struct FaultyTx<'a> {
    inner: Transaction<'a, MemoryBackend>,
    fault: Fault,
}

fn injected() -> StoreError {
    StoreError::Backend("injected fault".into())
}

impl UnitOfWork for Faulty {
    type Tx<'a>
        = FaultyTx<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError> {
        if let Fault::Begin = self.fault {
            return Err(injected());
        }
        Ok(FaultyTx {
            inner: self.inner.transaction(),
            fault: self.fault,
        })
    }

    fn cart_snapshot(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        self.inner.cart_snapshot(buyer_id)
    }
}

impl InventoryStore for FaultyTx<'_> {
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        self.inner.item(item_id)
    }
    fn items(&self) -> Result<Vec<Item>, StoreError> {
        self.inner.items()
    }
    fn lock_and_read(&mut self, item_id: ItemId) -> Result<StockLevel, StoreError> {
        self.inner.lock_and_read(item_id)
    }
    fn decrement(&mut self, item_id: ItemId, quantity: u32) -> Result<(), StoreError> {
        match self.fault {
            Fault::Decrement(failing) if failing == item_id => Err(injected()),
            _ => self.inner.decrement(item_id, quantity),
        }
    }
    fn next_item_id(&mut self) -> Result<ItemId, StoreError> {
        self.inner.next_item_id()
    }
    fn put_item(&mut self, item: &Item) -> Result<(), StoreError> {
        self.inner.put_item(item)
    }
    fn remove_item(&mut self, item_id: ItemId) -> Result<bool, StoreError> {
        self.inner.remove_item(item_id)
    }
}

impl CartStore for FaultyTx<'_> {
    fn lines(&self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        self.inner.lines(buyer_id)
    }
    fn lines_for_update(&mut self, buyer_id: UserId) -> Result<Vec<CartLine>, StoreError> {
        self.inner.lines_for_update(buyer_id)
    }
    fn replace_lines(&mut self, buyer_id: UserId, lines: Vec<CartLine>) -> Result<(), StoreError> {
        self.inner.replace_lines(buyer_id, lines)
    }
    fn clear(&mut self, buyer_id: UserId) -> Result<(), StoreError> {
        match self.fault {
            Fault::Clear => Err(injected()),
            _ => self.inner.clear(buyer_id),
        }
    }
}

impl OrderLedger for FaultyTx<'_> {
    fn append(
        &mut self,
        buyer_id: UserId,
        lines: Vec<LineItem>,
        shipping: ShippingInfo,
    ) -> Result<Order, StoreError> {
        match self.fault {
            Fault::Append => Err(injected()),
            _ => self.inner.append(buyer_id, lines, shipping),
        }
    }
    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.order(order_id)
    }
    fn order_for_update(&mut self, order_id: OrderId) -> Result<Order, StoreError> {
        self.inner.order_for_update(order_id)
    }
    fn find_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.inner.find_by_buyer(buyer_id)
    }
    fn find_by_seller(&self, seller_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.inner.find_by_seller(seller_id)
    }
    fn update_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        self.inner.update_status(order_id, status)
    }
}

impl Commit for FaultyTx<'_> {
    fn commit(self) -> Result<(), StoreError> {
        self.inner.commit()
    }
    fn rollback(self) {
        self.inner.rollback()
    }
}

/// Memory backend whose atomic apply can be switched to fail
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl Backend for FlakyBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(table, key)
    }
    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Key, Vec<u8>)>, StoreError> {
        self.inner.scan_prefix(table, prefix)
    }
    fn apply(&self, writes: &WriteSet) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".into()));
        }
        self.inner.apply(writes)
    }
    fn generate_id(&self) -> Result<u64, StoreError> {
        self.inner.generate_id()
    }
}

/// Two items, both in the buyer's cart
fn faulty_fixture(
    fault: impl FnOnce(&Item, &Item) -> Fault,
) -> anyhow::Result<(Arc<Faulty>, Item, Item)> {
    let inner = Arc::new(Store::new(MemoryBackend::new()));
    let catalog = CatalogService::new(inner.clone());
    let a = list_item(&catalog, SELLER, "Item A", 1_000, 3)?;
    let b = list_item(&catalog, SELLER, "Item B", 2_000, 3)?;
    let carts = CartService::new(inner.clone());
    carts.add_item(BUYER, a.id, 1)?;
    carts.add_item(BUYER, b.id, 2)?;

    let fault = fault(&a, &b);
    Ok((Arc::new(Faulty { inner, fault }), a, b))
}

fn assert_untouched(store: &Arc<Faulty>, a: &Item, b: &Item) -> anyhow::Result<()> {
    let catalog = CatalogService::new(store.clone());
    assert_eq!(catalog.item(a.id)?.available, 3);
    assert_eq!(catalog.item(b.id)?.available, 3);

    let carts = CartService::new(store.clone());
    assert_eq!(
        carts.cart(BUYER)?,
        vec![CartLine::new(a.id, 1)?, CartLine::new(b.id, 2)?]
    );

    let orders = OrderService::new(store.clone(), &EngineConfig::default());
    assert!(orders.orders_for_buyer(BUYER)?.is_empty());
    assert!(orders.orders_for_seller(SELLER)?.is_empty());
    assert_eq!(store.inner.backend().len(Table::Orders), 0);
    Ok(())
}

#[test]
fn failing_decrement_rolls_back_earlier_lines() -> anyhow::Result<()> {
    init_tracing();
    // the second line in item order fails after the first was decremented
    let (store, a, b) = faulty_fixture(|_, b| Fault::Decrement(b.id))?;
    let orders = OrderService::new(store.clone(), &EngineConfig::default());

    let err = orders
        .place_order(BUYER, ShippingInfo::new())
        .expect_err("checkout should fail");
    assert!(matches!(err, CheckoutError::Storage(_)));
    assert_eq!(err.to_string(), "order could not be placed");

    assert_untouched(&store, &a, &b)
}

#[test]
fn failing_ledger_write_rolls_back_stock() -> anyhow::Result<()> {
    init_tracing();
    let (store, a, b) = faulty_fixture(|_, _| Fault::Append)?;
    let orders = OrderService::new(store.clone(), &EngineConfig::default());

    assert!(orders.place_order(BUYER, ShippingInfo::new()).is_err());
    assert_untouched(&store, &a, &b)
}

#[test]
fn failing_cart_clear_rolls_back_order() -> anyhow::Result<()> {
    init_tracing();
    let (store, a, b) = faulty_fixture(|_, _| Fault::Clear)?;
    let orders = OrderService::new(store.clone(), &EngineConfig::default());

    assert!(orders.place_order(BUYER, ShippingInfo::new()).is_err());
    assert_untouched(&store, &a, &b)
}

#[test]
fn failing_commit_leaves_nothing_behind() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(Store::new(FlakyBackend::default()));
    let catalog = CatalogService::new(store.clone());
    let carts = CartService::new(store.clone());
    let orders = OrderService::new(store.clone(), &EngineConfig::default());

    let a = list_item(&catalog, SELLER, "Item A", 1_000, 3)?;
    carts.add_item(BUYER, a.id, 2)?;

    store.backend().failing.store(true, Ordering::SeqCst);
    let err = orders
        .place_order(BUYER, ShippingInfo::new())
        .expect_err("commit should fail");
    assert!(matches!(err, CheckoutError::Storage(StoreError::Backend(_))));
    assert!(err.source().is_some());
    store.backend().failing.store(false, Ordering::SeqCst);

    assert_eq!(catalog.item(a.id)?.available, 3);
    assert_eq!(carts.cart(BUYER)?, vec![CartLine::new(a.id, 2)?]);
    assert_eq!(store.backend().inner.len(Table::Orders), 0);

    // locks were released by the failed commit
    let order = orders.place_order(BUYER, ShippingInfo::new())?;
    assert_eq!(order.total.cents(), 2_000);
    assert_eq!(catalog.item(a.id)?.available, 1);
    Ok(())
}

#[test]
fn empty_cart_is_rejected_without_a_transaction() -> anyhow::Result<()> {
    init_tracing();
    // any attempt to begin a transaction would surface as a storage error
    let (store, _, _) = faulty_fixture(|_, _| Fault::Begin)?;
    let orders = OrderService::new(store.clone(), &EngineConfig::default());

    let err = orders
        .place_order(BUYER + 1, ShippingInfo::new())
        .expect_err("empty cart");
    assert!(matches!(err, CheckoutError::EmptyCart));

    // a non-empty cart gets as far as opening one
    let err = orders
        .place_order(BUYER, ShippingInfo::new())
        .expect_err("begin fails");
    assert!(matches!(err, CheckoutError::Storage(_)));
    Ok(())
}
