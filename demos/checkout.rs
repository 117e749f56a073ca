//! Walks one buyer through listing, cart and checkout against a sled database.
//!
//! Run with `RUST_LOG=craftly_orders=debug cargo run --example checkout`.
use anyhow::Context;
use craftly_orders::storage::SledBackend;
use craftly_orders::types::{ItemDraft, ItemUpdate, Money, OrderStatus, ShippingInfo};
use craftly_orders::{
    CartService, CatalogService, CheckoutError, EngineConfig, OrderService, Store,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SELLER: u64 = 1;
const BUYER: u64 = 2;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // environment settings apply, but the database always lives in a scratch dir
    let temp_dir = tempfile::tempdir()?;
    let config = EngineConfig::from_env()?.with_db_path(temp_dir.path().join("craftly.db"));
    let store = Arc::new(Store::<SledBackend>::open(&config).context("failed to open database")?);

    let catalog = CatalogService::new(store.clone());
    let carts = CartService::new(store.clone());
    let orders = OrderService::new(store.clone(), &config);

    let mug = catalog.create_item(
        SELLER,
        ItemDraft::new()
            .set_title("Clay mug")
            .set_description("Wheel thrown stoneware")
            .set_price(Money::from_cents(1_250))
            .set_stock(5),
    )?;
    let bowl = catalog.create_item(
        SELLER,
        ItemDraft::new()
            .set_title("Turned bowl")
            .set_price(Money::from_cents(6_500))
            .set_stock(1),
    )?;
    println!("listed {} ({}) and {} ({})", mug.title, mug.price, bowl.title, bowl.price);

    carts.add_item(BUYER, mug.id, 2)?;
    carts.add_item(BUYER, bowl.id, 1)?;

    // the bowl sells elsewhere before our buyer checks out
    catalog.update_item(SELLER, bowl.id, ItemUpdate::new().set_stock(0))?;
    match orders.place_order(BUYER, ShippingInfo::new()) {
        Err(CheckoutError::InsufficientStock {
            item_id,
            requested,
            available,
        }) => println!(
            "checkout refused: item {item_id} wanted {requested}, {available} left; \
             mug stock still {}",
            catalog.item(mug.id)?.available
        ),
        other => anyhow::bail!("expected a stock failure, got {other:?}"),
    }

    carts.remove_item(BUYER, bowl.id)?;
    let shipping = ShippingInfo::new()
        .set_recipient_name("Ada Weaver")
        .set_address("12 Loom Lane");
    let order = orders.place_order(BUYER, shipping)?;
    println!(
        "placed {} with {} line(s), total {}",
        order.reference,
        order.lines.len(),
        order.total
    );

    // a price change afterwards does not touch the order
    catalog.update_item(
        SELLER,
        mug.id,
        ItemUpdate::new().set_price(Money::from_cents(1_500)),
    )?;
    let order = orders.update_status(SELLER, order.id, OrderStatus::Processing)?;
    println!(
        "order {} is {}, total still {}; mug stock {}",
        order.reference,
        order.status,
        order.total,
        catalog.item(mug.id)?.available
    );

    Ok(())
}
