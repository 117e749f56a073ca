#![allow(dead_code)]

use craftly_orders::storage::{MemoryBackend, SledBackend};
use craftly_orders::types::{Item, ItemDraft, Money, UserId};
use craftly_orders::{CatalogService, EngineConfig, Store, UnitOfWork};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a subscriber once per test binary; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Opens a sled database inside `dir`. Each test uses its own database since
/// sled holds a file lock on it.
pub fn open_store(dir: &Path, name: &str) -> anyhow::Result<Arc<Store<SledBackend>>> {
    let db = sled::open(dir.join(name))?;
    let db = Arc::new(db);
    db.clear()?;
    Ok(Arc::new(Store::new(SledBackend::new(db)?)))
}

pub fn memory_store() -> Arc<Store<MemoryBackend>> {
    Arc::new(Store::<MemoryBackend>::in_memory(&EngineConfig::default()))
}

pub fn list_item<U: UnitOfWork>(
    catalog: &CatalogService<U>,
    seller_id: UserId,
    title: &str,
    cents: u64,
    stock: u32,
) -> anyhow::Result<Item> {
    let draft = ItemDraft::new()
        .set_title(title)
        .set_price(Money::from_cents(cents))
        .set_stock(stock);
    Ok(catalog.create_item(seller_id, draft)?)
}
