pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod lock;
pub mod service;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;

pub use cart::{CartService, CartStore};
pub use config::{EngineConfig, StatusPolicy};
pub use error::{CartError, CatalogError, CheckoutError, OrderError, StoreError};
pub use inventory::InventoryStore;
pub use ledger::OrderLedger;
pub use service::{CatalogService, OrderService};
pub use transaction::{Commit, Store, Transaction, UnitOfWork};
