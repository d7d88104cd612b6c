//! clientbridge-store — Customer persistence behind the `CustomerRepository` seam.
//!
//! Two implementations: SQLite (production) and in-memory (tests, tooling).
//! The matcher and HTTP layer only ever see the trait.

pub mod memory;
pub mod repo;
pub mod sqlite;

pub use memory::MemoryCustomerStore;
pub use repo::{CustomerRepository, NewCustomer, StoreError};
pub use sqlite::SqliteCustomerStore;
