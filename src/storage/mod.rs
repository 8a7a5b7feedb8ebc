//! Decision Store
//!
//! Persistence for process samples and decisions behind the [`DecisionStore`]
//! trait:
//! - `PgDecisionStore`: PostgreSQL/TimescaleDB, one connection per operation
//! - `InMemoryStore`: tests and `--store memory` runs

mod memory;
mod postgres;
pub mod schema;
mod store;

pub use memory::InMemoryStore;
pub use postgres::PgDecisionStore;
pub use store::{DecisionStore, StoreCounts, StoreError};
