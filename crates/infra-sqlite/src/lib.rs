// Scoreq Infrastructure - SQLite Adapter
// Implements: QueueStore with atomic per-operation statements (safe across processes)

mod connection;
mod migration;
mod queue_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue_store::SqliteQueueStore;
