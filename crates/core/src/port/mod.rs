// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod queue_store;
pub mod scorer;
pub mod time_provider;
pub mod transport;

// Re-exports
pub use id_provider::IdProvider;
pub use queue_store::{QueueStore, StoreResult};
pub use scorer::{ModelLoader, ModelState, Scorer};
pub use time_provider::TimeProvider;
pub use transport::{ManagerTransport, TransportResult, WorkerTransport};
