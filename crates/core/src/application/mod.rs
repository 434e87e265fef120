// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod dispatch;
pub mod queue_client;
pub mod shutdown;
pub mod worker;

// Re-exports
pub use dispatch::{CycleReport, DispatchConfig, DispatchManager, ManagerPhase};
pub use queue_client::QueueClient;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use worker::{score_request, Worker, WorkerSummary};
