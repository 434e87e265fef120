// Scoreq Infrastructure - JSON Snapshot Adapter
// Implements: QueueStore over a single durable file

mod json_store;

pub use json_store::JsonFileQueueStore;
