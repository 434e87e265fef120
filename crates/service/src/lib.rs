// Scoreq Service - Composition Root
// Wires settings, queue store, transport and model loader into a process group.

pub mod group;
pub mod logging;
pub mod settings;
pub mod storage;

pub use group::{run_group, GroupReport};
pub use settings::{ServiceSettings, SettingsArgs, StorageBackend};
pub use storage::open_store;
