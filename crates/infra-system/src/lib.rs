// Scoreq Infrastructure - System Adapters
// Implements: ManagerTransport/WorkerTransport (tokio channels), ModelLoader (JSON artifact)

pub mod channel_transport;
pub mod model_loader;

pub use channel_transport::{channel_group, ChannelManagerTransport, ChannelWorkerTransport};
pub use model_loader::JsonModelLoader;
