pub mod broker;
pub mod channels;
pub mod error;
pub mod memory;
pub mod message;
pub mod pubsub;
pub mod traits;
pub mod transport;

pub use broker::{ChannelStats, EventBroker, RelayEndpoints};
pub use error::RelayError;
pub use memory::{MemoryBus, MemorySubscriber};
pub use message::Message;
pub use pubsub::{Attach, ZmqPublisher, ZmqSubscriber};
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
