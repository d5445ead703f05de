//! Live task registry fed by the agent's `/status` WebSocket.

pub mod channel;
pub mod messages;
pub mod types;

pub use channel::{ChannelSnapshot, StatusChannel, TaskRegistry};
pub use messages::{ConfigCommand, Envelope, InboundMessage, OutboundMessage, TaskCommand};
pub use types::{EndpointInfo, ProcessStatus, SyncDirection, TaskConfig, TaskState, TaskStatus};
