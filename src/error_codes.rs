//! Error code constants
//!
//! The front-end localizes errors by code, so every `ClientError` maps to one
//! of these strings.

/// Agent answered with an `{error}` body
pub const ERR_AGENT_REQUEST_FAILED: &str = "ERR_AGENT_REQUEST_FAILED";

/// Agent answered with a non-2xx status and no usable body
pub const ERR_AGENT_STATUS: &str = "ERR_AGENT_STATUS";

/// Transport-level HTTP failure (connection refused, timeout)
pub const ERR_HTTP_TRANSPORT: &str = "ERR_HTTP_TRANSPORT";

/// Payload could not be decoded
pub const ERR_DECODE_FAILED: &str = "ERR_DECODE_FAILED";

/// Local configuration file could not be read
pub const ERR_CONFIG_LOAD_FAILED: &str = "ERR_CONFIG_LOAD_FAILED";

/// Message sent while the live channel is not open
pub const ERR_CHANNEL_NOT_OPEN: &str = "ERR_CHANNEL_NOT_OPEN";

/// Live channel driver has stopped
pub const ERR_CHANNEL_CLOSED: &str = "ERR_CHANNEL_CLOSED";

/// WebSocket handshake or frame failure
pub const ERR_WEBSOCKET: &str = "ERR_WEBSOCKET";

/// Input rejected before reaching the agent
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
