//! # HTTP Request Handlers
//!
//! The REST surface around the WebSocket protocol: the status page, runtime
//! configuration, artifact listings, and the chat-session control command.

pub mod chat;
pub mod config;
pub mod status;

pub use chat::end_chat;
pub use config::{get_config, update_config};
pub use status::{index, list_files};
