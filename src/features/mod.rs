//! Event-driven community features. Each module exposes plain async functions the gateway
//! handler delegates to; configuration comes from the settings API on every event.

pub mod ai_chat;
pub mod dynamic_voice;
pub mod member_count;
pub mod message_delete;
pub mod reaction_roles;
pub mod server_log;
pub mod web_search;
pub mod welcome;
