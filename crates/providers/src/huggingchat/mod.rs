//! HuggingChat conversation streamer.
//!
//! A request is three calls on one session: create a conversation, send the
//! prompt (single JSON reply or an event stream of tokens), delete the
//! conversation.

pub mod client;
pub mod config;
pub mod conversation;
pub mod cookies;
pub mod session;
pub mod sse;
pub mod wire;

pub use client::HuggingChatClient;
pub use config::{HuggingChatConfig, RequestOptions, COOKIE_DOMAIN};
pub use cookies::CookieFile;
pub use session::normalize_proxy;
