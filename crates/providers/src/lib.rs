pub mod huggingchat;

pub use huggingchat::{HuggingChatClient, HuggingChatConfig};
