//! Built-in LLM provider backends (spec.md §4.8).

mod http;
mod local;
mod openai_compatible;

pub use local::{LocalChatOptions, LocalChatProvider};
pub use openai_compatible::OpenAiCompatibleProvider;
