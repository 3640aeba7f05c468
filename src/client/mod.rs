//! Client module - OpenAI-compatible chat endpoints.

mod llm_client;
mod retry;
mod served;

pub use llm_client::*;
pub use retry::*;
pub use served::*;
