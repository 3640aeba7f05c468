//! Query module - downstream prompt rendering and the downstream model seam.

mod downstream;
mod prompt;

pub use downstream::DownstreamModel;
pub use prompt::{PromptTemplate, build_query, render_prompt};
