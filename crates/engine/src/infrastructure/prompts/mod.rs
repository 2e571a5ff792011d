//! GM prompt assembly.

mod builder;
mod store;

pub use builder::{build_system_prompt, default_sections};
pub use store::{PromptSection, PromptStore};
