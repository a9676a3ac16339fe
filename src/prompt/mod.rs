//! Text-processing nodes
//!
//! Pure string transforms:
//! - description to comma-separated prompt
//! - emphasis and negative-prompt enhancement
//! - manual / image-to-prompt selection

pub mod description;
pub mod enhancer;
pub mod selector;

pub use description::{DescriptionOptions, Style, description_to_prompt, extract_keywords};
pub use enhancer::{EnhancedPrompt, Emphasis, enhance};
pub use selector::{PromptMode, select_prompt};
