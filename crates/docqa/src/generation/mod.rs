//! Context assembly, prompting and answer generation

mod answer;
mod prompt;

pub use answer::Answerer;
pub use prompt::PromptBuilder;
