pub mod citations;
pub mod gemini;
pub mod generate;
pub mod prompts;
pub mod provision;
pub mod session;
pub mod stores;
