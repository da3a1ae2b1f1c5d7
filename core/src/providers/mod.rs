pub mod factory;
pub mod openai;

pub use factory::create_provider;
pub use openai::{OPENAI_BASE_URL, OPENROUTER_BASE_URL, OpenAIProvider};
