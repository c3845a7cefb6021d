pub mod interface;
pub mod openai_client;

#[cfg(test)]
pub mod mock;

pub use interface::*;
pub use openai_client::OpenAIClient;
