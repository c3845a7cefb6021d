pub mod prompt;
pub mod service;
pub mod types;

pub use service::ConversionService;
pub use types::*;
