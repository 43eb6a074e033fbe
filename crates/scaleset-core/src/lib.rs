pub mod config;
pub mod types;

pub use config::ScaleSetConfig;
pub use types::*;
