pub mod config;
pub mod types;

pub use config::PoolgridConfig;
pub use types::*;
