pub mod cli;
pub mod config;
pub mod report;
pub mod server;

pub use config::{ConfigError, Settings};
pub use server::{create_router, AppState};
