pub mod api;
pub mod commands;
pub mod config;
pub mod food;

// Re-export commonly used items
pub use config::ServerConfig;
pub use food::{FoodConfig, Pipeline, SelectionPolicy, Session};
