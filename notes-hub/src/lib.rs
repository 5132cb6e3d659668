pub mod api;
pub mod config;
pub mod user_agent;
