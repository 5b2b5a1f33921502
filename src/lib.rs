pub mod api;
pub mod app;
pub mod config;
pub mod constants;
pub mod errors;
pub mod managers;
pub mod mcp;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;
