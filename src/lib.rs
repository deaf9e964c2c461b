pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod relay;
pub mod store;
pub mod upstream;

#[cfg(test)]
pub mod testing;
