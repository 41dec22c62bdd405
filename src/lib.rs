// Library entry point for photofeed
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;
