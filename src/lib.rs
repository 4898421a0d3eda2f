// Library exports for embedding and tests
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;
