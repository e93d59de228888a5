// Library root; exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod db;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod subscription;

// Only the binary needs these, but the CLI type is part of `Config::with_cli`.
pub mod cli;
pub mod config;
pub mod logging;
