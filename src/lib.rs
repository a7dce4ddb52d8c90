pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod platform;
pub mod query;
pub mod report;
pub mod scheduler;
pub mod store;
