pub mod api;
pub mod callback;
pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod surface;
pub mod transaction;
