pub mod app;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod probe;
pub mod report;
pub mod session;
pub mod sink;
pub mod utils;
pub mod wait;
pub mod walker;
