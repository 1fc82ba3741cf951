//! Command-line front end
//!
//! Only available with the "cli" feature.

mod config;
mod inputs;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliBackground, CliExecutionProvider, CliOutputFormat};
