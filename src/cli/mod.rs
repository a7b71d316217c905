//! CLI for the employee cache service

pub mod serve;

use clap::{Parser, Subcommand};

/// Employee cache service - read-through caching in front of a record store
#[derive(Parser)]
#[command(name = "employee-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
}
