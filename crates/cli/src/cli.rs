//! Command-line interface for watchman-watch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Watch a directory through the file watching daemon and print changes
#[derive(Debug, Parser)]
#[command(name = "watchman-watch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "WATCHMAN_WATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "WATCHMAN_WATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override daemon socket path
    #[arg(short, long, global = true, env = "WATCHMAN_SOCK")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List watched roots
    List,

    /// Watch a directory and print changes as they happen
    Watch {
        /// Directory to watch (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Subscription name
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Also print fresh-instance notifications
        #[arg(long)]
        show_fresh: bool,
    },
}
