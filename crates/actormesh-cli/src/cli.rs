//! Clap CLI definitions for actormesh.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// actormesh: offline diagnostics for the actor mesh wire protocol.
#[derive(Parser)]
#[command(name = "actormesh", version, about = "Diagnostics for the actormesh wire protocol")]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a captured byte stream frame by frame.
    Inspect {
        /// File holding the raw bytes of one direction of a connection.
        file: PathBuf,
        /// Print payloads as hex.
        #[arg(long)]
        hex: bool,
        /// Print one JSON object per frame.
        #[arg(long)]
        json: bool,
        /// Largest accepted payload (defaults to the configured value).
        #[arg(long)]
        max_frame_size: Option<u32>,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}
