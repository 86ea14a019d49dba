//! Command line interface

use clap::Parser;
use std::path::PathBuf;

/// Creates a socket server and transmits random WITS data from time to time.
/// Only ONE client may be connected at a time.
#[derive(Parser, Debug, Clone)]
#[command(name = "wits-daemon", version)]
#[command(about = "Serve synthetic WITS0 records to a single TCP client")]
pub struct Cli {
    /// The port to run the socket server on
    #[arg(allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// The interval, in milliseconds, between two transmissions
    #[arg(allow_negative_numbers = true)]
    pub frequency: Option<i64>,

    /// The number of records in each transmission (1-99)
    #[arg(allow_negative_numbers = true)]
    pub records: Option<i64>,

    /// The number of items in each record (1-99)
    #[arg(allow_negative_numbers = true)]
    pub items: Option<i64>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
