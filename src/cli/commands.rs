use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plant-doctor", version, about = "Plant disease diagnosis server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket server
    Serve,

    /// Diagnose a local image once and print the result as JSON
    Diagnose {
        #[arg(short, long)]
        image: PathBuf,
        /// Observed symptoms; a generic description is used when omitted
        #[arg(short, long)]
        symptoms: Option<String>,
    },

    /// Diagnose a local image, then chat about it in the terminal
    Chat {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        symptoms: Option<String>,
    },
}
