//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sitepipe: asset pipeline and audit harness for a static site
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Source directory path (relative to project root)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: sitepipe.toml)
    #[arg(short = 'C', long, default_value = "sitepipe.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Deletes the output directory and runs the asset pipeline
    Build {
        /// Keep running and rebuild when source files change
        #[arg(short, long)]
        watch: bool,

        /// Development settings: skip minification and purging
        #[arg(long)]
        dev: bool,
    },

    /// Removes the output directory
    Clean,

    /// Serve the built site and audit each configured page
    Audit {
        /// Audit only these page paths instead of `[audit] pages`
        #[arg(long = "page")]
        pages: Vec<String>,
    },

    /// Serve a directory over HTTP on localhost
    Serve {
        /// The port to bind
        #[arg(short, long)]
        port: u16,

        /// Directory to serve (default: the output directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Fall back to the root `index.html` for unknown paths
        #[arg(long)]
        spa: bool,
    },
}

impl Cli {
    pub const fn is_dev(&self) -> bool {
        matches!(self.command, Commands::Build { dev: true, .. })
    }
}
