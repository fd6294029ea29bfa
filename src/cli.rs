use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "flowlens")]
#[command(about = "Call-graph analysis for XAML-based RPA workflow projects")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Parse one workflow file and print its activity tree
    Parse {
        /// Workflow file to parse
        file: PathBuf,
    },

    /// Build the project call graph and write analysis artifacts
    Graph {
        /// Project root (defaults to the configured root)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory for artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List workflows transitively impacted by a change to one workflow
    Impact {
        /// Workflow path (relative to the project root) or workflow id
        workflow: String,

        /// Project root (defaults to the configured root)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Validate the project call graph (useful for CI)
    Validate {
        /// Project root (defaults to the configured root)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => engine.init(path).await,
            Commands::Parse { file } => engine.parse(file).await,
            Commands::Graph { source, output } => engine.graph(source, output).await,
            Commands::Impact { workflow, source } => engine.impact(source, workflow).await,
            Commands::Validate { source, strict } => engine.validate(source, strict).await,
        }
    }
}
