use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::{Engine, ProjectionMode};

#[derive(Parser)]
#[command(name = "codelens")]
#[command(about = "Structural extraction, class diagrams and call flows for mixed-language codebases")]
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
    /// Write a default codelens.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Extract the entity graph and print it as JSON
    Parse {
        /// Files or directories to analyze (defaults to configured source dirs)
        paths: Vec<PathBuf>,

        /// Write JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate Markdown documentation
    Generate {
        /// Source directory to analyze
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory for documentation
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a Mermaid diagram
    Diagram {
        /// Files or directories to analyze (defaults to configured source dirs)
        paths: Vec<PathBuf>,

        /// Diagram kind
        #[arg(short, long, value_enum, default_value_t = DiagramMode::Class)]
        mode: DiagramMode,

        /// Entity id to center the diagram on, e.g. `Type::Game.Player`
        #[arg(short, long)]
        root: Option<String>,

        /// Maximum traversal depth from the root
        #[arg(short, long)]
        depth: Option<usize>,

        /// Write Mermaid text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DiagramMode {
    Class,
    CallFlow,
}

impl From<DiagramMode> for ProjectionMode {
    fn from(mode: DiagramMode) -> Self {
        match mode {
            DiagramMode::Class => ProjectionMode::ClassDiagram,
            DiagramMode::CallFlow => ProjectionMode::CallFlow,
        }
    }
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path, force } => engine.init(path, force).await,
            Commands::Parse { paths, output } => engine.parse(paths, output).await,
            Commands::Generate { source, output } => engine.generate(source, output).await,
            Commands::Diagram { paths, mode, root, depth, output } => {
                engine.diagram(paths, mode.into(), root, depth, output).await
            }
        }
    }
}
