//! CLI module for stormer
//!
//! Command-line parsing for the `stormer` binary. Uses clap for argument
//! parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stormer - grounded article research from the command line
///
/// Discovers research perspectives for a topic, simulates expert interviews
/// backed by web search, and writes a cited article.
#[derive(Parser, Debug)]
#[command(
    name = "stormer",
    version,
    about = "stormer - multi-perspective research and cited article drafting",
    long_about = "Discovers research perspectives for a topic, simulates expert interviews\n\
                  backed by web search, and writes an outline-driven article with citations.\n\n\
                  Configuration is read from ./stormer.toml or ~/.stormer/config.toml;\n\
                  API keys come from OPENROUTER_API_KEY and TAVILY_API_KEY.",
    after_help = "EXAMPLES:\n    \
                  stormer run \"2022 Winter Olympics\"              # Research and print Markdown\n    \
                  stormer run \"Curling\" -o curling.md --json c.json # Write Markdown and JSON\n    \
                  stormer run \"Curling\" --preflight               # Check services first\n    \
                  stormer check                                   # Check service connectivity\n    \
                  stormer config                                  # Show effective configuration"
)]
pub struct Cli {
    /// Path to the configuration file (default: ./stormer.toml, then ~/.stormer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a topic and write a cited article
    Run(RunArgs),

    /// Check connectivity to the language model and search services
    Check,

    /// Show the effective configuration (API keys redacted)
    Config,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Topic of the article
    pub topic: String,

    /// Write the article as Markdown to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the full article (with references and degradations) as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Number of perspectives to discover, excluding the baseline
    #[arg(long)]
    pub perspectives: Option<usize>,

    /// Maximum conversation rounds per perspective
    #[arg(long)]
    pub rounds: Option<usize>,

    /// References retrieved per section
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Whole-run timeout in seconds (0 disables it)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run the health checks first and abort if a service rejects its credentials
    #[arg(long)]
    pub preflight: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
