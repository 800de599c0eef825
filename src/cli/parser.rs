//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// noteforge: clinical note template compiler.
///
/// Compiles a declarative note template against a source record: derives
/// the AI/non-AI schemas, resolves deterministic data, fills the AI slots
/// via a schema-constrained LLM call (or a mock), and renders HTML + CSS.
#[derive(Parser, Debug)]
#[command(name = "noteforge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a template into a rendered document.
    Compile {
        /// Path to the template JSON file.
        template: PathBuf,

        /// Path to the source record JSON file.
        source: PathBuf,

        /// Optional design tokens JSON file.
        #[arg(long)]
        tokens: Option<PathBuf>,

        /// Optional fact pack JSON file.
        #[arg(long)]
        fact_pack: Option<PathBuf>,

        /// Write the rendered HTML here (stylesheets land alongside).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the LLM call and fabricate a schema-conformant payload.
        #[arg(long)]
        mock: bool,

        /// API key for the LLM provider.
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Model identifier.
        #[arg(long)]
        model: Option<String>,

        /// Output token budget.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Transport retry budget.
        #[arg(long)]
        retries: Option<u32>,

        /// Halt on any stage warning.
        #[arg(long)]
        strict: bool,
    },

    /// Derive and print the AI, non-AI, and render payload schemas.
    Schemas {
        /// Path to the template JSON file.
        template: PathBuf,
    },

    /// Compose and lint the prompt without calling the LLM.
    Prompt {
        /// Path to the template JSON file.
        template: PathBuf,

        /// Path to the source record JSON file.
        source: PathBuf,

        /// Optional fact pack JSON file.
        #[arg(long)]
        fact_pack: Option<PathBuf>,
    },
}
