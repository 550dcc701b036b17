//! helmctl cli interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Manifest file
    #[arg(short = 'f', long = "file", default_value = "helmctl.yaml", global(true))]
    pub file: PathBuf,

    /// Json schema replacing the embedded one
    #[arg(short = 's', long = "schema", global(true))]
    pub schema: Option<PathBuf>,

    /// Log at debug level unless HELMCTL_LOG says otherwise
    #[arg(long, global(true))]
    pub debug: bool,

    /// Dry run mode
    ///
    /// Unset environment variables referenced with !env resolve to an empty string.
    #[arg(long = "dry-run", global(true))]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the manifest and report whether it is valid
    Validate,

    /// Print resolved releases
    ///
    /// Without a target every environment and project is printed.
    Plan(PlanCommand),
}

#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Environment name
    #[arg(short = 'e', long, conflicts_with = "project")]
    pub environment: Option<String>,

    /// Project name
    #[arg(short = 'p', long)]
    pub project: Option<String>,

    /// Release name, requires --environment or --project
    #[arg(short = 'r', long)]
    pub release: Option<String>,

    /// Dump the loaded manifest first
    #[arg(long)]
    pub config: bool,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
