use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Pair: a pair-programming assistant for the terminal.
/// Starts an interactive session over the current project.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Do not send the project listing or pick project files automatically.
    #[arg(short = 'p', long = "no-project")]
    pub no_project: bool,

    /// Model to use; overrides Pair.toml and PAIR_MODEL.
    #[arg(long)]
    pub model: Option<String>,

    /// Files to start with. Images are sent as image messages, anything else is
    /// added to the project files.
    pub paths: Vec<PathBuf>,
}
