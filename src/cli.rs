use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logscale-query", version, about = "Run log queries as backend query jobs")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "logscale-query.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one or more queries and print the formatted result
    Query(QueryArgs),

    /// Run an annotation query and print annotation events
    Annotate(AnnotateArgs),

    /// Run a variable query and print the values of one field
    Variables(VariablesArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

/// Options shared by every command that runs a query
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Repository to search (defaults to query.default_repository)
    #[arg(short, long)]
    pub repository: Option<String>,

    /// Lower time bound, e.g. now-1h
    #[arg(long, default_value = "now-1h")]
    pub from: String,

    /// Upper time bound, e.g. now
    #[arg(long, default_value = "now")]
    pub to: String,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Keep the jobs live and re-poll them (requires --refresh)
    #[arg(long)]
    pub live: bool,

    /// Refresh interval in seconds; repeats the update until Ctrl-C
    #[arg(long)]
    pub refresh: Option<u64>,

    /// Owner id the queries are tracked under
    #[arg(long, default_value = "cli")]
    pub owner: String,

    /// Query strings, one target each
    #[arg(required = true)]
    pub queries: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AnnotateArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Annotation text, may reference event fields as {field}
    #[arg(short, long, default_value = "")]
    pub template: String,

    /// Field holding the region end timestamp
    #[arg(long)]
    pub time_end_field: Option<String>,

    /// Query string
    pub query: String,
}

#[derive(Args, Debug, Clone)]
pub struct VariablesArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Event field holding the variable values (dotted paths allowed)
    #[arg(short, long)]
    pub data_field: String,

    /// Query string
    pub query: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display current configuration (with secrets masked)
    Show,

    /// Validate configuration file
    Validate,
}
