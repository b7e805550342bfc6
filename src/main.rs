use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Commands, ConfigCommands};
use logscale_query::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    // Dispatch to appropriate command handler
    match args.command {
        Commands::Version => {
            println!("logscale-query v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => commands::config::show(&args.config)?,
            ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        Commands::Query(query_args) => {
            let cfg = config::load_config(&args.config)?;
            init_tracing(&cfg.logging);
            commands::query::execute(&cfg, query_args).await?;
        }
        Commands::Variables(variables_args) => {
            let cfg = config::load_config(&args.config)?;
            init_tracing(&cfg.logging);
            commands::variables::execute(&cfg, variables_args).await?;
        }
        Commands::Annotate(annotate_args) => {
            let cfg = config::load_config(&args.config)?;
            init_tracing(&cfg.logging);
            commands::annotate::execute(&cfg, annotate_args).await?;
        }
    }

    Ok(())
}
