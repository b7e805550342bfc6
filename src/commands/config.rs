use anyhow::Result;
use colored::Colorize;
use logscale_query::{
    config::{self, Config},
    logging::mask_secret,
};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the current configuration with the backend token masked
pub fn show(path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!(path = %path.display(), "Loading configuration for display");

    let cfg = config::load_config(path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!(path = %path.display(), "Validating configuration file");

    let cfg = config::load_config(path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Backend: {}", cfg.backend.base_url);
    println!(
        "  Default Repository: {}",
        cfg.query.default_repository.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Time Zone Offset: {} min",
        cfg.query.resolved_time_zone_offset_minutes()
    );
    println!("  Not-Found Attempts: {}", cfg.query.max_not_found_attempts);

    Ok(())
}

fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.backend.token = mask_secret(&sanitized.backend.token);
    sanitized
}
