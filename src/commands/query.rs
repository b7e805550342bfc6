use super::resolve_repository;
use crate::cli::QueryArgs;
use anyhow::Result;
use colored::Colorize;
use logscale_query::{
    backend::HttpJobBackend,
    config::Config,
    formatter::format_query_responses,
    manager::{ManagerRegistry, QueryJobManager},
    models::QueryTarget,
    query_job::QueryJobOptions,
    range::{range_is_live, TimeRange},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute the query command
///
/// Runs every query once, or repeatedly every `--refresh` seconds until Ctrl-C.
pub async fn execute(cfg: &Config, args: QueryArgs) -> Result<()> {
    let repository = resolve_repository(&args.range, cfg);
    let backend = Arc::new(HttpJobBackend::new(&cfg.backend)?);
    let registry = ManagerRegistry::new(backend, QueryJobOptions::from_config(&cfg.query));
    let manager = registry.get_or_create(&args.owner);

    let targets = build_targets(&args.queries, &repository);
    let range = TimeRange::relative(args.range.from.as_str(), args.range.to.as_str());
    let is_live = range_is_live(args.live && args.refresh.is_some(), &range);

    if args.live && !is_live {
        warn!(
            from = %args.range.from,
            to = %args.range.to,
            "Live queries need --refresh and a range ending at now, running static queries"
        );
    }

    info!(
        repository = %repository,
        targets = targets.len(),
        is_live = is_live,
        "Running queries"
    );

    let Some(refresh_secs) = args.refresh else {
        return run_update(&manager, is_live, &range, &targets).await;
    };

    let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping refresh");
                break;
            }
            result = async {
                interval.tick().await;
                run_update(&manager, is_live, &range, &targets).await
            } => result?,
        }
    }

    // An interrupted update drops its executions. A job whose submit request was
    // in flight at that point has no stored handle and is left to expire server-side.
    manager.cancel_jobs().await;
    info!("Cancelled remaining query jobs");

    Ok(())
}

async fn run_update(
    manager: &QueryJobManager,
    is_live: bool,
    range: &TimeRange,
    targets: &[QueryTarget],
) -> Result<()> {
    let results = manager.update(is_live, range, targets).await;
    let formatted = format_query_responses(&results, targets);

    println!("{}", serde_json::to_string_pretty(&formatted)?);
    if let Some(error) = &formatted.error {
        eprintln!("{} {}", "✗".red(), error.to_string().red());
    }

    Ok(())
}

/// One target per query string, with ref ids A, B, C, ...
fn build_targets(queries: &[String], repository: &str) -> Vec<QueryTarget> {
    queries
        .iter()
        .enumerate()
        .map(|(index, query)| QueryTarget::new(ref_id(index), query.as_str(), repository))
        .collect()
}

fn ref_id(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => format!("Q{}", index + 1),
    }
}
