use super::resolve_repository;
use crate::cli::AnnotateArgs;
use anyhow::{anyhow, Result};
use logscale_query::{
    backend::HttpJobBackend,
    config::Config,
    formatter::format_annotation_query_response,
    manager::ManagerRegistry,
    models::QueryTarget,
    query_job::QueryJobOptions,
    range::TimeRange,
};
use std::sync::Arc;
use tracing::info;

const ANNOTATION_OWNER: &str = "annotations";

/// Execute the annotate command
///
/// Annotation queries always run as static jobs.
pub async fn execute(cfg: &Config, args: AnnotateArgs) -> Result<()> {
    let repository = resolve_repository(&args.range, cfg);
    let backend = Arc::new(HttpJobBackend::new(&cfg.backend)?);
    let registry = ManagerRegistry::new(backend, QueryJobOptions::from_config(&cfg.query));
    let manager = registry.get_or_create(ANNOTATION_OWNER);

    let targets = vec![QueryTarget::new("A", args.query.as_str(), repository.as_str())];
    let range = TimeRange::relative(args.range.from.as_str(), args.range.to.as_str());

    info!(repository = %repository, "Running annotation query");

    let result = manager
        .update(false, &range, &targets)
        .await
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("annotation query produced no result"))?;

    if let Some(error) = result.error {
        return Err(error.into());
    }

    let annotations = format_annotation_query_response(
        &result.events,
        &args.template,
        args.time_end_field.as_deref(),
    )?;

    info!(count = annotations.len(), "Annotation query completed");
    println!("{}", serde_json::to_string_pretty(&annotations)?);

    Ok(())
}
