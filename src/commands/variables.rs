use super::resolve_repository;
use crate::cli::VariablesArgs;
use anyhow::Result;
use logscale_query::{
    backend::HttpJobBackend,
    config::Config,
    formatter::format_variable_values,
    query_job::{QueryJob, QueryJobOptions},
    range::TimeRange,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Execute the variables command
///
/// Variable queries never run live, so a single query job is used without a manager.
pub async fn execute(cfg: &Config, args: VariablesArgs) -> Result<()> {
    let repository = resolve_repository(&args.range, cfg);
    let backend = Arc::new(HttpJobBackend::new(&cfg.backend)?);
    let mut job = QueryJob::new(backend, Arc::new(QueryJobOptions::from_config(&cfg.query)));

    let range = TimeRange::relative(args.range.from.as_str(), args.range.to.as_str());

    info!(
        repository = %repository,
        data_field = %args.data_field,
        "Running variable query"
    );

    let result = job.execute(false, &repository, &args.query, &range).await;
    if let Some(error) = result.error {
        return Err(error.into());
    }

    let values = format_variable_values(&result.events, &args.data_field)?;

    info!(count = values.len(), "Variable query completed");
    let entries: Vec<_> = values.iter().map(|text| json!({ "text": text })).collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);

    Ok(())
}
