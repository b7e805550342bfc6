use metrics::{counter, describe_counter};

/// Register metric descriptions (safe to call more than once)
pub fn init_metric_descriptions() {
    describe_counter!(
        "logscale_query_jobs_submitted_total",
        "Total number of query jobs submitted to the backend"
    );
    describe_counter!(
        "logscale_query_polls_total",
        "Total number of query job polls"
    );
    describe_counter!(
        "logscale_query_jobs_cancelled_total",
        "Total number of stale query jobs cancelled"
    );
    describe_counter!(
        "logscale_query_not_found_total",
        "Total number of not-found responses for query jobs"
    );
    describe_counter!(
        "logscale_query_failures_total",
        "Total number of terminal query job failures"
    );
}

pub fn record_submit(repository: &str, is_live: bool) {
    counter!(
        "logscale_query_jobs_submitted_total",
        "repository" => repository.to_string(),
        "live" => is_live.to_string(),
    )
    .increment(1);
}

pub fn record_poll(repository: &str, done: bool) {
    counter!(
        "logscale_query_polls_total",
        "repository" => repository.to_string(),
        "done" => done.to_string(),
    )
    .increment(1);
}

pub fn record_cancel(repository: &str) {
    counter!(
        "logscale_query_jobs_cancelled_total",
        "repository" => repository.to_string(),
    )
    .increment(1);
}

pub fn record_not_found(repository: &str) {
    counter!(
        "logscale_query_not_found_total",
        "repository" => repository.to_string(),
    )
    .increment(1);
}

pub fn record_failure(kind: &str) {
    counter!("logscale_query_failures_total", "kind" => kind.to_string()).increment(1);
}
