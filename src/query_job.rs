//! Lifecycle of one logical query slot.
//!
//! A slot submits a job, polls it until the backend reports `done`, and keeps
//! the job handle around for live queries so the next execution can poll the
//! same job instead of starting a new one. Jobs that expire server-side (404)
//! are resubmitted a bounded number of times.

use crate::{
    backend::JobBackend,
    config::QueryConfig,
    error::{BackendError, JobError},
    metrics,
    models::{JobHandle, QueryDefinition, QueryJobResponse, QueryJobResult, TimeBound},
    range::{to_live_duration, TimeRange},
};
use std::sync::Arc;
use std::time::Duration;

/// Start bound used when the request carries no range at all
const DEFAULT_START: &str = "24h";

/// Engine-wide settings shared by every slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJobOptions {
    pub time_zone_offset_minutes: i32,
    /// Wait between polls when the backend does not send `pollAfter`
    pub default_poll_after: Duration,
    pub max_not_found_attempts: u32,
    /// Prefixed to every submitted query string
    pub query_marker: String,
}

impl Default for QueryJobOptions {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl QueryJobOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            time_zone_offset_minutes: config.resolved_time_zone_offset_minutes(),
            default_poll_after: Duration::from_millis(config.default_poll_after_ms),
            max_not_found_attempts: config.max_not_found_attempts,
            query_marker: config.query_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Submitting,
    Polling,
    Done,
    Failed,
}

/// What the slot remembers between executions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSlotState {
    pub handle: Option<JobHandle>,
    pub definition: Option<QueryDefinition>,
    pub repository: Option<String>,
    pub consecutive_not_found: u32,
}

impl JobSlotState {
    /// Drop the job, keep the last definition for comparison
    fn release_job(&mut self) {
        self.handle = None;
        self.repository = None;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct QueryJob {
    backend: Arc<dyn JobBackend>,
    options: Arc<QueryJobOptions>,
    state: JobSlotState,
    phase: JobPhase,
}

impl QueryJob {
    pub fn new(backend: Arc<dyn JobBackend>, options: Arc<QueryJobOptions>) -> Self {
        Self {
            backend,
            options,
            state: JobSlotState::default(),
            phase: JobPhase::Idle,
        }
    }

    pub fn state(&self) -> &JobSlotState {
        &self.state
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Run the query to completion. Failures are returned inside the result.
    pub async fn execute(
        &mut self,
        is_live: bool,
        repository: &str,
        query_text: &str,
        range: &TimeRange,
    ) -> QueryJobResult {
        if repository.trim().is_empty() {
            metrics::record_failure(JobError::NoRepositorySelected.kind());
            return QueryJobResult::failed(JobError::NoRepositorySelected);
        }

        let definition = self.build_definition(is_live, query_text, range);

        loop {
            let err = match self.run(repository, &definition).await {
                Ok(response) => {
                    self.phase = JobPhase::Done;
                    return QueryJobResult::completed(response);
                }
                Err(err) => err,
            };

            if err.is_not_found() {
                metrics::record_not_found(repository);
                self.state.consecutive_not_found += 1;
                let attempts = self.state.consecutive_not_found;

                if attempts < self.options.max_not_found_attempts {
                    tracing::warn!(
                        repository = repository,
                        attempt = attempts,
                        "Query job not found, it may have expired; submitting a new job"
                    );
                    self.state.handle = None;
                    continue;
                }

                tracing::error!(
                    repository = repository,
                    attempts = attempts,
                    "Query job not found repeatedly, giving up"
                );
                return self.fail(JobError::FailedToCreateQuery { attempts });
            }

            tracing::error!(
                repository = repository,
                status = ?err.status(),
                error = %err,
                "Query job failed"
            );
            return self.fail(JobError::from(&err));
        }
    }

    fn fail(&mut self, error: JobError) -> QueryJobResult {
        metrics::record_failure(error.kind());
        self.state.clear();
        self.phase = JobPhase::Failed;
        QueryJobResult::failed(error)
    }

    /// One pass of reuse-or-submit followed by polling
    async fn run(
        &mut self,
        repository: &str,
        definition: &QueryDefinition,
    ) -> Result<QueryJobResponse, BackendError> {
        if self.can_reuse(repository, definition) {
            tracing::debug!(
                repository = repository,
                job_id = ?self.state.handle,
                "Reusing live query job"
            );
        } else {
            self.cancel_current().await;
            self.submit(repository, definition).await?;
        }

        self.poll_until_done(repository, definition.is_live).await
    }

    fn can_reuse(&self, repository: &str, definition: &QueryDefinition) -> bool {
        if self.state.handle.is_none() || !definition.is_live {
            return false;
        }
        let same_definition = self
            .state
            .definition
            .as_ref()
            .is_some_and(|stored| stored.same_job_as(definition));
        let same_repository = self.state.repository.as_deref() == Some(repository);

        same_definition && same_repository
    }

    /// Cancel the job held by this slot, if any, and reset the slot
    pub async fn cancel(&mut self) {
        self.cancel_current().await;
        self.state.clear();
        self.phase = JobPhase::Idle;
    }

    /// Best-effort cancel of the job currently held by this slot
    async fn cancel_current(&mut self) {
        let Some(handle) = self.state.handle.take() else {
            return;
        };
        let Some(repository) = self.state.repository.take() else {
            return;
        };

        metrics::record_cancel(&repository);
        if let Err(e) = self.backend.delete_job(&repository, &handle).await {
            tracing::warn!(
                repository = %repository,
                job_id = %handle,
                error = %e,
                "Failed to cancel stale query job"
            );
        } else {
            tracing::debug!(repository = %repository, job_id = %handle, "Cancelled stale query job");
        }
    }

    async fn submit(
        &mut self,
        repository: &str,
        definition: &QueryDefinition,
    ) -> Result<(), BackendError> {
        self.phase = JobPhase::Submitting;
        self.state.repository = Some(repository.to_string());
        self.state.definition = Some(definition.clone());

        let handle = self.backend.create_job(repository, definition).await?;
        metrics::record_submit(repository, definition.is_live);
        tracing::info!(
            repository = repository,
            job_id = %handle,
            live = definition.is_live,
            "Submitted query job"
        );

        self.state.handle = Some(handle);
        Ok(())
    }

    /// Poll sequentially until done; waits as long as the backend keeps the job running.
    async fn poll_until_done(
        &mut self,
        repository: &str,
        is_live: bool,
    ) -> Result<QueryJobResponse, BackendError> {
        let Some(handle) = self.state.handle.clone() else {
            return Err(BackendError::NotFound);
        };
        self.phase = JobPhase::Polling;

        loop {
            let response = self.backend.poll_job(repository, &handle).await?;
            metrics::record_poll(repository, response.done);

            if response.done {
                if !is_live {
                    self.state.release_job();
                }
                self.state.consecutive_not_found = 0;
                tracing::debug!(
                    repository = repository,
                    job_id = %handle,
                    events = response.events.len(),
                    "Query job done"
                );
                return Ok(response);
            }

            let wait = response
                .metadata()
                .poll_after_ms
                .map(Duration::from_millis)
                .unwrap_or(self.options.default_poll_after);
            tracing::trace!(job_id = %handle, wait_ms = wait.as_millis() as u64, "Query job not done yet");
            tokio::time::sleep(wait).await;
        }
    }

    fn build_definition(&self, is_live: bool, query_text: &str, range: &TimeRange) -> QueryDefinition {
        let query_string = if self.options.query_marker.is_empty() {
            query_text.to_string()
        } else {
            format!("{} {}", self.options.query_marker, query_text)
        };

        let live_start = if is_live { live_start(range) } else { None };
        if is_live && live_start.is_none() {
            tracing::debug!(range = ?range, "Range cannot run live, using a static query");
        }

        let (start, end, is_live) = match live_start {
            Some(start) => (TimeBound::Relative(start), None, true),
            None => {
                let (start, end) = static_bounds(range);
                (start, end, false)
            }
        };

        QueryDefinition {
            query_string,
            time_zone_offset_minutes: self.options.time_zone_offset_minutes,
            show_event_distribution: false,
            is_live,
            start,
            end,
        }
    }
}

/// Live start duration, or `None` if the range must run statically
fn live_start(range: &TimeRange) -> Option<String> {
    let raw = range.raw.as_ref()?;
    if raw.to != "now" {
        return None;
    }
    to_live_duration(&raw.from).ok()
}

fn static_bounds(range: &TimeRange) -> (TimeBound, Option<TimeBound>) {
    if let Some(abs) = range.absolute {
        return (TimeBound::Epoch(abs.from_ms), Some(TimeBound::Epoch(abs.to_ms)));
    }

    match &range.raw {
        Some(raw) if raw.to == "now" => {
            let start = if raw.from.starts_with("now") {
                to_live_duration(&raw.from).unwrap_or_else(|_| raw.from.clone())
            } else {
                raw.from.clone()
            };
            (TimeBound::Relative(start), Some(TimeBound::relative("now")))
        }
        Some(raw) => (
            TimeBound::Relative(raw.from.clone()),
            Some(TimeBound::Relative(raw.to.clone())),
        ),
        None => (TimeBound::relative(DEFAULT_START), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{count_event, FakeBackend, Reply};

    fn create_test_job(backend: &Arc<FakeBackend>) -> QueryJob {
        let options = QueryJobOptions {
            time_zone_offset_minutes: 0,
            default_poll_after: Duration::from_millis(0),
            max_not_found_attempts: 3,
            query_marker: "/** test */".to_string(),
        };
        QueryJob::new(backend.clone(), Arc::new(options))
    }

    fn last_hour() -> TimeRange {
        TimeRange::relative("now-1h", "now")
    }

    #[tokio::test]
    async fn test_missing_repository_is_precondition_failure() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        let result = job.execute(false, "", "count()", &last_hour()).await;

        assert_eq!(result.error, Some(JobError::NoRepositorySelected));
        assert!(result.events.is_empty());
        assert_eq!(backend.creates(), 0);
        assert_eq!(backend.polls(), 0);
        assert_eq!(job.state().consecutive_not_found, 0);
        assert_eq!(job.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_returns_data_on_first_poll() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        let result = job.execute(false, "test", "count()", &last_hour()).await;

        assert!(result.error.is_none());
        assert_eq!(result.events, vec![count_event("0")]);
        assert!(result.metadata.unwrap().done);
        assert_eq!(backend.creates(), 1);
        assert_eq!(backend.polls(), 1);
        assert_eq!(job.phase(), JobPhase::Done);
    }

    #[tokio::test]
    async fn test_keeps_polling_until_done() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::Running, Reply::Running, Reply::Done]);
        let mut job = create_test_job(&backend);

        let result = job.execute(false, "test", "count()", &last_hour()).await;

        assert!(result.error.is_none());
        assert_eq!(backend.creates(), 1);
        assert_eq!(backend.polls(), 3);
    }

    #[tokio::test]
    async fn test_live_job_is_reused_when_unchanged() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        assert!(job.state().handle.is_some());
        let result = job.execute(true, "test", "count()", &last_hour()).await;

        assert!(result.error.is_none());
        assert!(job.state().handle.is_some());
        assert_eq!(backend.creates(), 1);
        assert_eq!(backend.polls(), 2);
        assert_eq!(backend.deletes(), 0);
    }

    #[tokio::test]
    async fn test_live_job_is_replaced_when_query_changes() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        job.execute(true, "test", "* | count()", &last_hour()).await;

        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.polls(), 2);
        assert_eq!(backend.deletes(), 1);
        assert_eq!(backend.deleted.lock().unwrap()[0].1, JobHandle::new("job-0"));
    }

    #[tokio::test]
    async fn test_live_job_is_replaced_when_repository_changes() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        job.execute(true, "anotherRepo", "count()", &last_hour()).await;

        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.polls(), 2);
        // The stale job is cancelled where it was created
        let deleted = backend.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0, "test");
        assert_eq!(job.state().repository.as_deref(), Some("anotherRepo"));
    }

    #[tokio::test]
    async fn test_live_job_is_replaced_when_range_changes() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        job.execute(true, "test", "count()", &TimeRange::relative("now-6M", "now"))
            .await;

        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.deletes(), 1);
        assert_eq!(backend.last_definition().start, TimeBound::relative("6mon"));
    }

    #[tokio::test]
    async fn test_static_job_is_never_reused() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(false, "test", "count()", &last_hour()).await;
        assert!(job.state().handle.is_none());
        job.execute(false, "test", "count()", &last_hour()).await;

        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.polls(), 2);
        assert_eq!(backend.deletes(), 0);
    }

    #[tokio::test]
    async fn test_failed_cancel_does_not_block_resubmit() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_deletes([Reply::Status(500, "boom")]);
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        let result = job.execute(true, "test", "groupBy(host)", &last_hour()).await;

        assert!(result.error.is_none());
        assert_eq!(backend.deletes(), 1);
        assert_eq!(backend.creates(), 2);
    }

    #[tokio::test]
    async fn test_ineligible_live_range_downgrades_to_static() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        let result = job
            .execute(true, "test", "count()", &TimeRange::relative("now-1d/d", "now"))
            .await;

        assert!(result.error.is_none());
        let def = backend.last_definition();
        assert!(!def.is_live);
        assert_eq!(def.start, TimeBound::relative("now-1d/d"));
        assert_eq!(def.end, Some(TimeBound::relative("now")));
        assert!(job.state().handle.is_none());
    }

    #[tokio::test]
    async fn test_live_definition_has_duration_start_and_no_end() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;

        let def = backend.last_definition();
        assert!(def.is_live);
        assert_eq!(def.query_string, "/** test */ count()");
        assert_eq!(def.start, TimeBound::relative("1h"));
        assert_eq!(def.end, None);
    }

    #[tokio::test]
    async fn test_static_definition_prefers_absolute_range() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        let range = TimeRange::relative("now-1h", "now").with_absolute(1000, 2000);
        job.execute(false, "test", "count()", &range).await;

        let def = backend.last_definition();
        assert_eq!(def.start, TimeBound::Epoch(1000));
        assert_eq!(def.end, Some(TimeBound::Epoch(2000)));
    }

    #[tokio::test]
    async fn test_static_definition_without_range_uses_default_start() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(false, "test", "count()", &TimeRange::default()).await;

        let def = backend.last_definition();
        assert_eq!(def.start, TimeBound::relative("24h"));
        assert_eq!(def.end, None);
    }

    #[tokio::test]
    async fn test_not_found_resubmits_then_succeeds() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::NotFound, Reply::Done]);
        let mut job = create_test_job(&backend);

        let result = job.execute(false, "test", "count()", &last_hour()).await;

        assert!(result.error.is_none());
        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.polls(), 2);
        assert_eq!(job.state().consecutive_not_found, 0);
    }

    #[tokio::test]
    async fn test_not_found_gives_up_after_three_attempts() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::NotFound, Reply::NotFound, Reply::NotFound]);
        let mut job = create_test_job(&backend);

        let result = job.execute(true, "test", "count()", &last_hour()).await;

        assert_eq!(result.error, Some(JobError::FailedToCreateQuery { attempts: 3 }));
        assert!(result.events.is_empty());
        assert_eq!(backend.creates(), 3);
        assert_eq!(backend.polls(), 3);
        assert_eq!(job.state(), &JobSlotState::default());
        assert_eq!(job.phase(), JobPhase::Failed);

        // Next call starts fresh
        let result = job.execute(true, "test", "count()", &last_hour()).await;
        assert!(result.error.is_none());
        assert_eq!(backend.creates(), 4);
        assert_eq!(backend.deletes(), 0);
    }

    #[tokio::test]
    async fn test_not_found_on_submit_counts_towards_limit() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_creates([Reply::NotFound, Reply::NotFound, Reply::NotFound]);
        let mut job = create_test_job(&backend);

        let result = job.execute(false, "missing", "count()", &last_hour()).await;

        assert_eq!(result.error, Some(JobError::FailedToCreateQuery { attempts: 3 }));
        assert_eq!(backend.creates(), 3);
        assert_eq!(backend.polls(), 0);
        assert_eq!(job.state(), &JobSlotState::default());
    }

    #[tokio::test]
    async fn test_server_poll_after_overrides_default_wait() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::Running, Reply::Running, Reply::Done]);
        let options = QueryJobOptions {
            default_poll_after: Duration::from_secs(3600),
            ..QueryJobOptions::default()
        };
        let mut job = QueryJob::new(backend.clone(), Arc::new(options));

        // The fake backend answers with pollAfter = 0
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            job.execute(false, "test", "count()", &last_hour()),
        )
        .await
        .expect("poll loop should follow the server's pollAfter");

        assert!(result.error.is_none());
        assert_eq!(backend.polls(), 3);
    }

    #[tokio::test]
    async fn test_expired_live_job_is_resubmitted_without_cancel() {
        let backend = Arc::new(FakeBackend::new());
        let mut job = create_test_job(&backend);

        job.execute(true, "test", "count()", &last_hour()).await;
        backend.script_polls([Reply::NotFound]);
        let result = job.execute(true, "test", "count()", &last_hour()).await;

        assert!(result.error.is_none());
        assert_eq!(backend.creates(), 2);
        assert_eq!(backend.polls(), 3);
        assert_eq!(backend.deletes(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_are_terminal() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::Status(400, "Bad Request Data")]);
        let mut job = create_test_job(&backend);

        let result = job.execute(true, "test", "count(", &last_hour()).await;

        assert_eq!(
            result.error,
            Some(JobError::QueryError {
                status: Some(400),
                message: "Bad Request Data".to_string(),
            })
        );
        assert!(result.events.is_empty());
        assert_eq!(backend.creates(), 1);
        assert_eq!(job.state(), &JobSlotState::default());
    }

    #[tokio::test]
    async fn test_terminal_error_resets_not_found_count() {
        let backend = Arc::new(FakeBackend::new());
        backend.script_polls([Reply::NotFound, Reply::Status(400, "bad")]);
        let mut job = create_test_job(&backend);

        job.execute(false, "test", "count()", &last_hour()).await;

        assert_eq!(job.state().consecutive_not_found, 0);
    }
}
