use crate::{
    backend::JobBackend,
    models::{QueryJobResult, QueryTarget},
    query_job::{QueryJob, QueryJobOptions},
    range::TimeRange,
};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Runs the queries of one owner (panel, dashboard, CLI session) concurrently.
///
/// Slots are addressed by target position, so the query at position `i` keeps
/// its job across updates even when its text changes. Slots are created on
/// first use and never removed.
pub struct QueryJobManager {
    backend: Arc<dyn JobBackend>,
    options: Arc<QueryJobOptions>,
    slots: DashMap<usize, Arc<Mutex<QueryJob>>>,
}

impl QueryJobManager {
    pub fn new(backend: Arc<dyn JobBackend>, options: Arc<QueryJobOptions>) -> Self {
        Self {
            backend,
            options,
            slots: DashMap::new(),
        }
    }

    /// Execute every target; one result per target, in input order.
    ///
    /// A failing target never cancels its siblings.
    pub async fn update(
        &self,
        is_live: bool,
        range: &TimeRange,
        targets: &[QueryTarget],
    ) -> Vec<QueryJobResult> {
        let executions = targets.iter().enumerate().map(|(position, target)| {
            let slot = self.slot(position);
            async move {
                // One execution per slot at a time
                let mut job = slot.lock().await;
                job.execute(is_live, &target.repository, &target.query_text, range)
                    .await
            }
        });

        join_all(executions).await
    }

    /// Best-effort cancel of every job still held by a slot (live jobs between updates).
    ///
    /// Waits for in-flight executions of a slot to finish first.
    pub async fn cancel_jobs(&self) {
        let slots: Vec<_> = self.slots.iter().map(|slot| slot.value().clone()).collect();
        join_all(slots.iter().map(|slot| async move {
            slot.lock().await.cancel().await;
        }))
        .await;
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, position: usize) -> Arc<Mutex<QueryJob>> {
        self.slots
            .entry(position)
            .or_insert_with(|| {
                Arc::new(Mutex::new(QueryJob::new(
                    self.backend.clone(),
                    self.options.clone(),
                )))
            })
            .clone()
    }
}

/// Process-wide owner id → manager registry, constructed once and passed to callers.
pub struct ManagerRegistry {
    backend: Arc<dyn JobBackend>,
    options: Arc<QueryJobOptions>,
    managers: DashMap<String, Arc<QueryJobManager>>,
}

impl ManagerRegistry {
    pub fn new(backend: Arc<dyn JobBackend>, options: QueryJobOptions) -> Self {
        Self {
            backend,
            options: Arc::new(options),
            managers: DashMap::new(),
        }
    }

    /// Return the manager for `owner_id`, creating and registering it on first use
    pub fn get_or_create(&self, owner_id: &str) -> Arc<QueryJobManager> {
        if let Some(manager) = self.managers.get(owner_id) {
            return manager.clone();
        }

        self.managers
            .entry(owner_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(owner_id = owner_id, "Created query job manager");
                Arc::new(QueryJobManager::new(
                    self.backend.clone(),
                    self.options.clone(),
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}
