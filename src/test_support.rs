//! Scripted in-memory `JobBackend` used by unit tests.

use crate::backend::JobBackend;
use crate::error::BackendError;
use crate::models::{JobHandle, QueryDefinition, QueryJobResponse, RawEvent};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted backend answer
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Done,
    Running,
    NotFound,
    Status(u16, &'static str),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    next_id: AtomicUsize,
    create_script: Mutex<VecDeque<Reply>>,
    poll_script: Mutex<VecDeque<Reply>>,
    delete_script: Mutex<VecDeque<Reply>>,
    pub submitted: Mutex<Vec<(String, QueryDefinition)>>,
    pub polled: Mutex<Vec<(String, JobHandle)>>,
    pub deleted: Mutex<Vec<(String, JobHandle)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_polls(&self, replies: impl IntoIterator<Item = Reply>) {
        self.poll_script.lock().unwrap().extend(replies);
    }

    pub fn script_creates(&self, replies: impl IntoIterator<Item = Reply>) {
        self.create_script.lock().unwrap().extend(replies);
    }

    pub fn script_deletes(&self, replies: impl IntoIterator<Item = Reply>) {
        self.delete_script.lock().unwrap().extend(replies);
    }

    /// Every create attempt, including scripted failures
    pub fn creates(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn polls(&self) -> usize {
        self.polled.lock().unwrap().len()
    }

    pub fn deletes(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }

    pub fn last_definition(&self) -> QueryDefinition {
        self.submitted.lock().unwrap().last().unwrap().1.clone()
    }

    fn error_for(reply: &Reply) -> Option<BackendError> {
        match reply {
            Reply::NotFound => Some(BackendError::NotFound),
            Reply::Status(status, message) => Some(BackendError::Status {
                status: *status,
                message: message.to_string(),
            }),
            Reply::Done | Reply::Running => None,
        }
    }
}

pub(crate) fn count_event(value: &str) -> RawEvent {
    let mut event = RawEvent::new();
    event.insert("_count".to_string(), json!(value));
    event
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn create_job(
        &self,
        repository: &str,
        definition: &QueryDefinition,
    ) -> Result<JobHandle, BackendError> {
        self.submitted
            .lock()
            .unwrap()
            .push((repository.to_string(), definition.clone()));
        let reply = self.create_script.lock().unwrap().pop_front();
        if let Some(err) = reply.as_ref().and_then(Self::error_for) {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(JobHandle::new(format!("job-{}", id)))
    }

    async fn poll_job(
        &self,
        repository: &str,
        handle: &JobHandle,
    ) -> Result<QueryJobResponse, BackendError> {
        self.polled
            .lock()
            .unwrap()
            .push((repository.to_string(), handle.clone()));
        let reply = self.poll_script.lock().unwrap().pop_front().unwrap_or(Reply::Done);
        if let Some(err) = Self::error_for(&reply) {
            return Err(err);
        }

        let mut response = QueryJobResponse {
            done: matches!(reply, Reply::Done),
            events: vec![count_event("0")],
            ..Default::default()
        };
        response.meta_data.poll_after = Some(0);
        Ok(response)
    }

    async fn delete_job(&self, repository: &str, handle: &JobHandle) -> Result<(), BackendError> {
        self.deleted
            .lock()
            .unwrap()
            .push((repository.to_string(), handle.clone()));
        let reply = self.delete_script.lock().unwrap().pop_front();
        match reply.as_ref().and_then(Self::error_for) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
