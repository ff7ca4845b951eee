//! In-process registry of ingestion jobs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use docrag_core::error::{Error, Result};

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub document: String,
    pub status: JobStatus,
    pub chunk_count: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Finished jobs kept by default before the oldest are dropped.
pub const DEFAULT_FINISHED_RETENTION: usize = 1000;

#[derive(Debug, Default)]
struct Jobs {
    records: HashMap<JobId, JobRecord>,
    /// Finished job ids, oldest first.
    finished: VecDeque<JobId>,
}

#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<Jobs>,
    max_finished: usize,
}

impl Default for JobRegistry {
    fn default() -> Self { Self::with_retention(DEFAULT_FINISHED_RETENTION) }
}

impl JobRegistry {
    pub fn new() -> Self { Self::default() }

    /// Keeps at most `max_finished` completed or failed jobs. Pending and
    /// processing jobs are never dropped.
    pub fn with_retention(max_finished: usize) -> Self { Self { jobs: Mutex::new(Jobs::default()), max_finished } }

    pub fn create(&self, document: impl Into<String>) -> JobId {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            document: document.into(),
            status: JobStatus::Pending,
            chunk_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = record.id;
        self.lock().records.insert(id, record);
        id
    }

    /// Sets the status; `chunk_count` and `error` overwrite the stored values when given.
    pub fn update(&self, id: JobId, status: JobStatus, chunk_count: Option<usize>, error: Option<String>) -> Result<JobRecord> {
        let mut jobs = self.lock();
        let record = jobs.records.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        let newly_finished = status.is_finished() && !record.status.is_finished();
        record.status = status;
        if let Some(count) = chunk_count {
            record.chunk_count = count;
        }
        if error.is_some() {
            record.error = error;
        }
        record.updated_at = Utc::now();
        let updated = record.clone();

        if newly_finished {
            jobs.finished.push_back(id);
            let mut dropped = 0usize;
            while jobs.finished.len() > self.max_finished {
                let Some(oldest) = jobs.finished.pop_front() else { break };
                // A job re-opened since it finished is still in use.
                if jobs.records.get(&oldest).is_some_and(|j| j.status.is_finished()) {
                    jobs.records.remove(&oldest);
                    dropped += 1;
                }
            }
            if dropped > 0 {
                debug!(dropped, "Dropped old finished jobs");
            }
        }
        Ok(updated)
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> { self.lock().records.get(&id).cloned() }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.lock().records.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Drops completed and failed jobs. Returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut jobs = self.lock();
        let before = jobs.records.len();
        jobs.records.retain(|_, j| !j.status.is_finished());
        jobs.finished.clear();
        before - jobs.records.len()
    }

    pub fn len(&self) -> usize { self.lock().records.len() }

    pub fn is_empty(&self) -> bool { self.lock().records.is_empty() }

    // Records are replaced whole, so a panic elsewhere cannot leave one half-written.
    fn lock(&self) -> MutexGuard<'_, Jobs> { self.jobs.lock().unwrap_or_else(PoisonError::into_inner) }
}
