//! File-backed job run history

use super::persist::{read_document, write_atomic};
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::JobRun;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobDocument {
    #[serde(default)]
    jobs: Vec<JobRun>,
}

/// Fields of a job lifecycle event. `upsert` turns one into a [`JobRun`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    pub workload: String,
    #[serde(default)]
    pub policy_id: Option<String>,
    pub status: String,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl JobEvent {
    fn into_run(self, now: DateTime<Utc>) -> JobRun {
        JobRun {
            job_id: self.job_id,
            workload: self.workload,
            policy_id: self.policy_id,
            status: self.status,
            submitted_at: self.submitted_at.unwrap_or(now),
            started_at: self.started_at,
            finished_at: self.finished_at,
            metrics: self.metrics,
            tags: self.tags,
            notes: self.notes,
        }
    }
}

/// Durable job history keyed by job id (last writer wins)
pub struct JobStore {
    path: PathBuf,
    jobs: Mutex<BTreeMap<String, JobRun>>,
}

impl JobStore {
    /// Open the store, loading any previously persisted jobs
    pub fn open(path: impl Into<PathBuf>) -> AdvisorResult<Self> {
        let path = path.into();
        let document: JobDocument = read_document(&path)?.unwrap_or_default();

        let jobs: BTreeMap<String, JobRun> = document
            .jobs
            .into_iter()
            .map(|job| (job.job_id.clone(), job))
            .collect();

        info!(path = %path.display(), jobs = jobs.len(), "Job store loaded");

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a lifecycle event, replacing any prior record for the job id.
    /// A missing `submitted_at` defaults to now.
    pub async fn upsert(&self, event: JobEvent) -> AdvisorResult<JobRun> {
        let job = event.into_run(Utc::now());
        self.record(job).await
    }

    /// Insert or replace a fully formed run
    pub async fn record(&self, job: JobRun) -> AdvisorResult<JobRun> {
        let mut jobs = self.jobs.lock().await;
        self.commit(&mut jobs, [job.clone()])?;

        debug!(job_id = %job.job_id, status = %job.status, "Job recorded");
        Ok(job)
    }

    /// Insert or replace several runs with a single persist
    pub async fn record_batch(&self, batch: Vec<JobRun>) -> AdvisorResult<Vec<JobRun>> {
        let mut jobs = self.jobs.lock().await;
        self.commit(&mut jobs, batch.iter().cloned())?;

        debug!(count = batch.len(), "Job batch recorded");
        Ok(batch)
    }

    /// Modify an existing job under the store lock and persist it.
    /// Nothing is written if `apply` fails.
    pub async fn update<F>(&self, job_id: &str, apply: F) -> AdvisorResult<JobRun>
    where
        F: FnOnce(&mut JobRun) -> AdvisorResult<()>,
    {
        let mut jobs = self.jobs.lock().await;
        let mut updated = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| AdvisorError::JobNotFound(job_id.to_string()))?;
        apply(&mut updated)?;
        self.commit(&mut jobs, [updated.clone()])?;

        debug!(job_id = %updated.job_id, status = %updated.status, "Job updated");
        Ok(updated)
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRun> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn list(&self) -> Vec<JobRun> {
        self.jobs.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Most recent jobs by finished, started or submitted time, newest first
    pub async fn recent(&self, limit: usize) -> Vec<JobRun> {
        let mut jobs = self.list().await;
        jobs.sort_by(|a, b| b.effective_at().cmp(&a.effective_at()));
        jobs.truncate(limit);
        jobs
    }

    pub async fn status_counts(&self) -> BTreeMap<String, usize> {
        let jobs = self.jobs.lock().await;
        let mut counts = BTreeMap::new();
        for job in jobs.values() {
            *counts.entry(job.status.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of jobs recorded against each policy id
    pub async fn policy_usage(&self) -> HashMap<String, usize> {
        let jobs = self.jobs.lock().await;
        let mut counts = HashMap::new();
        for policy_id in jobs.values().filter_map(|job| job.policy_id.as_ref()) {
            *counts.entry(policy_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Persist `jobs` with `changed` applied, then swap the result in.
    /// A failed write leaves the map exactly as it was.
    fn commit(
        &self,
        jobs: &mut BTreeMap<String, JobRun>,
        changed: impl IntoIterator<Item = JobRun>,
    ) -> AdvisorResult<()> {
        let mut staged = jobs.clone();
        for job in changed {
            staged.insert(job.job_id.clone(), job);
        }
        let document = JobDocument {
            jobs: staged.values().cloned().collect(),
        };
        write_atomic(&self.path, &document)?;
        *jobs = staged;
        Ok(())
    }
}
