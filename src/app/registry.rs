use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::app::model::{Job, JobStatus};

/// Concurrency-safe mapping from job id to job record.
///
/// Only the owning background task writes a given entry; polls are plain
/// reads. When a job goes terminal an eviction timer starts, after which
/// polls return `None`.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Register a fresh job in `downloading` state.
    pub async fn create(&self, book_id: Option<i64>, starting_order: u32) -> Job {
        let job = Job {
            job_id: uuid::Uuid::new_v4().simple().to_string(),
            status: JobStatus::Downloading,
            current_chapter: starting_order,
            total_chapters: 0,
            book_id,
            error: None,
            created_at: Utc::now(),
        };
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        job
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn update<F>(&self, job_id: &str, mutate: F)
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            mutate(job);
        }
    }

    /// Apply a terminal mutation and schedule eviction after the
    /// retention window.
    pub async fn finish<F>(&self, job_id: &str, mutate: F)
    where
        F: FnOnce(&mut Job),
    {
        self.update(job_id, mutate).await;

        let jobs = Arc::clone(&self.jobs);
        let retention = self.retention;
        let job_id = job_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            jobs.write().await.remove(&job_id);
        });
    }
}
