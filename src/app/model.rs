use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Downloading,
    Completed,
    Error,
}

impl JobStatus {
    /// Terminal states never transition again; the job only leaves the
    /// registry through eviction.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

/// In-memory record of one crawl run. Not persisted; a process restart
/// forgets all jobs (their books remain resumable via `continue`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    /// 1-based order of the chapter currently being fetched.
    pub current_chapter: u32,
    /// Chapters persisted so far by this job.
    pub total_chapters: u32,
    pub book_id: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
