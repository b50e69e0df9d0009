use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Converting,
    Completed,
    Failed,
}

/// Mutable state of one conversion job.
///
/// Written by the single pipeline thread that owns the job, read by any
/// number of concurrent pollers through [`JobTracker::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub status: JobStatus,
    /// Percentage in [0, 100], monotonically non-decreasing.
    pub progress: f64,
    /// Human-readable description of the current step.
    pub status_text: String,
    /// Timestamped, append-only log lines.
    pub logs: Vec<String>,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    /// True once the job is terminal, regardless of success.
    pub completed: bool,
}

impl Job {
    pub fn has_output(&self) -> bool {
        self.output_path.is_some()
    }
}

/// Process-wide registry mapping job ids to job records.
///
/// Cheap to clone; clones share the same underlying map, so a tracker can
/// be handed to the pipeline thread and to any number of polling front
/// ends. Records are never removed here; retention is an operator concern.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh opaque job identifier.
    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a newly uploaded file as a job in `Uploaded` state.
    pub fn create(&self, job_id: &str, filename: &str, source_path: PathBuf) {
        let job = Job {
            id: job_id.to_string(),
            filename: filename.to_string(),
            source_path,
            status: JobStatus::Uploaded,
            progress: 0.0,
            status_text: "Uploaded".to_string(),
            logs: vec![timestamped(&format!("File uploaded: {}", filename))],
            output_path: None,
            error: None,
            completed: false,
        };
        self.jobs.write().insert(job_id.to_string(), job);
    }

    /// Append a timestamped log line. Unknown job ids are ignored: logging
    /// must never fail out of the pipeline.
    pub fn append_log(&self, job_id: &str, message: &str) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.logs.push(timestamped(message));
        }
    }

    /// Update progress and status text. Progress is clamped to [0, 100]
    /// and never moves backwards.
    pub fn set_progress(&self, job_id: &str, progress: f64, status_text: &str) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            let clamped = progress.clamp(0.0, 100.0);
            if clamped > job.progress {
                job.progress = clamped;
            }
            job.status_text = status_text.to_string();
        }
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = status;
        }
    }

    /// Terminal success: progress 100, output recorded.
    pub fn mark_completed(&self, job_id: &str, output_path: PathBuf) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.output_path = Some(output_path);
            job.completed = true;
        }
    }

    /// Terminal failure: error recorded, no output. Completion is
    /// orthogonal to success, so `completed` is set here too.
    pub fn mark_failed(&self, job_id: &str, error: &str) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.completed = true;
        }
    }

    /// Clone of the current job record, or `None` for unknown ids.
    pub fn snapshot(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

fn timestamped(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with_job() -> (JobTracker, String) {
        let tracker = JobTracker::new();
        let id = JobTracker::new_job_id();
        tracker.create(&id, "clip.mp4", PathBuf::from("/tmp/clip.mp4"));
        (tracker, id)
    }

    #[test]
    fn create_and_snapshot() {
        let (tracker, id) = tracker_with_job();
        let job = tracker.snapshot(&id).unwrap();
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.progress, 0.0);
        assert!(!job.completed);
        assert_eq!(job.logs.len(), 1);
        assert!(job.logs[0].contains("clip.mp4"));
    }

    #[test]
    fn unknown_job_is_ignored() {
        let tracker = JobTracker::new();
        tracker.append_log("missing", "hello");
        tracker.set_progress("missing", 10.0, "step");
        assert!(tracker.snapshot("missing").is_none());
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let (tracker, id) = tracker_with_job();
        tracker.set_progress(&id, 40.0, "frames");
        tracker.set_progress(&id, 25.0, "frames");
        assert_eq!(tracker.snapshot(&id).unwrap().progress, 40.0);
        tracker.set_progress(&id, 250.0, "done");
        assert_eq!(tracker.snapshot(&id).unwrap().progress, 100.0);
    }

    #[test]
    fn completion_is_orthogonal_to_success() {
        let (tracker, id) = tracker_with_job();
        tracker.mark_failed(&id, "boom");
        let job = tracker.snapshot(&id).unwrap();
        assert!(job.completed);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.output_path.is_none());
    }

    #[test]
    fn success_reaches_exactly_100() {
        let (tracker, id) = tracker_with_job();
        tracker.set_progress(&id, 50.0, "frames");
        tracker.mark_completed(&id, PathBuf::from("/tmp/out.mp4"));
        let job = tracker.snapshot(&id).unwrap();
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.has_output());
        assert!(job.error.is_none());
    }

    #[test]
    fn clones_share_state() {
        let (tracker, id) = tracker_with_job();
        let other = tracker.clone();
        other.set_progress(&id, 12.5, "frames");
        assert_eq!(tracker.snapshot(&id).unwrap().progress, 12.5);
    }
}
