//! Durable queue for work done off the webhook path
//!
//! The webhook router enqueues a `meetings/processing` row and returns
//! immediately. Chat replies arrive as `meetings/chat-reply` rows. A
//! background worker polls for pending rows, claims them and runs each on
//! its own task.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chat::ChatResponder;
use crate::processing::MeetingProcessor;
use crate::schema::processing_jobs;
use crate::steps::StepError;

pub const PROCESSING_JOB: &str = "meetings/processing";
pub const CHAT_REPLY_JOB: &str = "meetings/chat-reply";

/// Payload of a `meetings/processing` job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    pub meeting_id: String,
    pub transcript_url: String,
}

/// Payload of a `meetings/chat-reply` job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReplyRequest {
    pub meeting_id: String,
    pub message: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    Processing(ProcessingRequest),
    ChatReply(ChatReplyRequest),
}

impl JobPayload {
    pub fn name(&self) -> &'static str {
        match self {
            JobPayload::Processing(_) => PROCESSING_JOB,
            JobPayload::ChatReply(_) => CHAT_REPLY_JOB,
        }
    }

    pub fn meeting_id(&self) -> &str {
        match self {
            JobPayload::Processing(request) => &request.meeting_id,
            JobPayload::ChatReply(request) => &request.meeting_id,
        }
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            JobPayload::Processing(request) => serde_json::to_value(request)?,
            JobPayload::ChatReply(request) => serde_json::to_value(request)?,
        };
        Ok(value)
    }

    fn from_row(name: &str, payload: serde_json::Value) -> Result<Self> {
        match name {
            PROCESSING_JOB => Ok(JobPayload::Processing(
                serde_json::from_value(payload).context("Failed to parse job payload")?,
            )),
            CHAT_REPLY_JOB => Ok(JobPayload::ChatReply(
                serde_json::from_value(payload).context("Failed to parse job payload")?,
            )),
            _ => Err(anyhow::anyhow!("Unknown job name: {}", name)),
        }
    }
}

impl From<ProcessingRequest> for JobPayload {
    fn from(request: ProcessingRequest) -> Self {
        JobPayload::Processing(request)
    }
}

impl From<ChatReplyRequest> for JobPayload {
    fn from(request: ChatReplyRequest) -> Self {
        JobPayload::ChatReply(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = processing_jobs)]
struct NewJob<'a> {
    id: Uuid,
    name: &'a str,
    payload: serde_json::Value,
    status: &'a str,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = processing_jobs)]
struct JobRow {
    id: Uuid,
    name: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            payload: JobPayload::from_row(&row.name, row.payload)?,
            status: JobStatus::from_str(&row.status)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

pub trait JobQueue: Send + Sync {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid>;

    /// Move every pending job to `running` and return the ones this call won
    fn claim_due(&self) -> Result<Vec<Job>>;

    fn mark_completed(&self, job_id: Uuid) -> Result<()>;

    fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Reset jobs left `running` by a previous process. Returns how many.
    fn requeue_stale(&self) -> Result<usize>;
}

pub struct PgJobQueue {
    conn: Arc<Mutex<PgConnection>>,
}

impl PgJobQueue {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PgConnection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire database lock"))
    }
}

impl JobQueue for PgJobQueue {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid> {
        let mut conn = self.lock()?;
        let id = Uuid::new_v4();

        diesel::insert_into(processing_jobs::table)
            .values(&NewJob {
                id,
                name: payload.name(),
                payload: payload.to_value()?,
                status: JobStatus::Pending.as_str(),
            })
            .execute(&mut *conn)
            .with_context(|| format!("Failed to enqueue {} job", payload.name()))?;

        Ok(id)
    }

    fn claim_due(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = {
            let mut conn = self.lock()?;

            diesel::update(
                processing_jobs::table
                    .filter(processing_jobs::name.eq_any([PROCESSING_JOB, CHAT_REPLY_JOB]))
                    .filter(processing_jobs::status.eq(JobStatus::Pending.as_str())),
            )
            .set((
                processing_jobs::status.eq(JobStatus::Running.as_str()),
                processing_jobs::attempts.eq(processing_jobs::attempts + 1),
                processing_jobs::updated_at.eq(Utc::now()),
            ))
            .returning(JobRow::as_returning())
            .get_results(&mut *conn)
            .context("Failed to claim jobs")?
        };

        Ok(decode_claimed(rows, |id, error| self.mark_failed(id, error)))
    }

    fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        let mut conn = self.lock()?;

        diesel::update(processing_jobs::table.filter(processing_jobs::id.eq(job_id)))
            .set((
                processing_jobs::status.eq(JobStatus::Completed.as_str()),
                processing_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .context("Failed to mark job completed")?;

        Ok(())
    }

    fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut conn = self.lock()?;

        diesel::update(processing_jobs::table.filter(processing_jobs::id.eq(job_id)))
            .set((
                processing_jobs::status.eq(JobStatus::Failed.as_str()),
                processing_jobs::last_error.eq(error),
                processing_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .context("Failed to mark job failed")?;

        Ok(())
    }

    fn requeue_stale(&self) -> Result<usize> {
        let mut conn = self.lock()?;

        let count = diesel::update(
            processing_jobs::table
                .filter(processing_jobs::status.eq(JobStatus::Running.as_str())),
        )
        .set((
            processing_jobs::status.eq(JobStatus::Pending.as_str()),
            processing_jobs::updated_at.eq(Utc::now()),
        ))
        .execute(&mut *conn)
        .context("Failed to requeue stale jobs")?;

        Ok(count)
    }
}

/// Decode claimed rows. A malformed row is failed through `fail` and must
/// not block the rest of the batch, even when failing it errors too.
fn decode_claimed<F>(rows: Vec<JobRow>, mut fail: F) -> Vec<Job>
where
    F: FnMut(Uuid, &str) -> Result<()>,
{
    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        match Job::try_from(row) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                tracing::error!("Failing job {}: {:#}", id, e);
                if let Err(e) = fail(id, &format!("{:#}", e)) {
                    tracing::error!("Failed to mark job {} failed: {:#}", id, e);
                }
            }
        }
    }
    jobs
}

/// Runs a claimed job with the handler for its kind
pub struct JobRunner {
    processor: Arc<MeetingProcessor>,
    chat: Arc<ChatResponder>,
}

impl JobRunner {
    pub fn new(processor: Arc<MeetingProcessor>, chat: Arc<ChatResponder>) -> Self {
        Self { processor, chat }
    }

    pub async fn run(&self, job: &Job) -> Result<(), StepError> {
        match &job.payload {
            // The processor completes the meeting on its own failures
            JobPayload::Processing(request) => {
                self.processor
                    .run(&request.meeting_id, &request.transcript_url)
                    .await;
                Ok(())
            }
            JobPayload::ChatReply(request) => {
                let outcome = self.chat.reply(job.id, request).await?;
                tracing::debug!("Chat job {} finished: {:?}", job.id, outcome);
                Ok(())
            }
        }
    }
}

/// One poll: claim due jobs and start each on its own task
pub fn poll_once(
    queue: &Arc<dyn JobQueue>,
    runner: &Arc<JobRunner>,
) -> Result<Vec<JoinHandle<()>>> {
    let jobs = queue.claim_due()?;

    Ok(jobs
        .into_iter()
        .map(|job| {
            tracing::debug!(
                "Claimed {} job {} for meeting {}",
                job.payload.name(),
                job.id,
                job.payload.meeting_id()
            );
            let queue = Arc::clone(queue);
            let runner = Arc::clone(runner);

            tokio::spawn(async move {
                let marked = match runner.run(&job).await {
                    Ok(()) => queue.mark_completed(job.id),
                    Err(e) => {
                        tracing::error!("Job {} failed: {}", job.id, e);
                        queue.mark_failed(job.id, &e.to_string())
                    }
                };

                if let Err(e) = marked {
                    tracing::error!("Failed to record outcome of job {}: {}", job.id, e);
                }
            })
        })
        .collect())
}

/// Spawn the background worker polling for jobs
pub fn spawn_worker(
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);

        loop {
            interval.tick().await;

            if let Err(e) = poll_once(&queue, &runner) {
                tracing::error!("Failed to poll jobs: {}", e);
            }
        }
    })
}
