//! In-memory stand-ins for the database, call platform, queue and providers

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use parley_ai::{AiResponder, ChatProvider, CompletionRequest, ProviderError};

use crate::call_platform::{CallPlatform, PlatformError};
use crate::jobs::{Job, JobPayload, JobQueue, JobStatus};
use crate::processing::TranscriptSource;
use crate::storage::{Agent, Meeting, MeetingStatus, MeetingStore, NOT_STARTABLE};

pub fn agent(id: &str) -> Agent {
    Agent {
        id: id.to_string(),
        name: "Ada".into(),
        user_id: "u1".into(),
        instructions: "Be helpful".into(),
        ai_provider: "openrouter".into(),
        ai_model: "mistralai/mistral-7b-instruct".into(),
        temperature: "0.7".into(),
        max_tokens: "1000".into(),
    }
}

pub fn meeting(id: &str, status: MeetingStatus) -> Meeting {
    Meeting {
        id: id.to_string(),
        name: format!("Meeting {}", id),
        user_id: "u1".into(),
        agent_id: "a1".into(),
        status,
        started_at: None,
        ended_at: None,
        transcript_url: None,
        recording_url: None,
        summary: None,
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    meetings: Mutex<HashMap<String, Meeting>>,
    agents: Mutex<HashMap<String, Agent>>,
    users: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Also registers agent `agent_id` so lookups succeed
    pub fn insert_meeting(&self, id: &str, status: MeetingStatus, agent_id: &str) {
        let mut row = meeting(id, status);
        row.agent_id = agent_id.to_string();
        self.meetings.lock().unwrap().insert(id.to_string(), row);
        self.agents
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_insert_with(|| agent(agent_id));
    }

    pub fn insert_user(&self, id: &str, name: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(id.to_string(), name.to_string());
    }

    pub fn insert_agent(&self, agent: Agent) {
        self.agents.lock().unwrap().insert(agent.id.clone(), agent);
    }

    pub fn remove_agent(&self, id: &str) {
        self.agents.lock().unwrap().remove(id);
    }
}

impl MeetingStore for InMemoryStore {
    fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>> {
        Ok(self.meetings.lock().unwrap().get(meeting_id).cloned())
    }

    fn claim_for_start(&self, meeting_id: &str) -> Result<Option<Meeting>> {
        let mut meetings = self.meetings.lock().unwrap();
        Ok(meetings
            .get_mut(meeting_id)
            .filter(|m| !NOT_STARTABLE.contains(&m.status))
            .map(|m| {
                m.status = MeetingStatus::Active;
                m.started_at = Some(Utc::now());
                m.clone()
            }))
    }

    fn mark_processing(&self, meeting_id: &str) -> Result<bool> {
        let mut meetings = self.meetings.lock().unwrap();
        match meetings.get_mut(meeting_id) {
            Some(m) if m.status == MeetingStatus::Active => {
                m.status = MeetingStatus::Processing;
                m.ended_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_transcript_url(&self, meeting_id: &str, url: &str) -> Result<Option<Meeting>> {
        let mut meetings = self.meetings.lock().unwrap();
        Ok(meetings.get_mut(meeting_id).map(|m| {
            m.transcript_url = Some(url.to_string());
            m.clone()
        }))
    }

    fn set_recording_url(&self, meeting_id: &str, url: &str) -> Result<bool> {
        let mut meetings = self.meetings.lock().unwrap();
        Ok(meetings
            .get_mut(meeting_id)
            .map(|m| m.recording_url = Some(url.to_string()))
            .is_some())
    }

    fn complete(&self, meeting_id: &str, summary: Option<&str>) -> Result<()> {
        if let Some(m) = self.meetings.lock().unwrap().get_mut(meeting_id) {
            m.status = MeetingStatus::Completed;
            if let Some(summary) = summary {
                m.summary = Some(summary.to_string());
            }
        }
        Ok(())
    }

    fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.lock().unwrap().get(agent_id).cloned())
    }

    fn speaker_names(&self, speaker_ids: &[String]) -> Result<HashMap<String, String>> {
        let agents = self.agents.lock().unwrap();
        let users = self.users.lock().unwrap();

        Ok(speaker_ids
            .iter()
            .filter_map(|id| {
                users
                    .get(id)
                    .or_else(|| agents.get(id).map(|a| &a.name))
                    .map(|name| (id.clone(), name.clone()))
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Join(String, String),
    End(String),
    UpsertUser(String, String),
    EnsureChannel(String, String),
    /// channel id, message id, text
    SendMessage(String, String, String),
}

/// Records every command. `failing(op, n)` makes the next `n` calls of `op`
/// ("join", "end", "upsert", "channel", "send") fail.
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<PlatformCall>>,
    failures: Mutex<HashMap<&'static str, u32>>,
    posted: Mutex<HashSet<String>>,
}

impl FakePlatform {
    pub fn failing(self, op: &'static str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(op, times);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posted(&self) -> usize {
        self.posted.lock().unwrap().len()
    }

    fn record(&self, op: &'static str, call: PlatformCall) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().push(call);

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(PlatformError::Api {
                    status: 503,
                    message: format!("{} unavailable", op),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CallPlatform for FakePlatform {
    async fn join_call(&self, call_id: &str, user_id: &str) -> Result<(), PlatformError> {
        self.record("join", PlatformCall::Join(call_id.into(), user_id.into()))
    }

    async fn end_call(&self, call_id: &str) -> Result<(), PlatformError> {
        self.record("end", PlatformCall::End(call_id.into()))
    }

    async fn upsert_chat_user(&self, user_id: &str, name: &str) -> Result<(), PlatformError> {
        self.record("upsert", PlatformCall::UpsertUser(user_id.into(), name.into()))
    }

    async fn ensure_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        _created_by: &str,
    ) -> Result<(), PlatformError> {
        self.record(
            "channel",
            PlatformCall::EnsureChannel(channel_type.into(), channel_id.into()),
        )
    }

    async fn send_message(
        &self,
        _channel_type: &str,
        channel_id: &str,
        message_id: &str,
        text: &str,
        _user_id: &str,
    ) -> Result<(), PlatformError> {
        self.record(
            "send",
            PlatformCall::SendMessage(channel_id.into(), message_id.into(), text.into()),
        )?;
        self.posted.lock().unwrap().insert(message_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl FakeJobQueue {
    pub fn requests(&self) -> Vec<JobPayload> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.payload.clone())
            .collect()
    }

    pub fn last_error(&self, id: Uuid) -> Option<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|job| job.id == id)
            .and_then(|job| job.last_error.clone())
    }

    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.status)
    }

    fn set_status(&self, id: Uuid, status: JobStatus, error: Option<&str>) {
        if let Some(job) = self.jobs.lock().unwrap().iter_mut().find(|j| j.id == id) {
            job.status = status;
            job.last_error = error.map(str::to_string);
        }
    }
}

impl JobQueue for FakeJobQueue {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.jobs.lock().unwrap().push(Job {
            id,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn claim_due(&self) -> Result<Vec<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| {
                job.status = JobStatus::Running;
                job.attempts += 1;
                job.clone()
            })
            .collect())
    }

    fn mark_completed(&self, job_id: Uuid) -> Result<()> {
        self.set_status(job_id, JobStatus::Completed, None);
        Ok(())
    }

    fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.set_status(job_id, JobStatus::Failed, Some(error));
        Ok(())
    }

    fn requeue_stale(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
            job.status = JobStatus::Pending;
            count += 1;
        }
        Ok(count)
    }
}

/// Serves canned bodies by URL; anything else is a failed download
#[derive(Clone, Default)]
pub struct FakeTranscripts {
    bodies: Arc<HashMap<String, String>>,
    fetches: Arc<AtomicU32>,
}

impl FakeTranscripts {
    pub fn with(url: &str, body: &str) -> Self {
        Self {
            bodies: Arc::new(HashMap::from([(url.to_string(), body.to_string())])),
            fetches: Arc::default(),
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptSource for FakeTranscripts {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 for {}", url))
    }
}

pub struct FakeProvider {
    name: String,
    answer: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeProvider {
    pub fn answering(name: &str, answer: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(Some(self.answer.clone()))
    }
}

/// Every catalog provider answers with `text`
pub fn fake_responder(text: &str) -> AiResponder {
    parley_ai::catalog::available_providers()
        .into_iter()
        .fold(AiResponder::new(), |responder, info| {
            responder.with_provider(Arc::new(FakeProvider::answering(info.id, text)))
        })
}
