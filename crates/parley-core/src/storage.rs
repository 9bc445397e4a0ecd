//! PostgreSQL storage for meetings, agents and speakers using Diesel
//!
//! Every state transition is a single guarded `UPDATE`. The `WHERE` clause is
//! the only concurrency control: duplicate or out-of-order webhook deliveries
//! race on the row and at most one of them wins.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::query_builder::QueryFragment;
use diesel::query_dsl::methods::{ExecuteDsl, LoadQuery};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::schema::{agents, meetings, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatus {
    Upcoming,
    Active,
    Completed,
    Processing,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Upcoming => "upcoming",
            MeetingStatus::Active => "active",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Processing => "processing",
            MeetingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for MeetingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upcoming" => Ok(MeetingStatus::Upcoming),
            "active" => Ok(MeetingStatus::Active),
            "completed" => Ok(MeetingStatus::Completed),
            "processing" => Ok(MeetingStatus::Processing),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid meeting status: {}", s)),
        }
    }
}

/// Statuses a `call.session_started` event must never move out of
pub const NOT_STARTABLE: [MeetingStatus; 4] = [
    MeetingStatus::Completed,
    MeetingStatus::Active,
    MeetingStatus::Cancelled,
    MeetingStatus::Processing,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub agent_id: String,
    pub status: MeetingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub summary: Option<String>,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = meetings)]
struct MeetingRow {
    id: String,
    name: String,
    user_id: String,
    agent_id: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    transcript_url: Option<String>,
    recording_url: Option<String>,
    summary: Option<String>,
}

impl TryFrom<MeetingRow> for Meeting {
    type Error = anyhow::Error;

    fn try_from(row: MeetingRow) -> Result<Self> {
        Ok(Meeting {
            status: MeetingStatus::from_str(&row.status)?,
            id: row.id,
            name: row.name,
            user_id: row.user_id,
            agent_id: row.agent_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            transcript_url: row.transcript_url,
            recording_url: row.recording_url,
            summary: row.summary,
        })
    }
}

/// The AI persona attached to a meeting
#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = agents)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub instructions: String,
    pub ai_provider: String,
    pub ai_model: String,
    /// Numeric, stored as text
    pub temperature: String,
    /// Numeric, stored as text
    pub max_tokens: String,
}

impl Agent {
    pub fn temperature_value(&self) -> f32 {
        self.temperature
            .trim()
            .parse()
            .unwrap_or(parley_ai::responder::DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens_value(&self) -> u32 {
        self.max_tokens
            .trim()
            .parse()
            .unwrap_or(parley_ai::responder::DEFAULT_MAX_TOKENS)
    }
}

/// Meeting persistence used by the webhook router and the processing job
pub trait MeetingStore: Send + Sync {
    fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>>;

    /// `status = active, started_at = now` unless the meeting is in a
    /// `NOT_STARTABLE` status. `None` when no row matched.
    fn claim_for_start(&self, meeting_id: &str) -> Result<Option<Meeting>>;

    /// `status = processing, ended_at = now`, only from `active`.
    /// Returns whether a row changed.
    fn mark_processing(&self, meeting_id: &str) -> Result<bool>;

    /// `None` when the meeting does not exist
    fn set_transcript_url(&self, meeting_id: &str, url: &str) -> Result<Option<Meeting>>;

    fn set_recording_url(&self, meeting_id: &str, url: &str) -> Result<bool>;

    /// Force `completed`, writing the summary when there is one
    fn complete(&self, meeting_id: &str, summary: Option<&str>) -> Result<()>;

    fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// Display names for speaker ids, users first, then agents
    fn speaker_names(&self, speaker_ids: &[String]) -> Result<HashMap<String, String>>;
}

/// `upcoming → active` unless the row is already past it
fn claim_for_start_query<'a>(
    meeting_id: &'a str,
    now: DateTime<Utc>,
) -> impl RunQueryDsl<PgConnection> + LoadQuery<'a, PgConnection, MeetingRow> + QueryFragment<Pg> + 'a
{
    let excluded: Vec<&'static str> = NOT_STARTABLE.iter().map(|s| s.as_str()).collect();

    diesel::update(
        meetings::table
            .filter(meetings::id.eq(meeting_id))
            .filter(meetings::status.ne_all(excluded)),
    )
    .set((
        meetings::status.eq(MeetingStatus::Active.as_str()),
        meetings::started_at.eq(now),
        meetings::updated_at.eq(now),
    ))
    .returning(MeetingRow::as_returning())
}

/// `active → processing`, stamping `ended_at`
fn mark_processing_query<'a>(
    meeting_id: &'a str,
    now: DateTime<Utc>,
) -> impl RunQueryDsl<PgConnection> + ExecuteDsl<PgConnection> + QueryFragment<Pg> + 'a {
    diesel::update(
        meetings::table
            .filter(meetings::id.eq(meeting_id))
            .filter(meetings::status.eq(MeetingStatus::Active.as_str())),
    )
    .set((
        meetings::status.eq(MeetingStatus::Processing.as_str()),
        meetings::ended_at.eq(now),
        meetings::updated_at.eq(now),
    ))
}

pub struct PgMeetingStore {
    conn: Arc<Mutex<PgConnection>>,
}

impl PgMeetingStore {
    pub fn new(conn: Arc<Mutex<PgConnection>>) -> Self {
        Self { conn }
    }

    pub fn connect(database_url: &str) -> Result<Self> {
        let conn =
            PgConnection::establish(database_url).context("Failed to connect to database")?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PgConnection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire database lock"))
    }
}

impl MeetingStore for PgMeetingStore {
    fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>> {
        let mut conn = self.lock()?;

        let row: Option<MeetingRow> = meetings::table
            .filter(meetings::id.eq(meeting_id))
            .select(MeetingRow::as_select())
            .first(&mut *conn)
            .optional()
            .context("Failed to query meeting")?;

        row.map(Meeting::try_from).transpose()
    }

    fn claim_for_start(&self, meeting_id: &str) -> Result<Option<Meeting>> {
        let mut conn = self.lock()?;

        let row: Option<MeetingRow> = claim_for_start_query(meeting_id, Utc::now())
            .get_result(&mut *conn)
            .optional()
            .context("Failed to claim meeting for start")?;

        row.map(Meeting::try_from).transpose()
    }

    fn mark_processing(&self, meeting_id: &str) -> Result<bool> {
        let mut conn = self.lock()?;

        let updated = mark_processing_query(meeting_id, Utc::now())
            .execute(&mut *conn)
            .context("Failed to mark meeting as processing")?;

        Ok(updated > 0)
    }

    fn set_transcript_url(&self, meeting_id: &str, url: &str) -> Result<Option<Meeting>> {
        let mut conn = self.lock()?;

        let row: Option<MeetingRow> =
            diesel::update(meetings::table.filter(meetings::id.eq(meeting_id)))
                .set((
                    meetings::transcript_url.eq(url),
                    meetings::updated_at.eq(Utc::now()),
                ))
                .returning(MeetingRow::as_returning())
                .get_result(&mut *conn)
                .optional()
                .context("Failed to store transcript URL")?;

        row.map(Meeting::try_from).transpose()
    }

    fn set_recording_url(&self, meeting_id: &str, url: &str) -> Result<bool> {
        let mut conn = self.lock()?;

        let updated = diesel::update(meetings::table.filter(meetings::id.eq(meeting_id)))
            .set((
                meetings::recording_url.eq(url),
                meetings::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *conn)
            .context("Failed to store recording URL")?;

        Ok(updated > 0)
    }

    fn complete(&self, meeting_id: &str, summary: Option<&str>) -> Result<()> {
        let mut conn = self.lock()?;
        let target = meetings::table.filter(meetings::id.eq(meeting_id));
        let completed = MeetingStatus::Completed.as_str();

        match summary {
            Some(summary) => diesel::update(target)
                .set((
                    meetings::summary.eq(summary),
                    meetings::status.eq(completed),
                    meetings::updated_at.eq(Utc::now()),
                ))
                .execute(&mut *conn),
            None => diesel::update(target)
                .set((
                    meetings::status.eq(completed),
                    meetings::updated_at.eq(Utc::now()),
                ))
                .execute(&mut *conn),
        }
        .context("Failed to complete meeting")?;

        Ok(())
    }

    fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let mut conn = self.lock()?;

        let agent = agents::table
            .filter(agents::id.eq(agent_id))
            .select(Agent::as_select())
            .first(&mut *conn)
            .optional()
            .context("Failed to query agent")?;

        Ok(agent)
    }

    fn speaker_names(&self, speaker_ids: &[String]) -> Result<HashMap<String, String>> {
        if speaker_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.lock()?;

        let agent_names: Vec<(String, String)> = agents::table
            .filter(agents::id.eq_any(speaker_ids))
            .select((agents::id, agents::name))
            .load(&mut *conn)
            .context("Failed to query agent speakers")?;

        let user_names: Vec<(String, String)> = users::table
            .filter(users::id.eq_any(speaker_ids))
            .select((users::id, users::name))
            .load(&mut *conn)
            .context("Failed to query user speakers")?;

        // Users are inserted last so they win an id collision
        Ok(agent_names.into_iter().chain(user_names).collect())
    }
}
