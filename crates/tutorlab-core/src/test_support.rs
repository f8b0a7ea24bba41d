//! In-memory repositories and a scripted upstream for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tutorlab_types::error::{StoreError, UpstreamError};
use tutorlab_types::llm::CompletionRequest;
use tutorlab_types::message::{AppendOutcome, Message, MessageId, MessageRole, NewMessage};
use tutorlab_types::session::{NewSession, Progress, Reconciliation, Session, SessionId};
use tutorlab_types::sweep::{SweepReport, SweepRun};
use tutorlab_types::user::{ExperimentGroup, NewUser, User, UserCredentials, UserId};

use crate::relay::upstream::{ByteStream, CompletionUpstream};
use crate::repository::{MessageRepository, SessionRepository, SweepRepository, UserRepository};

#[derive(Default)]
struct State {
    users: Vec<(User, Option<String>)>,
    sessions: Vec<Session>,
    messages: Vec<Message>,
    sweep_runs: Vec<SweepRun>,
    /// Number of mutating statements issued.
    writes: u64,
    unavailable: bool,
    fail_stamp: HashSet<SessionId>,
    /// Raise a uniqueness conflict on the next insert after storing the row.
    race_next_insert: bool,
}

/// Shared in-memory store implementing every repository trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(state)
    }

    pub fn add_user(&self, student_id: &str, max_turns: Option<u32>, target_turns: Option<u32>) -> User {
        let mut state = self.lock();
        let user = User {
            id: UserId(state.users.len() as i64 + 1),
            student_id: student_id.to_string(),
            group: if max_turns.is_some() {
                ExperimentGroup::LowDepthLowTurns
            } else {
                ExperimentGroup::LowDepthHighTurns
            },
            max_turns,
            target_turns,
            consent_agreed: true,
            created_at: Utc::now(),
        };
        state.users.push((user.clone(), None));
        user
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn fail_stamp_for(&self, id: SessionId) {
        self.lock().fail_stamp.insert(id);
    }

    pub fn race_next_insert(&self) {
        self.lock().race_next_insert = true;
    }

    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Insert a message directly, bypassing dedup and bookkeeping.
    pub fn push_raw_message(&self, session_id: SessionId, role: MessageRole, turn_index: u32, content: &str) {
        let mut state = self.lock();
        let id = MessageId(state.messages.len() as i64 + 1);
        state.messages.push(Message {
            id,
            session_id,
            role,
            turn_index,
            content: content.to_string(),
            response_time_ms: None,
            created_at: Utc::now(),
        });
    }

    /// Overwrite a session's cached counters, bypassing bookkeeping.
    pub fn corrupt_turn_count(&self, id: SessionId, turn_count: u32) {
        let mut state = self.lock();
        if let Some(s) = state.sessions.iter_mut().find(|s| s.id == id) {
            s.turn_count = turn_count;
        }
    }
}

fn distinct_user_turns(messages: &[Message], session_id: SessionId) -> u32 {
    messages
        .iter()
        .filter(|m| m.session_id == session_id && m.role == MessageRole::User)
        .map(|m| m.turn_index)
        .collect::<HashSet<_>>()
        .len() as u32
}

impl UserRepository for MemoryStore {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let state = self.guard()?;
        Ok(state.users.iter().find(|(u, _)| u.id == id).map(|(u, _)| u.clone()))
    }

    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<User>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .users
            .iter()
            .find(|(u, _)| u.student_id == student_id)
            .map(|(u, _)| u.clone()))
    }

    async fn find_credentials(&self, student_id: &str) -> Result<Option<UserCredentials>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .users
            .iter()
            .find(|(u, _)| u.student_id == student_id)
            .map(|(u, hash)| UserCredentials {
                user: u.clone(),
                password_hash: hash.clone(),
            }))
    }

    async fn seed_user(&self, new: &NewUser, password_hash: Option<String>) -> Result<(User, bool), StoreError> {
        let mut state = self.guard()?;
        if let Some((u, _)) = state.users.iter().find(|(u, _)| u.student_id == new.student_id) {
            return Ok((u.clone(), false));
        }
        let user = User {
            id: UserId(state.users.len() as i64 + 1),
            student_id: new.student_id.clone(),
            group: new.group,
            max_turns: new.max_turns,
            target_turns: new.target_turns,
            consent_agreed: false,
            created_at: Utc::now(),
        };
        state.users.push((user.clone(), password_hash));
        state.writes += 1;
        Ok((user, true))
    }

    async fn update_quota(
        &self,
        student_id: &str,
        max_turns: Option<u32>,
        target_turns: Option<u32>,
    ) -> Result<User, StoreError> {
        let mut state = self.guard()?;
        let (user, _) = state
            .users
            .iter_mut()
            .find(|(u, _)| u.student_id == student_id)
            .ok_or(StoreError::NotFound)?;
        user.max_turns = max_turns;
        user.target_turns = target_turns;
        let user = user.clone();
        state.writes += 1;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.guard()?;
        let mut users: Vec<User> = state.users.iter().map(|(u, _)| u.clone()).collect();
        users.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(users)
    }
}

impl SessionRepository for MemoryStore {
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let state = self.guard()?;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_session(
        &self,
        user_id: UserId,
        topic_id: &str,
        session_date: NaiveDate,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.topic_id == topic_id && s.session_date == session_date)
            .cloned())
    }

    async fn insert_session(&self, new: &NewSession) -> Result<Session, StoreError> {
        let mut state = self.guard()?;
        let exists = state.sessions.iter().any(|s| {
            s.user_id == new.user_id && s.topic_id == new.topic_id && s.session_date == new.session_date
        });
        if exists {
            return Err(StoreError::Conflict("sessions.user_id, topic_id, session_date".to_string()));
        }
        let session = Session {
            id: SessionId(state.sessions.len() as i64 + 1),
            user_id: new.user_id,
            topic_id: new.topic_id.clone(),
            session_date: new.session_date,
            start_time: new.start_time,
            end_time: None,
            turn_count: 0,
            is_completed: false,
            override_active: false,
            satisfaction: None,
        };
        state.sessions.push(session.clone());
        state.writes += 1;
        if state.race_next_insert {
            // Another request won the race: the row exists but this caller sees a conflict.
            state.race_next_insert = false;
            return Err(StoreError::Conflict("sessions.user_id, topic_id, session_date".to_string()));
        }
        Ok(session)
    }

    async fn recount(&self, id: SessionId, respect_override: bool) -> Result<Option<Reconciliation>, StoreError> {
        let mut state = self.guard()?;
        let derived = distinct_user_turns(&state.messages, id);
        let Some(idx) = state.sessions.iter().position(|s| s.id == id) else {
            return Ok(None);
        };
        let session = state.sessions[idx].clone();
        if respect_override && session.override_active {
            return Ok(Some(Reconciliation {
                progress: session.progress(),
                changed: false,
            }));
        }
        let quota = state
            .users
            .iter()
            .find(|(u, _)| u.id == session.user_id)
            .map(|(u, _)| u.quota())
            .ok_or(StoreError::NotFound)?;
        let completed = session.is_completed || quota.is_reached(derived);
        let changed = derived != session.turn_count
            || completed != session.is_completed
            || session.override_active;
        if changed {
            let s = &mut state.sessions[idx];
            s.turn_count = derived;
            s.is_completed = completed;
            s.override_active = false;
            state.writes += 1;
        }
        Ok(Some(Reconciliation {
            progress: Progress {
                turn_count: derived,
                completed,
            },
            changed,
        }))
    }

    async fn apply_override(
        &self,
        id: SessionId,
        progress: Progress,
        end_time: Option<DateTime<FixedOffset>>,
    ) -> Result<Session, StoreError> {
        let mut state = self.guard()?;
        let s = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound)?;
        s.turn_count = progress.turn_count;
        s.is_completed = progress.completed;
        s.override_active = true;
        if s.end_time.is_none() {
            s.end_time = end_time;
        }
        let session = s.clone();
        state.writes += 1;
        Ok(session)
    }

    async fn list_open_sessions(&self, session_date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.session_date == session_date && s.end_time.is_none())
            .cloned()
            .collect())
    }

    async fn stamp_end_time(&self, id: SessionId, end_time: DateTime<FixedOffset>) -> Result<bool, StoreError> {
        let mut state = self.guard()?;
        if state.fail_stamp.contains(&id) {
            return Err(StoreError::Timeout {
                operation: "stamp_end_time",
                after_ms: 1000,
            });
        }
        let Some(s) = state.sessions.iter_mut().find(|s| s.id == id && s.end_time.is_none()) else {
            return Ok(false);
        };
        s.end_time = Some(end_time);
        state.writes += 1;
        Ok(true)
    }

    async fn list_sessions_on(&self, session_date: NaiveDate) -> Result<Vec<Session>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.session_date == session_date)
            .cloned()
            .collect())
    }

    async fn completed_dates(&self, user_id: UserId) -> Result<Vec<NaiveDate>, StoreError> {
        let state = self.guard()?;
        let mut dates: Vec<NaiveDate> = state
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_completed)
            .map(|s| s.session_date)
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }
}

impl MessageRepository for MemoryStore {
    async fn append_user_message(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
        dedup_since: DateTime<Utc>,
        turn_cap: Option<u32>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut state = self.guard()?;
        let same_turn: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| {
                m.session_id == message.session_id
                    && m.role == MessageRole::User
                    && m.turn_index == message.turn_index
            })
            .collect();
        if let Some(existing) = state.messages.iter().find(|m| {
            m.session_id == message.session_id
                && m.role == MessageRole::User
                && m.content == message.content
                && m.created_at >= dedup_since
        }) {
            return Ok(AppendOutcome::Duplicate(existing.clone()));
        }
        if let Some(cap) = turn_cap {
            let turn_count = distinct_user_turns(&state.messages, message.session_id);
            if turn_count >= cap {
                return Ok(AppendOutcome::LimitReached { turn_count });
            }
        }
        let turn_index = if same_turn.is_empty() {
            message.turn_index
        } else {
            state
                .messages
                .iter()
                .filter(|m| m.session_id == message.session_id && m.role == MessageRole::User)
                .map(|m| m.turn_index)
                .max()
                .unwrap_or(0)
                + 1
        };
        let stored = Message {
            id: MessageId(state.messages.len() as i64 + 1),
            session_id: message.session_id,
            role: MessageRole::User,
            turn_index,
            content: message.content.clone(),
            response_time_ms: None,
            created_at: at,
        };
        state.messages.push(stored.clone());
        state.writes += 1;
        Ok(AppendOutcome::Recorded(stored))
    }

    async fn append_ai_message(&self, message: &NewMessage, at: DateTime<Utc>) -> Result<AppendOutcome, StoreError> {
        let mut state = self.guard()?;
        let answered = state.messages.iter().any(|m| {
            m.session_id == message.session_id && m.role == MessageRole::Ai && m.turn_index == message.turn_index
        });
        if answered {
            return Ok(AppendOutcome::Skipped);
        }
        let stored = Message {
            id: MessageId(state.messages.len() as i64 + 1),
            session_id: message.session_id,
            role: MessageRole::Ai,
            turn_index: message.turn_index,
            content: message.content.clone(),
            response_time_ms: message.response_time_ms,
            created_at: at,
        };
        state.messages.push(stored.clone());
        state.writes += 1;
        Ok(AppendOutcome::Recorded(stored))
    }

    async fn count_user_turns(&self, session_id: SessionId) -> Result<u32, StoreError> {
        let state = self.guard()?;
        Ok(distinct_user_turns(&state.messages, session_id))
    }

    async fn next_turn_index(&self, session_id: SessionId) -> Result<u32, StoreError> {
        let state = self.guard()?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.role == MessageRole::User)
            .map(|m| m.turn_index)
            .max()
            .unwrap_or(0)
            + 1)
    }

    async fn list_messages(&self, session_id: SessionId) -> Result<Vec<Message>, StoreError> {
        let state = self.guard()?;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.turn_index, m.role == MessageRole::Ai, m.id));
        Ok(messages)
    }
}

impl SweepRepository for MemoryStore {
    async fn last_run_for(&self, target_date: NaiveDate) -> Result<Option<SweepRun>, StoreError> {
        let state = self.guard()?;
        Ok(state
            .sweep_runs
            .iter()
            .rev()
            .find(|r| r.target_date == target_date)
            .cloned())
    }

    async fn record_run(&self, report: &SweepReport, started_at: DateTime<Utc>) -> Result<SweepRun, StoreError> {
        let mut state = self.guard()?;
        let run = SweepRun {
            id: state.sweep_runs.len() as i64 + 1,
            target_date: report.target_date,
            trigger: report.trigger,
            reset_count: report.reset_count,
            error_count: report.error_count,
            started_at,
            elapsed_ms: report.elapsed_ms,
        };
        state.sweep_runs.push(run.clone());
        Ok(run)
    }
}

/// One scripted step of an upstream response.
#[derive(Clone)]
pub enum Step {
    Chunk(String),
    Pause(Duration),
    Fail(&'static str),
}

/// Upstream that replays a fixed script and records the requests it saw.
#[derive(Clone, Default)]
pub struct ScriptedUpstream {
    script: Arc<Mutex<VecDeque<Vec<Step>>>>,
    refuse: Arc<Mutex<Option<UpstreamError>>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response; each `open` consumes the next queued script.
    pub fn respond(self, steps: Vec<Step>) -> Self {
        self.script.lock().unwrap().push_back(steps);
        self
    }

    /// Make the next `open` fail before any byte arrives.
    pub fn refuse_with(self, err: UpstreamError) -> Self {
        *self.refuse.lock().unwrap() = Some(err);
        self
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// SSE frame carrying one content delta.
pub fn delta_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
    )
}

impl CompletionUpstream for ScriptedUpstream {
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        if let Some(err) = self.refuse.lock().unwrap().take() {
            return Err(err);
        }
        let steps = self.script.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Chunk(text) => yield Ok(Bytes::from(text)),
                    Step::Pause(d) => tokio::time::sleep(d).await,
                    Step::Fail(msg) => {
                        yield Err(UpstreamError::Stream(msg.to_string()));
                        break;
                    }
                }
            }
        }))
    }
}
