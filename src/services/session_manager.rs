//! Worker session continuity across iterations.
//!
//! A session carries accumulated context and iteration summaries for one
//! task. Sessions are recreated rather than reused when the worker role
//! changes or the session has sat idle past its expiry. Context merges
//! into the existing map instead of replacing it, so earlier hints survive
//! later updates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{IterationRecord, IterationSummary, SessionConfig, TaskSession};
use crate::domain::DomainResult;

/// Keyed session store with JSON mirroring under `state_dir/sessions/`.
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: SessionConfig,
    state_dir: PathBuf,
    sessions: Arc<RwLock<HashMap<Uuid, TaskSession>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            state_dir: state_dir.into(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch the task's session, reviving it from disk if needed. Creates a
    /// fresh session when none exists, the stored role differs, or the
    /// session has expired.
    #[instrument(skip(self), fields(task_id = %task_id, worker_role))]
    pub async fn get_or_create(&self, task_id: Uuid, worker_role: &str) -> TaskSession {
        let mut sessions = self.sessions.write().await;

        let existing = match sessions.get(&task_id) {
            Some(session) => Some(session.clone()),
            None => self.load_from_disk(task_id).await,
        };

        let session = match existing {
            Some(mut session)
                if session.worker_role == worker_role
                    && !session.is_expired(self.config.expiration()) =>
            {
                session.touch();
                session
            }
            Some(session) => {
                info!(
                    stored_role = %session.worker_role,
                    expired = session.is_expired(self.config.expiration()),
                    "recreating session"
                );
                TaskSession::new(task_id, worker_role)
            }
            None => {
                debug!("creating session");
                TaskSession::new(task_id, worker_role)
            }
        };

        sessions.insert(task_id, session.clone());
        drop(sessions);
        self.persist_logged(&session).await;
        session
    }

    /// Append an iteration summary to the task's session, if one exists.
    #[instrument(skip(self, record), fields(task_id = %task_id, iteration = record.iteration))]
    pub async fn record_iteration(&self, task_id: Uuid, record: &IterationRecord) {
        let summary = IterationSummary::from_record(record);
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&task_id) else {
            warn!(%task_id, "no session to record iteration into");
            return;
        };
        session.push_summary(summary, self.config.max_summaries);
        session.touch();
        let snapshot = session.clone();
        drop(sessions);
        self.persist_logged(&snapshot).await;
    }

    /// Merge context entries into the task's session. Existing keys are
    /// overwritten, unrelated keys survive.
    #[instrument(skip(self, entries), fields(task_id = %task_id, entries = entries.len()))]
    pub async fn store_context(&self, task_id: Uuid, entries: HashMap<String, Value>) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&task_id) else {
            warn!(%task_id, "no session to store context into");
            return;
        };
        session.merge_context(entries);
        session.touch();
        let snapshot = session.clone();
        drop(sessions);
        self.persist_logged(&snapshot).await;
    }

    /// Current session for a task, if one is live in memory.
    pub async fn get(&self, task_id: Uuid) -> Option<TaskSession> {
        self.sessions.read().await.get(&task_id).cloned()
    }

    /// Drop a task's session from memory and disk. Always succeeds.
    #[instrument(skip(self), fields(task_id = %task_id, reason))]
    pub async fn reset(&self, task_id: Uuid, reason: &str) {
        self.sessions.write().await.remove(&task_id);
        let path = self.session_path(task_id);
        if let Err(error) = tokio::fs::remove_file(&path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(%task_id, %error, "failed to remove session file");
            }
        }
        info!(%task_id, reason, "session reset");
    }

    async fn load_from_disk(&self, task_id: Uuid) -> Option<TaskSession> {
        let path = self.session_path(task_id);
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => {
                debug!(%task_id, "revived session from disk");
                Some(session)
            }
            Err(error) => {
                warn!(%task_id, %error, "discarding unreadable session file");
                None
            }
        }
    }

    async fn persist_logged(&self, session: &TaskSession) {
        if let Err(error) = self.persist(session).await {
            warn!(task_id = %session.task_id, %error, "failed to persist session");
        }
    }

    async fn persist(&self, session: &TaskSession) -> DomainResult<()> {
        let path = self.session_path(session.task_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    fn session_path(&self, task_id: Uuid) -> PathBuf {
        self.state_dir.join("sessions").join(format!("{task_id}.json"))
    }

    #[cfg(test)]
    async fn with_session_mut<F: FnOnce(&mut TaskSession)>(&self, task_id: Uuid, f: F) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&task_id) {
            f(session);
        }
    }
}
