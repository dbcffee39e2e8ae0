use super::summary::{AllSessionsSummary, SessionSummary};
use super::{
    ErrorRecord, FileLocation, GeneratedContent, SessionStatus, StageExecution, TokenUsageRecord,
    TrackedSession, TrackingDocument,
};
use crate::errors::TrackingError;
use chrono::Utc;
use clipforge_common::TokenUsage;
use fs2::FileExt;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Append-oriented telemetry for the sessions of one pipeline run.
///
/// One store is created per run and handed by `&mut` through the
/// orchestrator into every stage. At most one session is current at a time;
/// every `record_*` call targets it.
#[derive(Debug)]
pub struct TrackingStore {
    path: PathBuf,
    sessions: BTreeMap<String, TrackedSession>,
    current: Option<String>,
}

impl TrackingStore {
    /// Empty store that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sessions: BTreeMap::new(),
            current: None,
        }
    }

    /// Store pre-populated with the sessions already persisted at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TrackingError> {
        let path = path.into();
        let sessions = read_document(&path)?
            .map(|doc| doc.sessions)
            .unwrap_or_default();
        Ok(Self {
            path,
            sessions,
            current: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new session and make it current.
    pub fn start_session(&mut self, params: Map<String, Value>) -> String {
        let id = new_session_id();
        if let Some(previous) = self.current.replace(id.clone()) {
            tracing::warn!(previous = %previous, "starting a session while another is current");
        }
        self.sessions
            .insert(id.clone(), TrackedSession::new(params));
        tracing::info!(session_id = %id, "tracking session started");
        id
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn session(&self, id: &str) -> Option<&TrackedSession> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> &BTreeMap<String, TrackedSession> {
        &self.sessions
    }

    fn current_mut(&mut self) -> Result<&mut TrackedSession, TrackingError> {
        let id = self.current.as_ref().ok_or(TrackingError::NoActiveSession)?;
        self.sessions
            .get_mut(id)
            .ok_or_else(|| TrackingError::SessionNotFound { id: id.clone() })
    }

    /// Append one attempt of `stage` and add its duration to the stage total.
    pub fn record_stage_execution(
        &mut self,
        stage: &str,
        execution: StageExecution,
    ) -> Result<(), TrackingError> {
        let session = self.current_mut()?;
        *session.time_tracking.entry(stage.to_string()).or_default() +=
            execution.duration_seconds;
        session
            .agents
            .entry(stage.to_string())
            .or_default()
            .push(execution);
        Ok(())
    }

    pub fn record_token_usage(
        &mut self,
        model: &str,
        usage: TokenUsage,
    ) -> Result<(), TrackingError> {
        let session = self.current_mut()?;
        session
            .token_usage
            .entry(model.to_string())
            .or_default()
            .push(TokenUsageRecord {
                timestamp: Utc::now(),
                usage,
            });
        Ok(())
    }

    pub fn record_generated_content(
        &mut self,
        content_type: &str,
        data: Value,
    ) -> Result<(), TrackingError> {
        let session = self.current_mut()?;
        session.generated_content.push(GeneratedContent {
            timestamp: Utc::now(),
            content_type: content_type.to_string(),
            data,
        });
        Ok(())
    }

    pub fn record_file_location(
        &mut self,
        file_type: &str,
        path: &str,
        metadata: Value,
    ) -> Result<(), TrackingError> {
        let session = self.current_mut()?;
        session.file_locations.push(FileLocation {
            timestamp: Utc::now(),
            file_type: file_type.to_string(),
            path: path.to_string(),
            metadata,
        });
        Ok(())
    }

    pub fn record_error(&mut self, error: ErrorRecord) -> Result<(), TrackingError> {
        let session = self.current_mut()?;
        session.errors.push(error);
        Ok(())
    }

    /// Seal the current session with `final_result` and persist the store.
    ///
    /// The session is marked `completed` when `final_result.success` is true
    /// and `failed` otherwise.
    pub fn end_session(&mut self, final_result: Value) -> Result<PathBuf, TrackingError> {
        let status = if final_result.get("success").and_then(Value::as_bool) == Some(true) {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        self.seal_current(status, final_result)
    }

    /// Seal the current session as failed after an unhandled error.
    pub fn fail_session(&mut self, message: &str) -> Result<PathBuf, TrackingError> {
        self.record_error(ErrorRecord::new(message))?;
        self.seal_current(
            SessionStatus::Failed,
            json!({ "success": false, "error": message }),
        )
    }

    fn seal_current(
        &mut self,
        status: SessionStatus,
        final_result: Value,
    ) -> Result<PathBuf, TrackingError> {
        let id = self.current.clone().ok_or(TrackingError::NoActiveSession)?;
        let session = self.current_mut()?;
        session
            .seal(status)
            .map_err(|from| TrackingError::InvalidTransition {
                id: id.clone(),
                from,
                to: status,
            })?;
        session.final_result = Some(final_result);
        let duration = session.total_duration_seconds.unwrap_or_default();
        self.current = None;
        tracing::info!(session_id = %id, status = %status, duration, "tracking session sealed");
        self.persist()
    }

    /// Merge the in-memory sessions into the document at `path` and write it.
    ///
    /// Sessions already on disk that this store does not know about are kept.
    /// The read-merge-write cycle runs under an exclusive lock on a sibling
    /// `.lock` file.
    pub fn persist(&self) -> Result<PathBuf, TrackingError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| TrackingError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let lock_path = self.path.with_extension("lock");
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| TrackingError::Io {
                path: lock_path.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&lock_file).map_err(|source| TrackingError::Io {
            path: lock_path.clone(),
            source,
        })?;

        let written = self.merge_and_write();
        if let Err(e) = FileExt::unlock(&lock_file) {
            tracing::warn!(path = %lock_path.display(), error = %e, "failed to release tracking lock");
        }
        written?;
        Ok(self.path.clone())
    }

    fn merge_and_write(&self) -> Result<(), TrackingError> {
        let mut sessions = read_document(&self.path)?
            .map(|doc| doc.sessions)
            .unwrap_or_default();
        for (id, session) in &self.sessions {
            sessions.insert(id.clone(), session.clone());
        }
        let document = TrackingDocument::new(sessions);
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, json).map_err(|source| TrackingError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn session_summary(&self, id: &str) -> Option<SessionSummary> {
        self.sessions
            .get(id)
            .map(|session| SessionSummary::from_session(id, session))
    }

    pub fn all_sessions_summary(&self) -> AllSessionsSummary {
        AllSessionsSummary::from_sessions(&self.sessions)
    }
}

fn read_document(path: &Path) -> Result<Option<TrackingDocument>, TrackingError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Time-ordered session id: `YYYYMMDD_HHMMSS_<8 hex>`.
fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}
