//! Structured logging for pipeline runs.
//!
//! Every event of a run carries the same `session_id` and `stage` fields so a
//! run can be followed in Cloud Logging with a single filter.

use tracing::{error, info, warn};

use hlgen_models::SessionId;

/// Logger bound to one session's pipeline run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    session_id: String,
    stage: &'static str,
}

impl RunLogger {
    pub fn new(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage: "run",
        }
    }

    /// Same session, different stage.
    pub fn stage(&self, stage: &'static str) -> Self {
        Self {
            session_id: self.session_id.clone(),
            stage,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            stage = self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            stage = self.stage,
            "Stage progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            stage = self.stage,
            "Stage warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            stage = self.stage,
            "Stage error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            stage = self.stage,
            "Stage completed: {}", message
        );
    }
}
