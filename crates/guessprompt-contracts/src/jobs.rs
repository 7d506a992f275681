use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::{extract_first, field_paths, JOB_ID_PATHS, STATUS_PATHS};

/// Status string assumed before any status payload has been read.
pub const DEFAULT_STATUS: &str = "PENDING";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Identifier of a submitted job. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    request_id: String,
}

impl JobHandle {
    pub fn new(request_id: impl Into<String>) -> Option<Self> {
        let request_id = request_id.into().trim().to_string();
        if request_id.is_empty() {
            return None;
        }
        Some(Self { request_id })
    }

    /// Reads `request_id`, then `id`, from a submission payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        extract_first(payload, &field_paths(JOB_ID_PATHS)).and_then(Self::new)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
    Unknown,
}

impl JobStatus {
    /// Provider vocabulary is matched case-sensitively.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "COMPLETE" | "COMPLETED" | "SUCCESS" => Self::Complete,
            "FAILED" | "ERROR" => Self::Failed,
            DEFAULT_STATUS => Self::Pending,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Raw status string of a status payload, from the first present of
/// `status`, `state`, `request_status`.
pub fn status_text(payload: &Value) -> String {
    extract_first(payload, &field_paths(STATUS_PATHS))
        .unwrap_or_else(|| DEFAULT_STATUS.to_string())
}
