use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Where a round's prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    Requested,
    Catalog,
}

/// Everything a play session records. Serialized with a `type` tag, e.g.
/// `{"type":"round_started","prompt":"..","source":"catalog"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    SessionStarted {
        stats_dir: String,
        dryrun: bool,
        model_id: String,
    },
    RoundStarted {
        prompt: String,
        source: PromptSource,
    },
    ImageReady {
        image_url: String,
    },
    DecoysReady {
        decoys: Vec<String>,
        offline: bool,
    },
    RoundReady {
        round_id: String,
        options: Vec<String>,
    },
    RoundFailed {
        prompt: String,
        error: String,
    },
    GuessRecorded {
        round_id: String,
        is_correct: bool,
        total_guesses: u64,
        correct_guesses: u64,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::RoundStarted { .. } => "round_started",
            Self::ImageReady { .. } => "image_ready",
            Self::DecoysReady { .. } => "decoys_ready",
            Self::RoundReady { .. } => "round_ready",
            Self::RoundFailed { .. } => "round_failed",
            Self::GuessRecorded { .. } => "guess_recorded",
        }
    }
}

/// One line of `events.jsonl`: the session stamp plus the flattened event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: GameEvent,
}

/// Append-only JSONL log for one play session.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    session_id: String,
    write_lock: Mutex<()>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self, event: GameEvent) -> anyhow::Result<EventRecord> {
        let record = EventRecord {
            session_id: self.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("session log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(record)
    }
}

/// Reads a session log back. Lines that do not parse as events are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<EventRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
