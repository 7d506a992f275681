use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const GUESSES_FILE: &str = "guesses.json";
const STATS_FILE: &str = "stats.json";

/// One playable round: the generated image, the real prompt and the four
/// shuffled options shown to the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRound {
    pub id: String,
    pub image_url: String,
    pub actual_prompt: String,
    pub prompt_options: Vec<String>,
    pub created_at: String,
}

impl GameRound {
    pub fn new(image_url: String, actual_prompt: String, prompt_options: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image_url,
            actual_prompt,
            prompt_options,
            created_at: now_utc_iso(),
        }
    }

    pub fn guess(&self, guessed_prompt: &str) -> Guess {
        Guess {
            image_id: self.id.clone(),
            guessed_prompt: guessed_prompt.to_string(),
            actual_prompt: self.actual_prompt.clone(),
            is_correct: guessed_prompt == self.actual_prompt,
            timestamp: now_utc_iso(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    pub image_id: String,
    pub guessed_prompt: String,
    pub actual_prompt: String,
    pub is_correct: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_guesses: u64,
    pub correct_guesses: u64,
    /// Percentage in `0.0..=100.0`.
    pub accuracy: f64,
}

impl GameStats {
    pub fn record(&mut self, is_correct: bool) {
        self.total_guesses += 1;
        if is_correct {
            self.correct_guesses += 1;
        }
        self.accuracy = if self.total_guesses > 0 {
            self.correct_guesses as f64 / self.total_guesses as f64 * 100.0
        } else {
            0.0
        };
    }
}

/// Guess history and running stats kept as two JSON files in one directory.
#[derive(Debug, Clone)]
pub struct StatsStore {
    dir: PathBuf,
}

impl StatsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn guesses(&self) -> Vec<Guess> {
        read_json(&self.dir.join(GUESSES_FILE))
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> GameStats {
        read_json(&self.dir.join(STATS_FILE))
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn record(&self, guess: &Guess) -> anyhow::Result<GameStats> {
        let mut guesses = self.guesses();
        guesses.push(guess.clone());
        write_json(
            &self.dir.join(GUESSES_FILE),
            &serde_json::to_value(&guesses)?,
        )?;

        let mut stats = self.stats();
        stats.record(guess.is_correct);
        write_json(&self.dir.join(STATS_FILE), &serde_json::to_value(stats)?)?;
        Ok(stats)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        for name in [GUESSES_FILE, STATS_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_json(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
