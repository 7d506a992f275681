use std::env;
use std::time::Duration;

pub const DEFAULT_INFERENCE_API_BASE: &str = "https://inference.do-ai.run/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "fal-ai/flux/schnell";
pub const DEFAULT_COMPLETION_API_BASE: &str = "https://api.gradient.ai/v1";
pub const DEFAULT_COMPLETION_MODEL: &str = "openai-gpt-oss-120b";

const API_KEY_ENV_VARS: &[&str] = &["MODEL_ACCESS_KEY", "FAL_AI_API_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Overall budget for the status loop; `None` leaves only the attempt cap.
    pub deadline: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(3000),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub api_base: String,
    pub model_id: String,
    pub poll: PollSettings,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_INFERENCE_API_BASE.to_string(),
            model_id: DEFAULT_IMAGE_MODEL.to_string(),
            poll: PollSettings::default(),
        }
    }
}

impl InferenceConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env(
                "GUESSPROMPT_INFERENCE_API_BASE",
                DEFAULT_INFERENCE_API_BASE,
            ),
            ..Self::default()
        }
    }

    pub fn submit_endpoint(&self) -> String {
        format!("{}/async-invoke", self.api_base)
    }

    pub fn status_endpoint(&self, request_id: &str) -> String {
        format!("{}/async-invoke/{}/status", self.api_base, request_id)
    }

    pub fn result_endpoint(&self, request_id: &str) -> String {
        format!("{}/async-invoke/{}", self.api_base, request_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_COMPLETION_API_BASE.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: 400,
            temperature: 0.9,
        }
    }
}

impl CompletionConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env(
                "GUESSPROMPT_COMPLETION_API_BASE",
                DEFAULT_COMPLETION_API_BASE,
            ),
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportConfig {
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Explicit key first, then `MODEL_ACCESS_KEY`, then `FAL_AI_API_KEY`.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| API_KEY_ENV_VARS.iter().find_map(|key| non_empty_env(key)))
}

fn api_base_from_env(key: &str, default: &str) -> String {
    normalize_api_base(env::var(key).ok().as_deref()).unwrap_or_else(|| default.to_string())
}

fn normalize_api_base(raw: Option<&str>) -> Option<String> {
    raw.map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn poll_defaults_match_provider_budget() {
        let poll = PollSettings::default();
        assert_eq!(poll.max_attempts, 30);
        assert_eq!(poll.interval, Duration::from_millis(3000));
        assert_eq!(poll.deadline, None);
    }

    #[test]
    fn endpoints_are_built_from_api_base() {
        let config = InferenceConfig {
            api_base: "https://inference.test/v1".to_string(),
            ..InferenceConfig::default()
        };
        assert_eq!(config.submit_endpoint(), "https://inference.test/v1/async-invoke");
        assert_eq!(
            config.status_endpoint("req-1"),
            "https://inference.test/v1/async-invoke/req-1/status"
        );
        assert_eq!(
            config.result_endpoint("req-1"),
            "https://inference.test/v1/async-invoke/req-1"
        );
        assert_eq!(
            CompletionConfig::default().endpoint(),
            "https://api.gradient.ai/v1/chat/completions"
        );
    }

    #[test]
    fn api_base_overrides_are_trimmed() {
        assert_eq!(
            normalize_api_base(Some(" https://proxy.test/v1/ ")),
            Some("https://proxy.test/v1".to_string())
        );
        assert_eq!(normalize_api_base(Some("  ")), None);
        assert_eq!(normalize_api_base(None), None);
    }

    #[test]
    fn explicit_api_key_wins_when_non_blank() {
        assert_eq!(resolve_api_key(Some(" key-1 ")), Some("key-1".to_string()));
    }
}
