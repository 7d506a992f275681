use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use guessprompt_contracts::extract::{
    extract_first, extract_image_url, field_paths, FAILURE_MESSAGE_PATHS,
};
use guessprompt_contracts::jobs::{
    status_text, GenerationRequest, JobHandle, JobStatus, DEFAULT_STATUS,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::InferenceConfig;
use crate::error::GenerationError;
use crate::transport::{truncate_text, HttpReply, HttpTransport};

const RESPONSE_SNIPPET_CHARS: usize = 512;
const GENERIC_FAILURE_MESSAGE: &str = "Image generation failed";

/// How the status loop ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The status payload already carried the image URL.
    Inline(String),
    /// Complete, but the URL has to be fetched from the result endpoint.
    Ready,
}

enum StatusCheck {
    Payload(Value),
    Transient(String),
}

/// Submit, poll and retrieve against an async-invoke style inference API.
pub struct JobPoller {
    transport: Arc<dyn HttpTransport>,
    config: InferenceConfig,
    api_key: String,
}

impl JobPoller {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: InferenceConfig,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            api_key: api_key.into(),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn generate_image(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let handle = self.submit(request)?;
        match self.poll(&handle)? {
            PollOutcome::Inline(url) => {
                info!(request_id = %handle, "image URL found in status response");
                Ok(url)
            }
            PollOutcome::Ready => self.retrieve(&handle),
        }
    }

    pub fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, GenerationError> {
        let endpoint = self.config.submit_endpoint();
        let payload = json!({
            "model_id": self.config.model_id,
            "input": {
                "prompt": request.prompt,
            },
        });
        debug!(%endpoint, model_id = %self.config.model_id, "submitting generation request");

        let reply = self
            .transport
            .post_json(&endpoint, &self.api_key, &payload)
            .map_err(|err| GenerationError::Submission(format!("{err:#}")))?;
        let parsed = parse_reply(&reply).map_err(GenerationError::Submission)?;
        let handle = JobHandle::from_payload(&parsed).ok_or_else(|| {
            GenerationError::Submission(format!(
                "response missing request_id. Response: {}",
                truncate_text(&parsed.to_string(), RESPONSE_SNIPPET_CHARS)
            ))
        })?;
        info!(request_id = %handle, "generation request accepted");
        Ok(handle)
    }

    /// Runs the status loop. Transport errors, empty bodies and malformed
    /// JSON only cost an attempt; a non-success HTTP status is fatal.
    pub fn poll(&self, handle: &JobHandle) -> Result<PollOutcome, GenerationError> {
        let settings = &self.config.poll;
        let endpoint = self.config.status_endpoint(handle.request_id());
        let started = Instant::now();
        let mut last_status = DEFAULT_STATUS.to_string();
        let mut attempts: u32 = 0;

        while attempts < settings.max_attempts {
            if let Some(deadline) = settings.deadline {
                if started.elapsed() >= deadline {
                    warn!(request_id = %handle, attempts, "polling deadline exceeded");
                    break;
                }
            }
            attempts += 1;
            debug!(
                request_id = %handle,
                attempt = attempts,
                max_attempts = settings.max_attempts,
                "checking job status"
            );

            match self.check_status(&endpoint)? {
                StatusCheck::Transient(reason) => {
                    warn!(request_id = %handle, attempt = attempts, %reason, "status check inconclusive, continuing");
                }
                StatusCheck::Payload(payload) => {
                    last_status = status_text(&payload);
                    debug!(request_id = %handle, status = %last_status, "job status");
                    match JobStatus::normalize(&last_status) {
                        JobStatus::Failed => {
                            let message =
                                extract_first(&payload, &field_paths(FAILURE_MESSAGE_PATHS))
                                    .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
                            return Err(GenerationError::GenerationFailed(message));
                        }
                        JobStatus::Complete => {
                            return Ok(match extract_image_url(&payload) {
                                Some(url) => PollOutcome::Inline(url),
                                None => {
                                    debug!(request_id = %handle, "no inline image URL, fetching result");
                                    PollOutcome::Ready
                                }
                            });
                        }
                        JobStatus::Pending | JobStatus::Unknown => {}
                    }
                }
            }

            if attempts < settings.max_attempts {
                thread::sleep(next_delay(settings.interval, settings.deadline, started));
            }
        }

        Err(GenerationError::Timeout {
            attempts,
            last_status,
        })
    }

    pub fn retrieve(&self, handle: &JobHandle) -> Result<String, GenerationError> {
        let endpoint = self.config.result_endpoint(handle.request_id());
        debug!(request_id = %handle, %endpoint, "retrieving job result");
        let reply = self
            .transport
            .get(&endpoint, &self.api_key)
            .map_err(|err| GenerationError::ResultRetrieval(format!("{err:#}")))?;
        let parsed = parse_reply(&reply).map_err(GenerationError::ResultRetrieval)?;
        let url = extract_image_url(&parsed).ok_or_else(|| {
            warn!(request_id = %handle, body = %parsed, "result payload has no image URL");
            GenerationError::Extraction {
                body: truncate_text(&parsed.to_string(), RESPONSE_SNIPPET_CHARS),
            }
        })?;
        info!(request_id = %handle, "image URL retrieved");
        Ok(url)
    }

    fn check_status(&self, endpoint: &str) -> Result<StatusCheck, GenerationError> {
        let reply = match self.transport.get(endpoint, &self.api_key) {
            Ok(reply) => reply,
            Err(err) => return Ok(StatusCheck::Transient(format!("{err:#}"))),
        };
        if !reply.is_success() {
            return Err(GenerationError::StatusCheck(format!(
                "HTTP {}: {}",
                reply.status,
                truncate_text(&reply.body, RESPONSE_SNIPPET_CHARS)
            )));
        }
        if reply.is_blank() {
            return Ok(StatusCheck::Transient("empty response body".to_string()));
        }
        Ok(match serde_json::from_str::<Value>(&reply.body) {
            Ok(payload) => StatusCheck::Payload(payload),
            Err(err) => StatusCheck::Transient(format!("invalid JSON payload: {err}")),
        })
    }
}

/// Shared rules for submit and result replies: success status, non-blank
/// body, valid JSON.
fn parse_reply(reply: &HttpReply) -> Result<Value, String> {
    if !reply.is_success() {
        return Err(format!(
            "HTTP {}: {}",
            reply.status,
            truncate_text(&reply.body, RESPONSE_SNIPPET_CHARS)
        ));
    }
    if reply.is_blank() {
        return Err("empty response body".to_string());
    }
    serde_json::from_str(&reply.body).map_err(|err| format!("invalid JSON payload: {err}"))
}

fn next_delay(interval: Duration, deadline: Option<Duration>, started: Instant) -> Duration {
    match deadline {
        Some(deadline) => interval.min(deadline.saturating_sub(started.elapsed())),
        None => interval,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use guessprompt_contracts::jobs::{GenerationRequest, JobHandle};
    use serde_json::json;

    use super::{next_delay, JobPoller, PollOutcome};
    use crate::config::{InferenceConfig, PollSettings};
    use crate::error::GenerationError;
    use crate::testing::{result_url, status_url, submit_url, Method, ScriptedTransport, INFERENCE_BASE};

    fn config() -> InferenceConfig {
        InferenceConfig {
            api_base: INFERENCE_BASE.to_string(),
            poll: PollSettings {
                interval: Duration::ZERO,
                ..PollSettings::default()
            },
            ..InferenceConfig::default()
        }
    }

    fn poller(transport: &Arc<ScriptedTransport>) -> JobPoller {
        JobPoller::new(transport.clone(), config(), "test-key")
    }

    fn submitted(transport: ScriptedTransport) -> ScriptedTransport {
        transport.reply(Method::Post, &submit_url(), 200, r#"{"request_id":"req-1"}"#)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("A cat at sunset")
    }

    #[test]
    fn submit_sends_model_and_prompt_with_bearer() -> anyhow::Result<()> {
        let transport = Arc::new(submitted(ScriptedTransport::new()));
        let handle = poller(&transport).submit(&request())?;
        assert_eq!(handle.request_id(), "req-1");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].bearer, "test-key");
        assert_eq!(
            calls[0].body,
            Some(json!({
                "model_id": "fal-ai/flux/schnell",
                "input": {"prompt": "A cat at sunset"},
            }))
        );
        Ok(())
    }

    #[test]
    fn submit_accepts_id_when_request_id_missing() -> anyhow::Result<()> {
        let transport = Arc::new(ScriptedTransport::new().reply(
            Method::Post,
            &submit_url(),
            200,
            r#"{"id":"job-9","status":"QUEUED"}"#,
        ));
        assert_eq!(poller(&transport).submit(&request())?.request_id(), "job-9");
        Ok(())
    }

    #[test]
    fn submit_without_any_id_is_a_submission_error() {
        let transport = Arc::new(ScriptedTransport::new().reply(
            Method::Post,
            &submit_url(),
            200,
            r#"{"status":"QUEUED","request_id":""}"#,
        ));
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        assert!(matches!(err, GenerationError::Submission(_)), "{err}");
        assert!(err.to_string().contains("request_id"));
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 0);
    }

    #[test]
    fn submit_failures_are_fatal() {
        let cases = [
            ScriptedTransport::new().reply(Method::Post, &submit_url(), 401, "unauthorized"),
            ScriptedTransport::new().reply(Method::Post, &submit_url(), 200, "  "),
            ScriptedTransport::new().reply(Method::Post, &submit_url(), 200, "<html>"),
            ScriptedTransport::new().fail(Method::Post, &submit_url(), "connection refused"),
        ];
        for transport in cases {
            let transport = Arc::new(transport);
            let err = poller(&transport).submit(&request()).unwrap_err();
            assert!(matches!(err, GenerationError::Submission(_)), "{err}");
        }
    }

    #[test]
    fn inline_result_skips_result_endpoint() -> anyhow::Result<()> {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"PENDING"}"#)
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"PENDING"}"#)
                .reply(
                    Method::Get,
                    &status_url("req-1"),
                    200,
                    r#"{"status":"COMPLETE","output":{"images":[{"url":"https://cdn.test/a.png"}]}}"#,
                ),
        );
        let url = poller(&transport).generate_image(&request())?;
        assert_eq!(url, "https://cdn.test/a.png");
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 3);
        assert_eq!(transport.count(Method::Get, &result_url("req-1")), 0);
        Ok(())
    }

    #[test]
    fn complete_without_inline_url_fetches_result() -> anyhow::Result<()> {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"state":"COMPLETED"}"#)
                .reply(
                    Method::Get,
                    &result_url("req-1"),
                    200,
                    r#"{"output":{"image":"https://cdn.test/b.png"}}"#,
                ),
        );
        let url = poller(&transport).generate_image(&request())?;
        assert_eq!(url, "https://cdn.test/b.png");
        assert_eq!(transport.count(Method::Get, &result_url("req-1")), 1);
        Ok(())
    }

    #[test]
    fn never_terminal_status_times_out_after_thirty_attempts() {
        let mut transport = submitted(ScriptedTransport::new());
        for _ in 0..30 {
            transport = transport.reply(
                Method::Get,
                &status_url("req-1"),
                200,
                r#"{"status":"IN_PROGRESS"}"#,
            );
        }
        let transport = Arc::new(transport);
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        match err {
            GenerationError::Timeout {
                attempts,
                ref last_status,
            } => {
                assert_eq!(attempts, 30);
                assert_eq!(last_status, "IN_PROGRESS");
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert!(err.to_string().contains("30 attempts"));
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 30);
    }

    #[test]
    fn failed_status_stops_polling_immediately() {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"PENDING"}"#)
                .reply(
                    Method::Get,
                    &status_url("req-1"),
                    200,
                    r#"{"status":"FAILED","error":"NSFW content detected"}"#,
                )
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"COMPLETE"}"#),
        );
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        match &err {
            GenerationError::GenerationFailed(message) => {
                assert_eq!(message, "NSFW content detected")
            }
            other => panic!("expected generation failure, got {other}"),
        }
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 2);
    }

    #[test]
    fn failed_status_without_message_uses_generic_text() {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"ERROR"}"#),
        );
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "image generation failed: Image generation failed"
        );
    }

    #[test]
    fn transient_status_problems_keep_polling() -> anyhow::Result<()> {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .fail(Method::Get, &status_url("req-1"), "connection reset")
                .reply(Method::Get, &status_url("req-1"), 200, "")
                .reply(Method::Get, &status_url("req-1"), 200, "{truncated")
                .reply(
                    Method::Get,
                    &status_url("req-1"),
                    200,
                    r#"{"request_status":"SUCCESS","image_url":"https://cdn.test/c.png"}"#,
                ),
        );
        let url = poller(&transport).generate_image(&request())?;
        assert_eq!(url, "https://cdn.test/c.png");
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 4);
        Ok(())
    }

    #[test]
    fn non_success_status_endpoint_is_fatal() {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"PENDING"}"#)
                .reply(Method::Get, &status_url("req-1"), 404, "job not found")
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"COMPLETE"}"#),
        );
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        assert!(matches!(err, GenerationError::StatusCheck(_)), "{err}");
        assert!(err.to_string().contains("job not found"));
        assert_eq!(transport.count(Method::Get, &status_url("req-1")), 2);
    }

    #[test]
    fn result_without_url_is_an_extraction_error() {
        let transport = Arc::new(
            submitted(ScriptedTransport::new())
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"COMPLETE"}"#)
                .reply(
                    Method::Get,
                    &result_url("req-1"),
                    200,
                    r#"{"output":{"artifacts":[{"uri":"s3://bucket/x.png"}]}}"#,
                ),
        );
        let err = poller(&transport).generate_image(&request()).unwrap_err();
        match err {
            GenerationError::Extraction { body } => assert!(body.contains("s3://bucket/x.png")),
            other => panic!("expected extraction error, got {other}"),
        }
    }

    #[test]
    fn result_endpoint_failures_are_retrieval_errors() {
        let bodies = [(500, "upstream exploded"), (200, ""), (200, "not json")];
        for (status, body) in bodies {
            let transport = Arc::new(
                submitted(ScriptedTransport::new())
                    .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"COMPLETE"}"#)
                    .reply(Method::Get, &result_url("req-1"), status, body),
            );
            let err = poller(&transport).generate_image(&request()).unwrap_err();
            assert!(matches!(err, GenerationError::ResultRetrieval(_)), "{err}");
        }
    }

    #[test]
    fn exhausted_deadline_times_out_before_polling() -> anyhow::Result<()> {
        let transport = Arc::new(ScriptedTransport::new());
        let mut config = config();
        config.poll.deadline = Some(Duration::ZERO);
        let poller = JobPoller::new(transport.clone(), config, "test-key");
        let handle = JobHandle::new("req-1").ok_or_else(|| anyhow::anyhow!("handle"))?;
        match poller.poll(&handle) {
            Err(GenerationError::Timeout {
                attempts,
                last_status,
            }) => {
                assert_eq!(attempts, 0);
                assert_eq!(last_status, "PENDING");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(transport.calls().is_empty());
        Ok(())
    }

    fn pending_statuses(count: usize) -> ScriptedTransport {
        (0..count).fold(ScriptedTransport::new(), |transport, _| {
            transport.reply(
                Method::Get,
                &status_url("req-1"),
                200,
                r#"{"status":"IN_PROGRESS"}"#,
            )
        })
    }

    #[test]
    fn deadline_stops_polling_between_attempts() -> anyhow::Result<()> {
        let transport = Arc::new(pending_statuses(30));
        let mut config = config();
        config.poll.interval = Duration::from_millis(20);
        config.poll.deadline = Some(Duration::from_millis(70));
        let poller = JobPoller::new(transport.clone(), config, "test-key");
        let handle = JobHandle::new("req-1").ok_or_else(|| anyhow::anyhow!("handle"))?;

        match poller.poll(&handle) {
            Err(GenerationError::Timeout {
                attempts,
                last_status,
            }) => {
                assert!(attempts > 0, "polled {attempts} times");
                assert!(attempts < 30, "polled {attempts} times");
                assert_eq!(last_status, "IN_PROGRESS");
                assert_eq!(
                    transport.count(Method::Get, &status_url("req-1")),
                    attempts as usize
                );
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn sleep_is_clipped_to_remaining_deadline() -> anyhow::Result<()> {
        let transport = Arc::new(pending_statuses(5));
        let mut config = config();
        config.poll.interval = Duration::from_secs(10);
        config.poll.deadline = Some(Duration::from_millis(100));
        let poller = JobPoller::new(transport.clone(), config, "test-key");
        let handle = JobHandle::new("req-1").ok_or_else(|| anyhow::anyhow!("handle"))?;

        let started = Instant::now();
        let outcome = poller.poll(&handle);
        let elapsed = started.elapsed();

        assert!(
            matches!(outcome, Err(GenerationError::Timeout { attempts: 1, .. })),
            "unexpected outcome {outcome:?}"
        );
        assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "slept the full interval: {elapsed:?}");
        Ok(())
    }

    #[test]
    fn next_delay_never_exceeds_remaining_budget() {
        let started = Instant::now();
        let interval = Duration::from_secs(3);
        assert_eq!(next_delay(interval, None, started), interval);
        assert!(
            next_delay(interval, Some(Duration::from_millis(50)), started)
                <= Duration::from_millis(50)
        );
        assert_eq!(
            next_delay(interval, Some(Duration::ZERO), started),
            Duration::ZERO
        );
    }

    #[test]
    fn poll_reports_ready_when_complete_without_url() -> anyhow::Result<()> {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(Method::Get, &status_url("req-1"), 200, r#"{"status":"COMPLETE"}"#),
        );
        let handle = JobHandle::new("req-1").ok_or_else(|| anyhow::anyhow!("handle"))?;
        assert_eq!(poller(&transport).poll(&handle)?, PollOutcome::Ready);
        Ok(())
    }
}
