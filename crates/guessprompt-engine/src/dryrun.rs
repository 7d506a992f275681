use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::{CompletionConfig, InferenceConfig};
use crate::transport::{HttpReply, HttpTransport};

const DRYRUN_IMAGE_SIZE: u32 = 64;

#[derive(Default)]
struct DryrunJobs {
    prompts: HashMap<String, String>,
    status_checks: HashMap<String, u32>,
}

/// Offline stand-in for both APIs. Jobs complete on their second status
/// check with a solid-colour PNG inlined as a data URL; the completion
/// endpoint is always unavailable.
pub struct DryrunTransport {
    inference: InferenceConfig,
    completion_endpoint: String,
    jobs: Mutex<DryrunJobs>,
}

impl DryrunTransport {
    pub fn new(inference: InferenceConfig, completion: &CompletionConfig) -> Self {
        Self {
            inference,
            completion_endpoint: completion.endpoint(),
            jobs: Mutex::new(DryrunJobs::default()),
        }
    }

    fn submit(&self, body: &Value) -> Result<HttpReply> {
        let prompt = body
            .pointer("/input/prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let request_id = format!("dryrun-{}", &hex::encode(prompt_digest(&prompt))[..16]);
        self.lock()?
            .prompts
            .insert(request_id.clone(), prompt);
        Ok(reply(200, json!({"request_id": request_id, "status": "IN_QUEUE"})))
    }

    fn status(&self, request_id: &str) -> Result<HttpReply> {
        let mut jobs = self.lock()?;
        let Some(prompt) = jobs.prompts.get(request_id).cloned() else {
            return Ok(HttpReply::new(404, "unknown request"));
        };
        let checks = jobs.status_checks.entry(request_id.to_string()).or_default();
        *checks += 1;
        if *checks < 2 {
            return Ok(reply(200, json!({"status": "IN_PROGRESS"})));
        }
        Ok(reply(200, completed_payload(&prompt)?))
    }

    fn result(&self, request_id: &str) -> Result<HttpReply> {
        let prompt = self.lock()?.prompts.get(request_id).cloned();
        match prompt {
            Some(prompt) => Ok(reply(200, completed_payload(&prompt)?)),
            None => Ok(HttpReply::new(404, "unknown request")),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DryrunJobs>> {
        self.jobs
            .lock()
            .map_err(|_| anyhow!("dryrun job table lock poisoned"))
    }
}

impl HttpTransport for DryrunTransport {
    fn post_json(&self, url: &str, _bearer: &str, body: &Value) -> Result<HttpReply> {
        if url == self.inference.submit_endpoint() {
            return self.submit(body);
        }
        if url == self.completion_endpoint {
            return Ok(HttpReply::new(503, "completion backend unavailable in dry-run mode"));
        }
        Ok(HttpReply::new(404, format!("no dry-run route for POST {url}")))
    }

    fn get(&self, url: &str, _bearer: &str) -> Result<HttpReply> {
        let prefix = format!("{}/", self.inference.submit_endpoint());
        let Some(path) = url.strip_prefix(&prefix) else {
            return Ok(HttpReply::new(404, format!("no dry-run route for GET {url}")));
        };
        match path.strip_suffix("/status") {
            Some(request_id) => self.status(request_id),
            None => self.result(path),
        }
    }
}

fn reply(status: u16, payload: Value) -> HttpReply {
    HttpReply::new(status, payload.to_string())
}

fn completed_payload(prompt: &str) -> Result<Value> {
    Ok(json!({
        "status": "COMPLETE",
        "output": {
            "images": [{"url": dryrun_image_data_url(prompt)?}],
        },
    }))
}

fn prompt_digest(prompt: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.finalize().to_vec()
}

/// Solid-colour PNG whose colour is taken from the prompt hash.
pub fn dryrun_image_data_url(prompt: &str) -> Result<String> {
    let digest = prompt_digest(prompt);
    let mut image = RgbImage::new(DRYRUN_IMAGE_SIZE, DRYRUN_IMAGE_SIZE);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([digest[0], digest[1], digest[2]]);
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode dry-run image")?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
}
