use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::transport::{HttpReply, HttpTransport};

pub(crate) const INFERENCE_BASE: &str = "https://inference.test/v1";
pub(crate) const COMPLETION_BASE: &str = "https://completion.test/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub bearer: String,
    pub body: Option<Value>,
}

/// Replays queued replies per (method, url) and records every call.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<(Method, String), VecDeque<Result<HttpReply, String>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, method: Method, url: &str, status: u16, body: &str) -> Self {
        self.push(method, url, Ok(HttpReply::new(status, body)))
    }

    pub fn fail(self, method: Method, url: &str, message: &str) -> Self {
        self.push(method, url, Err(message.to_string()))
    }

    fn push(self, method: Method, url: &str, scripted: Result<HttpReply, String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies
                .entry((method, url.to_string()))
                .or_default()
                .push_back(scripted);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && call.url == url)
            .count()
    }

    fn next(&self, method: Method, url: &str, bearer: &str, body: Option<&Value>) -> Result<HttpReply> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method,
                url: url.to_string(),
                bearer: bearer.to_string(),
                body: body.cloned(),
            });
        }
        let scripted = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted transport lock poisoned"))?
            .get_mut(&(method, url.to_string()))
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply for {method:?} {url}")),
        }
    }
}

impl HttpTransport for ScriptedTransport {
    fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<HttpReply> {
        self.next(Method::Post, url, bearer, Some(body))
    }

    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply> {
        self.next(Method::Get, url, bearer, None)
    }
}

pub(crate) fn submit_url() -> String {
    format!("{INFERENCE_BASE}/async-invoke")
}

pub(crate) fn status_url(request_id: &str) -> String {
    format!("{INFERENCE_BASE}/async-invoke/{request_id}/status")
}

pub(crate) fn result_url(request_id: &str) -> String {
    format!("{INFERENCE_BASE}/async-invoke/{request_id}")
}

pub(crate) fn completion_url() -> String {
    format!("{COMPLETION_BASE}/chat/completions")
}
