//! In-process fakes for the fetch transport and generative backend.

use crate::api::{Generate, Generation};
use crate::error::{NewsfeedError, Result};
use crate::fetch::Transport;
use crate::models::Usage;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Serves canned pages and records every requested URL. Unknown URLs get a
/// 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| NewsfeedError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Replays a script of backend responses in order. Once the script runs
/// out every call fails with a retryable backend error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Generation>>>,
    prompts: Mutex<Vec<String>>,
    structured: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = Result<Generation>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> Result<Generation> {
        Ok(Generation {
            text: text.to_string(),
            usage: Usage {
                input_tokens,
                output_tokens,
            },
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn structured_calls(&self) -> usize {
        *self.structured.lock().unwrap()
    }
}

impl Generate for ScriptedBackend {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Generation> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if schema.is_some() {
            *self.structured.lock().unwrap() += 1;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NewsfeedError::Backend("script exhausted".into())))
    }
}
