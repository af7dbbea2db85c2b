use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::error::MirrorError;

/// Resolves remote `@context` references to their JSON documents.
pub trait ContextLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<Value, MirrorError>;
}

/// Fetches contexts over HTTP and keeps them for the life of the process.
pub struct HttpContextLoader {
    client: Client,
    cache: Mutex<HashMap<String, Value>>,
}

impl HttpContextLoader {
    pub fn new(timeout: Duration) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ldes-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/ld+json, application/json;q=0.9"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn fetch(&self, url: &str) -> Result<Value, MirrorError> {
        let context_error = |message: String| MirrorError::ContextLoad {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| context_error(err.to_string()))?;
        if !response.status().is_success() {
            return Err(context_error(format!("status {}", response.status().as_u16())));
        }
        response.json().map_err(|err| context_error(err.to_string()))
    }
}

impl ContextLoader for HttpContextLoader {
    fn load(&self, url: &str) -> Result<Value, MirrorError> {
        if let Some(document) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            return Ok(document.clone());
        }
        debug!(url, "fetching JSON-LD context");
        let document = self.fetch(url)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), document.clone());
        Ok(document)
    }
}

/// Serves a fixed set of context documents; anything else is an error.
#[derive(Debug, Clone, Default)]
pub struct StaticContextLoader {
    documents: HashMap<String, Value>,
}

impl StaticContextLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, document: Value) -> Self {
        self.documents.insert(url.into(), document);
        self
    }
}

impl ContextLoader for StaticContextLoader {
    fn load(&self, url: &str) -> Result<Value, MirrorError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::ContextLoad {
                url: url.to_string(),
                message: "context not available offline".to_string(),
            })
    }
}
