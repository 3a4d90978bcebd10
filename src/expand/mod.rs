//! Query expansion via a generative text service
//!
//! A short query is expanded into several academic-register sentences before
//! embedding, to broaden semantic recall. Expansion failure is never fatal:
//! the retrieval engine falls back to the raw query.

use crate::config::ExpansionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Bounds on the number of generated sentences
pub const MIN_SENTENCES: usize = 3;
pub const MAX_SENTENCES: usize = 10;

/// Trait for query expansion providers
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand `query` into roughly `n` descriptive sentences
    async fn expand(&self, query: &str, n: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize)]
struct ExpandRequest {
    query: String,
    sentences: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ExpandResponse {
    Sentences { sentences: Vec<String> },
    Text { text: String },
}

impl ExpandResponse {
    fn into_sentences(self) -> Vec<String> {
        match self {
            ExpandResponse::Sentences { sentences } => sentences,
            ExpandResponse::Text { text } => text
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }
}

/// Expander backed by an HTTP generative service
pub struct HttpExpander {
    client: Client,
    base_url: Url,
}

impl HttpExpander {
    pub fn new(config: &ExpansionConfig) -> Result<Self> {
        let base_url = Url::parse(&config.service_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl QueryExpander for HttpExpander {
    async fn expand(&self, query: &str, n: usize) -> Result<Vec<String>> {
        let n = clamp_sentence_count(n);
        let url = self
            .base_url
            .join("/v1/expand")
            .map_err(|e| Error::Config(format!("Invalid expansion service URL: {}", e)))?;

        let request = ExpandRequest {
            query: query.to_string(),
            sentences: n,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::QueryExpansion(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::QueryExpansion(e.to_string()))?;

        let parsed: ExpandResponse = response
            .json()
            .await
            .map_err(|e| Error::QueryExpansion(e.to_string()))?;

        let mut sentences = parsed.into_sentences();
        sentences.truncate(n);
        if sentences.is_empty() {
            return Err(Error::QueryExpansion(
                "expansion service returned no sentences".to_string(),
            ));
        }
        Ok(sentences)
    }
}

/// Create an expander based on configuration
pub fn create_expander(config: &ExpansionConfig) -> Result<Box<dyn QueryExpander>> {
    Ok(Box::new(HttpExpander::new(config)?))
}

/// Clamp a requested sentence count into the supported range
pub fn clamp_sentence_count(n: usize) -> usize {
    n.clamp(MIN_SENTENCES, MAX_SENTENCES)
}
