//! Recognizer backed by an HTTP model server.
//!
//! The server hosts sequence-tagging models by name. Protocol:
//!
//! - `POST {endpoint}/predict` with `{"model": .., "text": ..}` returns
//!   `{"tokens": [{text, start_pos, end_pos}], "entities": [{text,
//!   start_pos, end_pos, labels: [{value, confidence}]}]}`
//! - `GET {endpoint}/health` answers 2xx when the server is up

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{Recognizer, RecognizerError};
use crate::models::Prediction;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    model: &'a str,
    text: &'a str,
}

/// Client for one model on a model server.
pub struct RemoteRecognizer {
    endpoint: String,
    model: String,
    client: Client,
}

impl RemoteRecognizer {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self, RecognizerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognizerError::Connection(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Recognizer for RemoteRecognizer {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn availability_hint(&self) -> String {
        format!(
            "Model server not reachable at {}. Start it or set NER_ENDPOINT.",
            self.endpoint
        )
    }

    async fn predict(&self, sentence: &str) -> Result<Prediction, RecognizerError> {
        let url = format!("{}/predict", self.endpoint);
        debug!("Predicting {} chars with {}", sentence.len(), self.model);

        let resp = self
            .client
            .post(&url)
            .json(&PredictRequest {
                model: &self.model,
                text: sentence,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RecognizerError::Unavailable(format!("{}: {}", self.endpoint, e))
                } else {
                    RecognizerError::Connection(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RecognizerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<Prediction>()
            .await
            .map_err(|e| RecognizerError::Parse(e.to_string()))
    }
}
