//! # Remote Model Backends
//!
//! OpenAI-style HTTP implementations of the collaborator traits, sharing one
//! `reqwest` client and base URL:
//!
//! - speech-to-text: multipart upload to `/audio/transcriptions`
//! - generation: `/chat/completions`, with the image attached as a base64
//!   data URL when present
//! - synthesis: `/audio/speech`, response body written to the artifact path
//!
//! Upstream failures surface as `ProcessingError` with the stage attached;
//! the caller aborts the transaction, it never retries here.

use crate::config::CollaboratorsConfig;
use crate::error::ExchangeError;
use crate::processing::{ResponseGenerator, SpeechSynthesizer, SpeechToText};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

fn build_client(cfg: &CollaboratorsConfig) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("building HTTP client: {}", e))
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Speech-to-text over `/audio/transcriptions`.
pub struct RemoteTranscriber {
    client: Client,
    cfg: CollaboratorsConfig,
}

impl RemoteTranscriber {
    pub fn new(cfg: CollaboratorsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(&cfg)?,
            cfg,
        })
    }
}

#[async_trait]
impl SpeechToText for RemoteTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, ExchangeError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| ExchangeError::transcription(format!("reading {:?}: {}", audio, e)))?;

        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ExchangeError::transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.cfg.stt_model.clone());

        let res = self
            .client
            .post(endpoint(&self.cfg.base_url, "audio/transcriptions"))
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExchangeError::transcription(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ExchangeError::transcription(format!(
                "upstream {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| ExchangeError::transcription(e.to_string()))?;
        let text = body["text"].as_str().unwrap_or("").to_string();
        debug!(chars = text.len(), "transcription received");
        Ok(text)
    }
}

/// Reply generation over `/chat/completions`.
pub struct RemoteGenerator {
    client: Client,
    cfg: CollaboratorsConfig,
}

impl RemoteGenerator {
    pub fn new(cfg: CollaboratorsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(&cfg)?,
            cfg,
        })
    }

    async fn complete(&self, content: serde_json::Value) -> Result<String, ExchangeError> {
        let payload = json!({
            "model": self.cfg.chat_model,
            "messages": [{"role": "user", "content": content}],
        });

        let res = self
            .client
            .post(endpoint(&self.cfg.base_url, "chat/completions"))
            .bearer_auth(&self.cfg.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExchangeError::generation(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ExchangeError::generation(format!(
                "upstream {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| ExchangeError::generation(e.to_string()))?;
        let reply = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if reply.is_empty() {
            return Err(ExchangeError::generation("empty completion"));
        }
        debug!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl ResponseGenerator for RemoteGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ExchangeError> {
        self.complete(json!(prompt)).await
    }

    async fn generate_with_image(
        &self,
        image: &Path,
        prompt: &str,
    ) -> Result<String, ExchangeError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| ExchangeError::generation(format!("reading {:?}: {}", image, e)))?;
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&bytes));

        let content = json!([
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": data_url}},
        ]);
        self.complete(content).await
    }
}

/// Speech synthesis over `/audio/speech`.
pub struct RemoteSynthesizer {
    client: Client,
    cfg: CollaboratorsConfig,
}

impl RemoteSynthesizer {
    pub fn new(cfg: CollaboratorsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(&cfg)?,
            cfg,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), ExchangeError> {
        let payload = json!({
            "model": self.cfg.tts_model,
            "voice": self.cfg.tts_voice,
            "input": text,
            "response_format": "wav",
        });

        let res = self
            .client
            .post(endpoint(&self.cfg.base_url, "audio/speech"))
            .bearer_auth(&self.cfg.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExchangeError::synthesis(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ExchangeError::synthesis(format!(
                "upstream {}: {}",
                status, body
            )));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| ExchangeError::synthesis(e.to_string()))?;
        tokio::fs::write(output, &bytes)
            .await
            .map_err(|e| ExchangeError::synthesis(format!("writing {:?}: {}", output, e)))?;
        debug!(bytes = bytes.len(), path = %output.display(), "response audio written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join_handles_trailing_slash() {
        assert_eq!(
            endpoint("https://api.example.com/v1/", "audio/speech"),
            "https://api.example.com/v1/audio/speech"
        );
        assert_eq!(
            endpoint("https://api.example.com/v1", "chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
