//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_TRANSFER_SENDCHUNKBYTES, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The `transfer` section carries the protocol tuning knobs (adaptive chunk
//! timeouts, acceptance ratio, pacing). These are policy values observed to
//! work with slow embedded clients, not protocol constants — they are
//! deliberately runtime-configurable.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
    pub collaborators: CollaboratorsConfig,
    pub broadcast: BroadcastConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tuning for inbound chunk assembly and outbound response streaming.
///
/// ## Adaptive timeout schedule (inbound):
/// - `first_chunk_timeout_secs`: wait for the first chunk of a sub-payload.
///   Embedded clients have slow, bursty first-write latency (buffer setup),
///   so this is the longest wait.
/// - `stream_timeout_secs`: per-chunk wait while more than
///   `tail_threshold_bytes` remain outstanding.
/// - `tail_timeout_secs`: per-chunk wait once the remainder is small —
///   bounds the worst-case wait as the transfer winds down.
///
/// ## Partial-transfer tolerance:
/// A short transfer is still handed to processing when strictly more than
/// `min_accept_ratio` of the declared bytes arrived. Best-effort tolerance
/// for lossy embedded links, not a correctness guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Receive timeout for the metadata handshake frame (seconds).
    pub handshake_timeout_secs: u64,
    pub first_chunk_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub tail_timeout_secs: u64,
    /// Remaining-byte count below which the tail timeout applies.
    pub tail_threshold_bytes: u64,
    /// Strict lower bound on received/declared for accepting a short payload.
    pub min_accept_ratio: f64,
    /// Upper bound on the declared audio size (bytes).
    pub max_audio_bytes: u64,
    /// Upper bound on the declared image size (bytes).
    pub max_image_bytes: u64,
    /// Outbound response chunk size (bytes).
    pub send_chunk_bytes: usize,
    /// Pause between outbound chunks so a constrained client can drain its
    /// receive buffer (milliseconds).
    pub send_pacing_ms: u64,
    /// Pause after the response head frame before the first binary chunk
    /// (milliseconds).
    pub head_settle_ms: u64,
}

/// Where media artifacts land on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: String,
}

/// Remote model collaborators (speech-to-text, generation, synthesis).
///
/// All three are OpenAI-style HTTP endpoints under one base URL; the key is
/// normally injected through `APP_COLLABORATORS_APIKEY` or a `.env` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    pub base_url: String,
    pub api_key: String,
    pub stt_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub request_timeout_secs: u64,
}

/// Observer fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// How many recent events are replayed to a late-joining observer.
    pub history_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            transfer: TransferConfig {
                handshake_timeout_secs: 10,
                first_chunk_timeout_secs: 15,
                stream_timeout_secs: 10,
                tail_timeout_secs: 5,
                tail_threshold_bytes: 50_000,
                min_accept_ratio: 0.5,
                max_audio_bytes: 10_000_000,
                max_image_bytes: 10_000_000,
                send_chunk_bytes: 32 * 1024,
                send_pacing_ms: 10,
                head_settle_ms: 100,
            },
            storage: StorageConfig {
                upload_dir: "uploads".to_string(),
            },
            collaborators: CollaboratorsConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                stt_model: "whisper-1".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
                request_timeout_secs: 60,
            },
            broadcast: BroadcastConfig {
                history_capacity: 100,
            },
        }
    }
}

impl TransferConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn first_chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.first_chunk_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn tail_timeout(&self) -> Duration {
        Duration::from_secs(self.tail_timeout_secs)
    }

    pub fn send_pacing(&self) -> Duration {
        Duration::from_millis(self.send_pacing_ms)
    }

    pub fn head_settle(&self) -> Duration {
        Duration::from_millis(self.head_settle_ms)
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST` and `PORT` are honored without the `APP_` prefix for
    /// deployment platforms that inject them directly.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.transfer.max_audio_bytes == 0 {
            return Err(anyhow::anyhow!("Max audio bytes must be greater than 0"));
        }

        if self.transfer.send_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Send chunk size must be greater than 0"));
        }

        if !(0.0..1.0).contains(&self.transfer.min_accept_ratio) {
            return Err(anyhow::anyhow!(
                "Acceptance ratio must be in [0, 1), got {}",
                self.transfer.min_accept_ratio
            ));
        }

        if self.storage.upload_dir.is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.broadcast.history_capacity == 0 {
            return Err(anyhow::anyhow!(
                "Broadcast history capacity must be greater than 0"
            ));
        }

        Ok(())
    }

    /// Apply a partial update from a JSON string (runtime config endpoint).
    ///
    /// Only the fields present in the JSON are changed; the result is
    /// re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(transfer) = partial.get("transfer") {
            if let Some(v) = transfer.get("first_chunk_timeout_secs").and_then(|v| v.as_u64()) {
                self.transfer.first_chunk_timeout_secs = v;
            }
            if let Some(v) = transfer.get("stream_timeout_secs").and_then(|v| v.as_u64()) {
                self.transfer.stream_timeout_secs = v;
            }
            if let Some(v) = transfer.get("tail_timeout_secs").and_then(|v| v.as_u64()) {
                self.transfer.tail_timeout_secs = v;
            }
            if let Some(v) = transfer.get("tail_threshold_bytes").and_then(|v| v.as_u64()) {
                self.transfer.tail_threshold_bytes = v;
            }
            if let Some(v) = transfer.get("min_accept_ratio").and_then(|v| v.as_f64()) {
                self.transfer.min_accept_ratio = v;
            }
            if let Some(v) = transfer.get("max_audio_bytes").and_then(|v| v.as_u64()) {
                self.transfer.max_audio_bytes = v;
            }
            if let Some(v) = transfer.get("max_image_bytes").and_then(|v| v.as_u64()) {
                self.transfer.max_image_bytes = v;
            }
            if let Some(v) = transfer.get("send_chunk_bytes").and_then(|v| v.as_u64()) {
                self.transfer.send_chunk_bytes = v as usize;
            }
            if let Some(v) = transfer.get("send_pacing_ms").and_then(|v| v.as_u64()) {
                self.transfer.send_pacing_ms = v;
            }
        }

        if let Some(collaborators) = partial.get("collaborators") {
            if let Some(v) = collaborators.get("base_url").and_then(|v| v.as_str()) {
                self.collaborators.base_url = v.to_string();
            }
            if let Some(v) = collaborators.get("stt_model").and_then(|v| v.as_str()) {
                self.collaborators.stt_model = v.to_string();
            }
            if let Some(v) = collaborators.get("chat_model").and_then(|v| v.as_str()) {
                self.collaborators.chat_model = v.to_string();
            }
            if let Some(v) = collaborators.get("tts_model").and_then(|v| v.as_str()) {
                self.collaborators.tts_model = v.to_string();
            }
            if let Some(v) = collaborators.get("tts_voice").and_then(|v| v.as_str()) {
                self.collaborators.tts_voice = v.to_string();
            }
        }

        if let Some(broadcast) = partial.get("broadcast") {
            if let Some(v) = broadcast.get("history_capacity").and_then(|v| v.as_u64()) {
                self.broadcast.history_capacity = v as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.transfer.max_audio_bytes, 10_000_000);
        // Image bound mirrors the audio bound
        assert_eq!(config.transfer.max_image_bytes, config.transfer.max_audio_bytes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transfer.min_accept_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.broadcast.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"transfer": {"tail_threshold_bytes": 80000, "send_pacing_ms": 5}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.transfer.tail_threshold_bytes, 80_000);
        assert_eq!(config.transfer.send_pacing_ms, 5);
        // Untouched fields keep their values
        assert_eq!(config.transfer.first_chunk_timeout_secs, 15);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"transfer": {"min_accept_ratio": 1.5}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
