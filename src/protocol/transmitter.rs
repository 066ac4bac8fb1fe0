//! # Response Transmission
//!
//! Streams a finished response artifact back over the originating
//! connection: one JSON head frame describing the outcome, then the
//! artifact's bytes as fixed-size binary chunks with a small pacing delay
//! between writes so a resource-constrained client can drain its receive
//! buffer.
//!
//! A missing artifact is a valid outcome (processing produced no audio):
//! the head frame goes out with `sending_audio: false` and the transaction
//! still completes.

use crate::config::TransferConfig;
use crate::error::ExchangeError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Outbound side of the connection, as the protocol sees it.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), ExchangeError>;
    async fn send_binary(&self, data: Vec<u8>) -> Result<(), ExchangeError>;
}

/// Head frame preceding the (optional) response audio stream.
#[derive(Debug, Serialize)]
pub struct ResponseHead {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub upload_size: u64,
    pub image_received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_size: Option<u64>,
    pub sending_audio: bool,
}

/// Error frame sent on abort, best-effort.
#[derive(Debug, Serialize)]
pub struct ErrorFrame<'a> {
    pub status: &'static str,
    pub message: &'a str,
}

/// Send a structured error frame; failures are swallowed (the connection is
/// likely already gone).
pub async fn send_error_frame<K: FrameSink + ?Sized>(sink: &K, message: &str) {
    let frame = ErrorFrame {
        status: "error",
        message,
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        if sink.send_text(json).await.is_err() {
            debug!("error frame could not be delivered");
        }
    }
}

pub struct ResponseTransmitter<'a> {
    cfg: &'a TransferConfig,
}

impl<'a> ResponseTransmitter<'a> {
    pub fn new(cfg: &'a TransferConfig) -> Self {
        Self { cfg }
    }

    /// Stream the artifact at `path` to the client. Returns whether audio
    /// was actually sent.
    pub async fn send<K: FrameSink + ?Sized>(
        &self,
        sink: &K,
        path: &Path,
        upload_size: u64,
        image_received: bool,
    ) -> Result<bool, ExchangeError> {
        let audio_size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                // No artifact on disk: report and finish without error.
                info!(path = %path.display(), "no response audio generated");
                let head = ResponseHead {
                    status: "ok",
                    message: Some("Processing complete but no audio response".to_string()),
                    upload_size,
                    image_received,
                    audio_size: None,
                    sending_audio: false,
                };
                self.send_head(sink, &head).await?;
                return Ok(false);
            }
        };

        let head = ResponseHead {
            status: "ok",
            message: None,
            upload_size,
            image_received,
            audio_size: Some(audio_size),
            sending_audio: true,
        };
        self.send_head(sink, &head).await?;
        tokio::time::sleep(self.cfg.head_settle()).await;

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ExchangeError::Transmit(format!("opening {:?}: {}", path, e)))?;

        let mut sent: u64 = 0;
        let mut chunk_count = 0usize;
        let mut buf = vec![0u8; self.cfg.send_chunk_bytes];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| ExchangeError::Transmit(format!("reading {:?}: {}", path, e)))?;
            if n == 0 {
                break;
            }
            sink.send_binary(buf[..n].to_vec()).await?;
            sent += n as u64;
            chunk_count += 1;
            tokio::time::sleep(self.cfg.send_pacing()).await;
        }

        info!(bytes = sent, chunks = chunk_count, "response audio sent");
        Ok(true)
    }

    async fn send_head<K: FrameSink + ?Sized>(
        &self,
        sink: &K,
        head: &ResponseHead,
    ) -> Result<(), ExchangeError> {
        let json = serde_json::to_string(head)
            .map_err(|e| ExchangeError::Transmit(format!("serializing head frame: {}", e)))?;
        sink.send_text(json).await
    }
}
