//! # Processing Collaborators
//!
//! The three model capabilities a transaction needs — speech-to-text,
//! response generation, speech synthesis — expressed as trait seams. The
//! coordinator only sees the traits; the concrete backends (remote
//! OpenAI-style HTTP services, `remote` module) are wired up at startup.
//!
//! ## Serialization:
//! The pipeline carries a gate mutex that callers hold across the
//! transcribe → generate → synthesize sequence. The backends stand in for a
//! single non-reentrant model pipeline, so model invocation serializes
//! process-wide while chunk reception for other connections keeps running.
//! Collaborators are assumed to fail fast and deterministically on bad
//! input; nothing here retries.

pub mod remote;

use crate::error::ExchangeError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Converts a stored audio artifact into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, ExchangeError>;
}

/// Produces the reply text, optionally grounded on an image artifact.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ExchangeError>;

    async fn generate_with_image(
        &self,
        image: &Path,
        prompt: &str,
    ) -> Result<String, ExchangeError>;
}

/// Renders reply text into an audio artifact at the given path.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), ExchangeError>;
}

/// The wired collaborator set plus the process-wide serialization gate.
pub struct ProcessingPipeline {
    transcriber: Arc<dyn SpeechToText>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    gate: Mutex<()>,
}

impl ProcessingPipeline {
    pub fn new(
        transcriber: Arc<dyn SpeechToText>,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            gate: Mutex::new(()),
        }
    }

    /// Acquire the model gate. Held for the duration of one transaction's
    /// processing sequence; queued fairly behind other transactions.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub fn transcriber(&self) -> &dyn SpeechToText {
        self.transcriber.as_ref()
    }

    pub fn generator(&self) -> &dyn ResponseGenerator {
        self.generator.as_ref()
    }

    pub fn synthesizer(&self) -> &dyn SpeechSynthesizer {
        self.synthesizer.as_ref()
    }
}
