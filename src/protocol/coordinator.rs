//! # Session Coordination
//!
//! Drives one client transaction end-to-end over its connection:
//!
//! ```text
//! Connected → AwaitingMetadata → (AwaitingImage?) → AwaitingAudio
//!           → Persisting → Processing → AwaitingResponseReady
//!           → SendingResponse → Completed
//! ```
//!
//! Any stage can drop straight to `Aborted`: malformed metadata, an empty
//! required audio stream, a failed audio save, or a collaborator failure.
//! On abort a structured error frame goes to the client if the connection is
//! still writable; a failure of that send is swallowed.
//!
//! Chunk reception runs concurrently across connections; only the
//! collaborator sequence serializes, behind the pipeline gate (the models
//! are a single non-reentrant resource).

use crate::broadcast::{BroadcastEvent, BroadcastHub};
use crate::chat::ChatRegistry;
use crate::config::TransferConfig;
use crate::error::ExchangeError;
use crate::processing::ProcessingPipeline;
use crate::protocol::assembler::{FrameSource, Outcome, PayloadAssembler, RecvEvent};
use crate::protocol::frame::{self, FrameKind, Metadata, ReceiveStage};
use crate::protocol::transmitter::{send_error_frame, FrameSink, ResponseTransmitter};
use crate::storage::{ArtifactKind, MediaStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Terminal state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Completed,
    Aborted,
}

/// Orchestrates one transaction; construct per connection.
pub struct SessionCoordinator {
    txn_id: Uuid,
    cfg: TransferConfig,
    store: Arc<MediaStore>,
    pipeline: Arc<ProcessingPipeline>,
    hub: Arc<BroadcastHub>,
    chat: Arc<ChatRegistry>,
}

impl SessionCoordinator {
    pub fn new(
        cfg: TransferConfig,
        store: Arc<MediaStore>,
        pipeline: Arc<ProcessingPipeline>,
        hub: Arc<BroadcastHub>,
        chat: Arc<ChatRegistry>,
    ) -> Self {
        Self {
            txn_id: Uuid::new_v4(),
            cfg,
            store,
            pipeline,
            hub,
            chat,
        }
    }

    /// Run the transaction to a terminal state.
    pub async fn run<S, K>(&self, source: &mut S, sink: &K) -> TransactionOutcome
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        info!(txn = %self.txn_id, "client connected");
        match self.drive(source, sink).await {
            Ok(()) => {
                info!(txn = %self.txn_id, "transaction complete");
                TransactionOutcome::Completed
            }
            Err(err) => {
                match &err {
                    ExchangeError::Transmit(msg) => {
                        // Connection is unusable; no further client message.
                        warn!(txn = %self.txn_id, error = %msg, "transaction aborted, connection lost");
                    }
                    other => {
                        error!(txn = %self.txn_id, error = %other, "transaction aborted");
                        send_error_frame(sink, &err.client_message()).await;
                    }
                }
                TransactionOutcome::Aborted
            }
        }
    }

    async fn drive<S, K>(&self, source: &mut S, sink: &K) -> Result<(), ExchangeError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        // ---- metadata handshake ----
        let meta = self.await_metadata(source).await?;
        info!(txn = %self.txn_id, image_size = meta.image_size, audio_size = meta.audio_size,
            "metadata accepted");

        let assembler = PayloadAssembler::new(&self.cfg);

        // ---- image sub-payload (optional) ----
        let mut image_bytes: Option<Vec<u8>> = None;
        let mut image_elapsed = None;
        if meta.has_image() {
            let started = Instant::now();
            let assembly = assembler.assemble(meta.image_size, source).await;
            image_elapsed = Some(started.elapsed());

            if assembly.outcome == Outcome::Empty {
                info!(txn = %self.txn_id, "no image data arrived, continuing audio-only");
            } else if !assembly.meets_ratio(meta.image_size, self.cfg.min_accept_ratio) {
                return Err(ExchangeError::Transfer("Incomplete upload".to_string()));
            } else {
                if !frame::jpeg_header_ok(&assembly.data) {
                    warn!(txn = %self.txn_id, "image payload missing JPEG header");
                }
                info!(txn = %self.txn_id, bytes = assembly.data.len(), "image received");
                image_bytes = Some(assembly.data);
            }
        }

        // ---- audio sub-payload (required) ----
        let audio_started = Instant::now();
        let assembly = assembler.assemble(meta.audio_size, source).await;
        let audio_elapsed = audio_started.elapsed();

        if assembly.outcome == Outcome::Empty {
            return Err(ExchangeError::Transfer("No audio data received".to_string()));
        }
        if !assembly.meets_ratio(meta.audio_size, self.cfg.min_accept_ratio) {
            return Err(ExchangeError::Transfer("Incomplete upload".to_string()));
        }
        match frame::wav_declared_len(&assembly.data) {
            Some(declared) => {
                info!(txn = %self.txn_id, bytes = assembly.data.len(), riff_declared = declared,
                    "audio received");
            }
            None => {
                warn!(txn = %self.txn_id, bytes = assembly.data.len(),
                    "audio payload missing RIFF/WAVE header");
            }
        }
        let audio_data = assembly.data;
        let upload_size = audio_data.len() as u64;

        // ---- persistence ----
        let artifact_id = self.store.next_id();

        let mut image_path: Option<PathBuf> = None;
        if let Some(bytes) = &image_bytes {
            // Optional artifact: a failed save degrades to audio-only.
            match self.store.save(ArtifactKind::Image, &artifact_id, bytes).await {
                Ok(path) => image_path = Some(path),
                Err(err) => {
                    warn!(txn = %self.txn_id, error = %err, "image save failed, continuing audio-only");
                }
            }
        }

        let audio_path = self
            .store
            .save(ArtifactKind::Audio, &artifact_id, &audio_data)
            .await?;

        // ---- processing ----
        let response_path = self.store.artifact_path(ArtifactKind::Response, &artifact_id);
        self.chat.ensure_started();

        let processing_started = Instant::now();
        {
            let _gate = self.pipeline.acquire().await;

            let transcript = self.pipeline.transcriber().transcribe(&audio_path).await?;
            info!(txn = %self.txn_id, chars = transcript.len(), "transcription done");
            self.hub.publish(BroadcastEvent::transcription(
                transcript.clone(),
                image_path
                    .as_ref()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .map(String::from),
            ));

            let reply = match &image_path {
                Some(image) => {
                    self.pipeline
                        .generator()
                        .generate_with_image(image, &transcript)
                        .await?
                }
                None => self.pipeline.generator().generate(&transcript).await?,
            };
            info!(txn = %self.txn_id, chars = reply.len(), "reply generated");

            self.pipeline
                .synthesizer()
                .synthesize(&reply, &response_path)
                .await?;

            self.hub.publish(BroadcastEvent::response(
                reply.clone(),
                response_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(String::from),
            ));
            self.chat.record_turn(&transcript, &reply);
        }
        let processing_elapsed = processing_started.elapsed();

        // ---- response ----
        let send_started = Instant::now();
        let transmitter = ResponseTransmitter::new(&self.cfg);
        let sent_audio = transmitter
            .send(sink, &response_path, upload_size, image_path.is_some())
            .await?;
        let send_elapsed = send_started.elapsed();

        info!(
            txn = %self.txn_id,
            image_ms = image_elapsed.map(|d| d.as_millis() as u64).unwrap_or(0),
            audio_ms = audio_elapsed.as_millis() as u64,
            processing_ms = processing_elapsed.as_millis() as u64,
            send_ms = send_elapsed.as_millis() as u64,
            sent_audio,
            "transaction timings"
        );
        Ok(())
    }

    async fn await_metadata<S>(&self, source: &mut S) -> Result<Metadata, ExchangeError>
    where
        S: FrameSource + ?Sized,
    {
        match source.recv(self.cfg.handshake_timeout()).await {
            RecvEvent::Got(msg) => match frame::classify(&msg, ReceiveStage::Handshake) {
                FrameKind::Metadata(text) => {
                    Metadata::parse(text, self.cfg.max_image_bytes, self.cfg.max_audio_bytes)
                }
                _ => Err(ExchangeError::Protocol(
                    "Expected metadata before payload".to_string(),
                )),
            },
            RecvEvent::TimedOut => Err(ExchangeError::Protocol(
                "No metadata received".to_string(),
            )),
            RecvEvent::Closed => Err(ExchangeError::Transmit(
                "connection closed before metadata".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::processing::{ResponseGenerator, SpeechSynthesizer, SpeechToText};
    use crate::protocol::frame::InboundFrame;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedSource {
        events: VecDeque<RecvEvent>,
    }

    impl ScriptedSource {
        fn new(events: Vec<RecvEvent>) -> Self {
            Self {
                events: events.into(),
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn recv(&mut self, _timeout: Duration) -> RecvEvent {
            self.events.pop_front().unwrap_or(RecvEvent::Closed)
        }
    }

    #[derive(Debug, PartialEq)]
    enum SentFrame {
        Text(String),
        Binary(Vec<u8>),
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<SentFrame>>,
    }

    impl RecordingSink {
        fn texts(&self) -> Vec<serde_json::Value> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .filter_map(|f| match f {
                    SentFrame::Text(json) => serde_json::from_str(json).ok(),
                    _ => None,
                })
                .collect()
        }

        fn binary_total(&self) -> usize {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| match f {
                    SentFrame::Binary(data) => data.len(),
                    _ => 0,
                })
                .sum()
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&self, text: String) -> Result<(), ExchangeError> {
            self.frames.lock().unwrap().push(SentFrame::Text(text));
            Ok(())
        }

        async fn send_binary(&self, data: Vec<u8>) -> Result<(), ExchangeError> {
            self.frames.lock().unwrap().push(SentFrame::Binary(data));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTranscriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechToText for FakeTranscriber {
        async fn transcribe(&self, _audio: &Path) -> Result<String, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("what is in front of me".to_string())
        }
    }

    #[derive(Default)]
    struct FakeGenerator {
        image_calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, ExchangeError> {
            Ok(format!("reply to: {}", prompt))
        }

        async fn generate_with_image(
            &self,
            _image: &Path,
            prompt: &str,
        ) -> Result<String, ExchangeError> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("image reply to: {}", prompt))
        }
    }

    struct FakeSynthesizer {
        output: Vec<u8>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, _text: &str, output: &Path) -> Result<(), ExchangeError> {
            tokio::fs::write(output, &self.output)
                .await
                .map_err(|e| ExchangeError::synthesis(e.to_string()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ResponseGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, ExchangeError> {
            Err(ExchangeError::generation("model unavailable"))
        }

        async fn generate_with_image(
            &self,
            _image: &Path,
            _prompt: &str,
        ) -> Result<String, ExchangeError> {
            Err(ExchangeError::generation("model unavailable"))
        }
    }

    struct Harness {
        _tmp: tempfile::TempDir,
        store: Arc<MediaStore>,
        hub: Arc<BroadcastHub>,
        chat: Arc<ChatRegistry>,
        transcriber: Arc<FakeTranscriber>,
        generator: Arc<FakeGenerator>,
    }

    async fn harness() -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MediaStore::bootstrap(tmp.path()).await.unwrap());
        Harness {
            _tmp: tmp,
            store,
            hub: Arc::new(BroadcastHub::new(100)),
            chat: Arc::new(ChatRegistry::new()),
            transcriber: Arc::new(FakeTranscriber::default()),
            generator: Arc::new(FakeGenerator::default()),
        }
    }

    fn fast_cfg() -> TransferConfig {
        let mut cfg = AppConfig::default().transfer;
        cfg.send_pacing_ms = 0;
        cfg.head_settle_ms = 0;
        cfg
    }

    fn coordinator(h: &Harness, response_audio: Vec<u8>) -> SessionCoordinator {
        let pipeline = Arc::new(ProcessingPipeline::new(
            h.transcriber.clone(),
            h.generator.clone(),
            Arc::new(FakeSynthesizer {
                output: response_audio,
            }),
        ));
        SessionCoordinator::new(
            fast_cfg(),
            h.store.clone(),
            pipeline,
            h.hub.clone(),
            h.chat.clone(),
        )
    }

    fn text(s: &str) -> RecvEvent {
        RecvEvent::Got(InboundFrame::Text(s.to_string()))
    }

    fn chunk(data: Vec<u8>) -> RecvEvent {
        RecvEvent::Got(InboundFrame::Binary(data))
    }

    /// A canonical PCM16 mono WAV of exactly `total_len` bytes (44-byte
    /// header plus samples).
    fn wav_bytes(total_len: usize) -> Vec<u8> {
        assert!(total_len >= 44 && (total_len - 44) % 2 == 0);
        let samples = vec![0i16; (total_len - 44) / 2];
        let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, 16_000, 16);
        let mut cursor = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor).unwrap();
        let bytes = cursor.into_inner();
        assert_eq!(bytes.len(), total_len);
        bytes
    }

    #[tokio::test]
    async fn test_audio_only_transaction_completes() {
        // Metadata "0,1024", one 1024-byte RIFF/WAVE chunk, explicit EOF.
        let h = harness().await;
        let coord = coordinator(&h, vec![0x11; 3000]);
        let (_handle, mut events) = h.hub.join();

        let mut source = ScriptedSource::new(vec![
            text("0,1024"),
            chunk(wav_bytes(1024)),
            text("EOF"),
        ]);
        let sink = RecordingSink::default();

        let outcome = coord.run(&mut source, &sink).await;
        assert_eq!(outcome, TransactionOutcome::Completed);

        // Audio artifact persisted at exactly the declared size
        assert_eq!(h.store.count(ArtifactKind::Audio).await, 1);
        let names = h.store.list(ArtifactKind::Audio).await;
        let path = h.store.dir(ArtifactKind::Audio).join(&names[0]);
        assert_eq!(h.store.size(&path).await.unwrap(), 1024);

        // Head frame then response chunks
        let heads = sink.texts();
        assert_eq!(heads[0]["status"], "ok");
        assert_eq!(heads[0]["upload_size"], 1024);
        assert_eq!(heads[0]["image_received"], false);
        assert_eq!(heads[0]["sending_audio"], true);
        assert_eq!(sink.binary_total(), 3000);

        // Both hub events, in order
        assert!(matches!(
            events.try_recv().unwrap(),
            BroadcastEvent::Transcription { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            BroadcastEvent::Response { .. }
        ));

        // Chat session was lazily started and recorded the turn
        assert!(h.chat.is_started());
        assert_eq!(h.chat.turn_count(), 1);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_and_audio_transaction() {
        let h = harness().await;
        let coord = coordinator(&h, vec![0x22; 100]);

        let mut image = vec![0xFF, 0xD8];
        image.resize(512, 0);
        let mut source = ScriptedSource::new(vec![
            text("512,1024"),
            chunk(image),
            chunk(wav_bytes(1024)),
        ]);
        let sink = RecordingSink::default();

        let outcome = coord.run(&mut source, &sink).await;
        assert_eq!(outcome, TransactionOutcome::Completed);

        assert_eq!(h.store.count(ArtifactKind::Image).await, 1);
        assert_eq!(h.generator.image_calls.load(Ordering::SeqCst), 1);
        let heads = sink.texts();
        assert_eq!(heads[0]["image_received"], true);
    }

    #[tokio::test]
    async fn test_oversized_image_declaration_rejected_before_receive() {
        let h = harness().await;
        let coord = coordinator(&h, Vec::new());

        let mut source = ScriptedSource::new(vec![text("2000000000,100")]);
        let sink = RecordingSink::default();

        let outcome = coord.run(&mut source, &sink).await;
        assert_eq!(outcome, TransactionOutcome::Aborted);

        let frames = sink.texts();
        assert_eq!(frames[0]["status"], "error");
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.count(ArtifactKind::Audio).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_metadata_rejected() {
        let h = harness().await;
        let coord = coordinator(&h, Vec::new());

        let mut source = ScriptedSource::new(vec![text("abc,100")]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Aborted
        );
        let frames = sink.texts();
        assert_eq!(frames[0]["status"], "error");
        assert_eq!(frames[0]["message"], "Invalid metadata format");
    }

    #[tokio::test]
    async fn test_partial_below_ratio_aborts_without_processing() {
        // Declared 10000, only 4000 arrive, then silence: 0.4 < 0.5.
        let h = harness().await;
        let coord = coordinator(&h, Vec::new());

        let mut source = ScriptedSource::new(vec![
            text("0,10000"),
            chunk(vec![0u8; 4000]),
            RecvEvent::TimedOut,
        ]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Aborted
        );
        let frames = sink.texts();
        assert_eq!(frames[0]["message"], "Incomplete upload");
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_boundary_exact_half_rejected() {
        let h = harness().await;
        let coord = coordinator(&h, Vec::new());

        let mut source = ScriptedSource::new(vec![
            text("0,10000"),
            chunk(vec![0u8; 5000]),
            RecvEvent::TimedOut,
        ]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Aborted
        );
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_boundary_half_plus_one_accepted() {
        let h = harness().await;
        let coord = coordinator(&h, vec![0x33; 10]);

        let mut source = ScriptedSource::new(vec![
            text("0,10000"),
            chunk(vec![0u8; 5001]),
            RecvEvent::TimedOut,
        ]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Completed
        );
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_audio_aborts() {
        let h = harness().await;
        let coord = coordinator(&h, Vec::new());

        let mut source = ScriptedSource::new(vec![text("0,1024"), RecvEvent::TimedOut]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Aborted
        );
        let frames = sink.texts();
        assert_eq!(frames[0]["message"], "No audio data received");
    }

    #[tokio::test]
    async fn test_missing_image_degrades_to_audio_only() {
        // Image declared but never sent; audio still goes through.
        let h = harness().await;
        let coord = coordinator(&h, vec![0x44; 50]);

        let mut source = ScriptedSource::new(vec![
            text("512,1024"),
            RecvEvent::TimedOut,
            chunk(wav_bytes(1024)),
        ]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Completed
        );
        assert_eq!(h.store.count(ArtifactKind::Image).await, 0);
        assert_eq!(h.generator.image_calls.load(Ordering::SeqCst), 0);
        let heads = sink.texts();
        assert_eq!(heads[0]["image_received"], false);
    }

    #[tokio::test]
    async fn test_collaborator_failure_reports_stage() {
        let h = harness().await;
        let pipeline = Arc::new(ProcessingPipeline::new(
            h.transcriber.clone(),
            Arc::new(FailingGenerator),
            Arc::new(FakeSynthesizer { output: Vec::new() }),
        ));
        let coord = SessionCoordinator::new(
            fast_cfg(),
            h.store.clone(),
            pipeline,
            h.hub.clone(),
            h.chat.clone(),
        );

        let mut source = ScriptedSource::new(vec![text("0,1024"), chunk(wav_bytes(1024))]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Aborted
        );
        let frames = sink.texts();
        let message = frames[0]["message"].as_str().unwrap();
        assert!(message.contains("generation"), "got: {}", message);
        // The upload itself was persisted before processing failed
        assert_eq!(h.store.count(ArtifactKind::Audio).await, 1);
    }

    #[tokio::test]
    async fn test_identical_transactions_produce_distinct_artifacts() {
        let h = harness().await;

        for _ in 0..2 {
            let coord = coordinator(&h, vec![0x55; 20]);
            let mut source =
                ScriptedSource::new(vec![text("0,1024"), chunk(wav_bytes(1024)), text("EOF")]);
            let sink = RecordingSink::default();
            assert_eq!(
                coord.run(&mut source, &sink).await,
                TransactionOutcome::Completed
            );
        }

        let names = h.store.list(ArtifactKind::Audio).await;
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);

        let a = tokio::fs::read(h.store.dir(ArtifactKind::Audio).join(&names[0]))
            .await
            .unwrap();
        let b = tokio::fs::read(h.store.dir(ArtifactKind::Audio).join(&names[1]))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_synthesis_output_reports_no_audio() {
        // Synthesizer writes nothing to disk: transmitter must report
        // sending_audio=false and the transaction still completes.
        struct SilentSynthesizer;

        #[async_trait]
        impl SpeechSynthesizer for SilentSynthesizer {
            async fn synthesize(&self, _text: &str, _output: &Path) -> Result<(), ExchangeError> {
                Ok(())
            }
        }

        let h = harness().await;
        let pipeline = Arc::new(ProcessingPipeline::new(
            h.transcriber.clone(),
            h.generator.clone(),
            Arc::new(SilentSynthesizer),
        ));
        let coord = SessionCoordinator::new(
            fast_cfg(),
            h.store.clone(),
            pipeline,
            h.hub.clone(),
            h.chat.clone(),
        );

        let mut source = ScriptedSource::new(vec![text("0,1024"), chunk(wav_bytes(1024))]);
        let sink = RecordingSink::default();

        assert_eq!(
            coord.run(&mut source, &sink).await,
            TransactionOutcome::Completed
        );
        let heads = sink.texts();
        assert_eq!(heads[0]["sending_audio"], false);
        assert_eq!(sink.binary_total(), 0);
    }
}
