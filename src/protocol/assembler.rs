//! # Payload Assembly
//!
//! Drives chunk reception for one sub-payload (image or audio) against the
//! size declared at handshake, under an adaptive per-chunk timeout schedule.
//!
//! ## Timeout schedule:
//! | condition                       | timeout        |
//! |---------------------------------|----------------|
//! | first chunk of the sub-payload  | long (15s)     |
//! | remaining > tail threshold      | medium (10s)   |
//! | 0 < remaining ≤ tail threshold  | short (5s)     |
//! | remaining ≤ 0                   | stop, complete |
//!
//! Embedded clients stall before their first write (transmit buffer setup)
//! but stream steadily afterwards; shrinking the timeout as the remainder
//! shrinks bounds the worst-case wait while tolerating the initial stall.
//!
//! Timeouts and connection closure are first-class [`RecvEvent`] variants,
//! not error control flow: a timeout mid-stream is an implicit end-of-stream
//! signal and the bytes gathered so far go downstream as a partial result.

use crate::config::TransferConfig;
use crate::protocol::frame::{self, FrameKind, InboundFrame, ReceiveStage};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one receive attempt against the transport.
#[derive(Debug, PartialEq)]
pub enum RecvEvent {
    Got(InboundFrame),
    TimedOut,
    Closed,
}

/// Source of inbound frames with a per-call timeout.
///
/// The production implementation wraps the channel fed by the WebSocket
/// actor; tests script the event sequence directly.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self, timeout: Duration) -> RecvEvent;
}

/// How assembly of a sub-payload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Declared size reached, or the explicit end marker arrived.
    Complete,
    /// Stream went quiet (or closed) with some bytes received.
    Partial,
    /// Stream went quiet (or closed) before any byte arrived.
    Empty,
}

/// An assembled sub-payload and how assembly ended.
#[derive(Debug)]
pub struct Assembly {
    pub data: Vec<u8>,
    pub outcome: Outcome,
}

impl Assembly {
    /// Whether the payload should be handed downstream, given the declared
    /// size and the strict acceptance ratio.
    ///
    /// Anything at or below the ratio is rejected: a stream that stops at
    /// exactly 50% of the declaration fails, one byte more passes. Applies
    /// equally to partials and to short streams closed by an explicit end
    /// marker.
    pub fn meets_ratio(&self, declared: u64, min_ratio: f64) -> bool {
        if self.data.is_empty() {
            return false;
        }
        let received = self.data.len() as u64;
        if received >= declared {
            return true;
        }
        (received as f64) / (declared as f64) > min_ratio
    }
}

/// Assembles one sub-payload per instance.
pub struct PayloadAssembler<'a> {
    cfg: &'a TransferConfig,
}

impl<'a> PayloadAssembler<'a> {
    pub fn new(cfg: &'a TransferConfig) -> Self {
        Self { cfg }
    }

    /// Timeout for the next chunk, or None once the declared size is met.
    pub fn chunk_timeout(&self, received: u64, declared: u64, chunk_count: usize) -> Option<Duration> {
        if received >= declared {
            return None;
        }
        if chunk_count == 0 {
            return Some(self.cfg.first_chunk_timeout());
        }
        let remaining = declared - received;
        if remaining > self.cfg.tail_threshold_bytes {
            Some(self.cfg.stream_timeout())
        } else {
            Some(self.cfg.tail_timeout())
        }
    }

    /// Consume frames until the sub-payload terminates.
    ///
    /// Termination conditions, in priority order:
    /// 1. accumulated bytes ≥ declared size → `Complete`
    /// 2. explicit end marker → `Complete` (even short; callers gate on
    ///    [`Assembly::meets_ratio`])
    /// 3. timeout/closure with zero bytes → `Empty`
    /// 4. timeout/closure with some bytes → `Partial`
    pub async fn assemble<S: FrameSource + ?Sized>(
        &self,
        declared: u64,
        source: &mut S,
    ) -> Assembly {
        let mut data: Vec<u8> = Vec::new();
        let mut chunk_count = 0usize;

        loop {
            let Some(timeout) = self.chunk_timeout(data.len() as u64, declared, chunk_count)
            else {
                debug!(received = data.len(), declared, chunks = chunk_count, "payload complete");
                return Assembly {
                    data,
                    outcome: Outcome::Complete,
                };
            };

            match source.recv(timeout).await {
                RecvEvent::Got(frame) => match frame::classify(&frame, ReceiveStage::Payload) {
                    FrameKind::Chunk(chunk) => {
                        data.extend_from_slice(chunk);
                        chunk_count += 1;
                    }
                    FrameKind::EndMarker => {
                        debug!(received = data.len(), declared, "end marker received");
                        return Assembly {
                            data,
                            outcome: Outcome::Complete,
                        };
                    }
                    FrameKind::Unexpected => {
                        warn!(received = data.len(), "unexpected frame during payload, ignoring");
                    }
                    FrameKind::Metadata(_) => unreachable!("payload stage never yields metadata"),
                },
                RecvEvent::TimedOut | RecvEvent::Closed => {
                    let outcome = if data.is_empty() {
                        Outcome::Empty
                    } else {
                        Outcome::Partial
                    };
                    debug!(received = data.len(), declared, chunks = chunk_count,
                        ?outcome, "payload stream went quiet");
                    return Assembly { data, outcome };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted frame source: pops pre-arranged events, then reports closure.
    pub(crate) struct ScriptedSource {
        pub events: VecDeque<RecvEvent>,
        pub timeouts_seen: Vec<Duration>,
    }

    impl ScriptedSource {
        pub fn new(events: Vec<RecvEvent>) -> Self {
            Self {
                events: events.into(),
                timeouts_seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn recv(&mut self, timeout: Duration) -> RecvEvent {
            self.timeouts_seen.push(timeout);
            self.events.pop_front().unwrap_or(RecvEvent::Closed)
        }
    }

    fn cfg() -> TransferConfig {
        crate::config::AppConfig::default().transfer
    }

    fn chunk(len: usize) -> RecvEvent {
        RecvEvent::Got(InboundFrame::Binary(vec![0xAB; len]))
    }

    #[test]
    fn test_timeout_schedule() {
        let cfg = cfg();
        let assembler = PayloadAssembler::new(&cfg);

        // First chunk gets the long timeout regardless of remainder
        assert_eq!(
            assembler.chunk_timeout(0, 1_000_000, 0),
            Some(Duration::from_secs(15))
        );
        // Large remainder: medium
        assert_eq!(
            assembler.chunk_timeout(100_000, 1_000_000, 3),
            Some(Duration::from_secs(10))
        );
        // Small remainder: short
        assert_eq!(
            assembler.chunk_timeout(960_000, 1_000_000, 30),
            Some(Duration::from_secs(5))
        );
        // Boundary: exactly the threshold remaining is "small"
        assert_eq!(
            assembler.chunk_timeout(950_000, 1_000_000, 30),
            Some(Duration::from_secs(5))
        );
        // Declared size met: stop
        assert_eq!(assembler.chunk_timeout(1_000_000, 1_000_000, 31), None);
    }

    #[tokio::test]
    async fn test_complete_on_declared_size() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![chunk(600), chunk(424)]);
        let assembly = PayloadAssembler::new(&cfg).assemble(1024, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Complete);
        assert_eq!(assembly.data.len(), 1024);
        // First receive waited the long timeout, the second the medium/short
        assert_eq!(source.timeouts_seen[0], Duration::from_secs(15));
        assert_eq!(source.timeouts_seen[1], Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_complete_on_end_marker_even_short() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![
            chunk(800),
            RecvEvent::Got(InboundFrame::Text("EOF".to_string())),
        ]);
        let assembly = PayloadAssembler::new(&cfg).assemble(1024, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Complete);
        assert_eq!(assembly.data.len(), 800);
    }

    #[tokio::test]
    async fn test_empty_on_timeout_without_bytes() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![RecvEvent::TimedOut]);
        let assembly = PayloadAssembler::new(&cfg).assemble(1024, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Empty);
        assert!(assembly.data.is_empty());
    }

    #[tokio::test]
    async fn test_partial_on_timeout_with_bytes() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![chunk(4000), RecvEvent::TimedOut]);
        let assembly = PayloadAssembler::new(&cfg).assemble(10_000, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Partial);
        assert_eq!(assembly.data.len(), 4000);
    }

    #[tokio::test]
    async fn test_partial_on_closed_connection() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![chunk(6000), RecvEvent::Closed]);
        let assembly = PayloadAssembler::new(&cfg).assemble(10_000, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Partial);
        assert_eq!(assembly.data.len(), 6000);
    }

    #[tokio::test]
    async fn test_unexpected_text_is_ignored() {
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![
            RecvEvent::Got(InboundFrame::Text("keepalive".to_string())),
            chunk(1024),
        ]);
        let assembly = PayloadAssembler::new(&cfg).assemble(1024, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Complete);
        assert_eq!(assembly.data.len(), 1024);
    }

    #[tokio::test]
    async fn test_overshoot_still_completes() {
        // A final chunk larger than the remainder is kept whole.
        let cfg = cfg();
        let mut source = ScriptedSource::new(vec![chunk(1000), chunk(100)]);
        let assembly = PayloadAssembler::new(&cfg).assemble(1024, &mut source).await;

        assert_eq!(assembly.outcome, Outcome::Complete);
        assert_eq!(assembly.data.len(), 1100);
    }

    #[test]
    fn test_ratio_boundary_is_strict() {
        let half = Assembly {
            data: vec![0; 5000],
            outcome: Outcome::Partial,
        };
        // Exactly 50%: rejected
        assert!(!half.meets_ratio(10_000, 0.5));

        let just_over = Assembly {
            data: vec![0; 5001],
            outcome: Outcome::Partial,
        };
        // 50% + 1 byte: accepted
        assert!(just_over.meets_ratio(10_000, 0.5));

        let empty = Assembly {
            data: Vec::new(),
            outcome: Outcome::Empty,
        };
        assert!(!empty.meets_ratio(10_000, 0.5));

        let full = Assembly {
            data: vec![0; 10_000],
            outcome: Outcome::Complete,
        };
        assert!(full.meets_ratio(10_000, 0.5));
    }
}
