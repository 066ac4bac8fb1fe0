//! # Frame Classification
//!
//! Stateless inspection of inbound messages. Classification depends on the
//! receive stage: before any chunk arrives a text message is metadata, while
//! during chunk reception text is either the end-of-stream token or noise.
//!
//! Container header checks (RIFF/WAVE for audio, JPEG SOI for images) also
//! live here. They are advisory: truncated-but-usable audio beats a hard
//! failure on this class of client, so a bad header is logged, not fatal.

use crate::error::ExchangeError;
use byteorder::{ByteOrder, LittleEndian};

/// Text token a client may send to close an audio stream early.
pub const END_OF_STREAM_TOKEN: &str = "EOF";

/// A message as delivered by the transport, already detached from actix types.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Where the transaction currently is, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStage {
    /// Awaiting the size declaration; text is metadata here.
    Handshake,
    /// Receiving a sub-payload; binary is a chunk, text is EOF or noise.
    Payload,
}

/// Classification result for one inbound frame.
#[derive(Debug, PartialEq)]
pub enum FrameKind<'a> {
    /// Unparsed metadata text (handshake stage only).
    Metadata(&'a str),
    /// A non-empty binary payload chunk.
    Chunk(&'a [u8]),
    /// The explicit end-of-stream token.
    EndMarker,
    /// Anything that doesn't fit the stage; logged and ignored by callers.
    Unexpected,
}

/// Tag an inbound frame according to the current stage.
pub fn classify<'a>(frame: &'a InboundFrame, stage: ReceiveStage) -> FrameKind<'a> {
    match (stage, frame) {
        (ReceiveStage::Handshake, InboundFrame::Text(text)) => FrameKind::Metadata(text),
        (ReceiveStage::Handshake, InboundFrame::Binary(_)) => FrameKind::Unexpected,
        (ReceiveStage::Payload, InboundFrame::Binary(data)) if !data.is_empty() => {
            FrameKind::Chunk(data)
        }
        (ReceiveStage::Payload, InboundFrame::Binary(_)) => FrameKind::Unexpected,
        (ReceiveStage::Payload, InboundFrame::Text(text)) if text == END_OF_STREAM_TOKEN => {
            FrameKind::EndMarker
        }
        (ReceiveStage::Payload, InboundFrame::Text(_)) => FrameKind::Unexpected,
    }
}

/// Parsed and validated size declaration from the handshake frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub image_size: u64,
    pub audio_size: u64,
}

impl Metadata {
    /// Parse `"<image_size>,<audio_size>"` and enforce the declared bounds.
    ///
    /// Malformed metadata is a hard failure: wrong field count, non-integer
    /// fields, `audio_size` outside `(0, max_audio]`, or `image_size` above
    /// `max_image` all abort the transaction before any chunk is read.
    pub fn parse(text: &str, max_image: u64, max_audio: u64) -> Result<Self, ExchangeError> {
        let mut parts = text.split(',');
        let (Some(image_field), Some(audio_field), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ExchangeError::Protocol(
                "Invalid metadata format".to_string(),
            ));
        };

        let image_size: u64 = image_field
            .trim()
            .parse()
            .map_err(|_| ExchangeError::Protocol("Invalid metadata format".to_string()))?;
        let audio_size: u64 = audio_field
            .trim()
            .parse()
            .map_err(|_| ExchangeError::Protocol("Invalid metadata format".to_string()))?;

        if audio_size == 0 || audio_size > max_audio {
            return Err(ExchangeError::Protocol(format!(
                "Invalid audio size: {}",
                audio_size
            )));
        }

        if image_size > max_image {
            return Err(ExchangeError::Protocol(format!(
                "Invalid image size: {}",
                image_size
            )));
        }

        Ok(Self {
            image_size,
            audio_size,
        })
    }

    pub fn has_image(&self) -> bool {
        self.image_size > 0
    }
}

/// Check for a leading RIFF/WAVE container header.
pub fn wav_header_ok(data: &[u8]) -> bool {
    data.len() >= 44 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// The RIFF-declared payload length, for diagnostics on a verified header.
pub fn wav_declared_len(data: &[u8]) -> Option<u64> {
    if wav_header_ok(data) {
        Some(LittleEndian::read_u32(&data[4..8]) as u64 + 8)
    } else {
        None
    }
}

/// Check for the JPEG start-of-image marker.
pub fn jpeg_header_ok(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}
