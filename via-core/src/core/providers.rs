//! Deterministic analysis providers for offline operation and CI
//!
//! This module provides implementations of the [`Transcriber`] and
//! [`Detector`] capabilities that produce deterministic, reproducible
//! results without model weights, GPUs, or network access.
//!
//! # Providers
//!
//! - [`SignatureTranscriber`] — derives transcript segments from the SHA-256
//!   digest of the video bytes. Same input always yields the same output,
//!   which is exactly the idempotence contract stages must satisfy.
//! - [`SignatureDetector`] — derives labeled detection events the same way.
//! - [`StubTranscriber`] — single placeholder segment, for deployments
//!   without a speech model.
//! - [`StubDetector`] — no detections, for deployments without a vision
//!   model.
//!
//! Model-backed implementations live behind the same traits and register
//! under their own configuration identifiers.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::core::{
    BoundingBox, Detector, DetectionEvent, Result, Transcriber, TranscriptSegment, VideoInput,
};

const NARRATION_LEXICON: [&str; 16] = [
    "scene", "speaker", "describes", "camera", "pans", "across", "room", "crowd", "music",
    "plays", "while", "people", "gather", "outside", "before", "after",
];

const DETECTION_LABELS: [&str; 8] = [
    "person", "car", "dog", "bicycle", "chair", "bottle", "laptop", "tree",
];

fn digest_of(input: &VideoInput) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&input.data);
    hasher.finalize().into()
}

/// A transcriber that derives deterministic segments from the video bytes.
///
/// The content digest seeds segment count, wording, and confidence, so
/// byte-identical inputs always transcribe to identical segments while
/// different videos read differently. Useful for offline pipelines and for
/// exercising the orchestrator's idempotence guarantees.
#[derive(Debug, Clone)]
pub struct SignatureTranscriber {
    /// Nominal length of each produced segment, seconds
    segment_secs: f64,
}

impl SignatureTranscriber {
    /// Create a transcriber producing segments of the given nominal length
    pub fn new(segment_secs: f64) -> Self {
        Self { segment_secs }
    }
}

impl Default for SignatureTranscriber {
    fn default() -> Self {
        Self::new(5.0)
    }
}

#[async_trait]
impl Transcriber for SignatureTranscriber {
    async fn transcribe(&self, video: &VideoInput) -> Result<Vec<TranscriptSegment>> {
        let digest = digest_of(video);
        let count = 3 + (digest[0] % 4) as usize;

        let mut segments = Vec::with_capacity(count);
        for i in 0..count {
            let start = i as f64 * self.segment_secs;
            let words: Vec<&str> = (0..5)
                .map(|w| {
                    let byte = digest[(i * 5 + w) % digest.len()];
                    NARRATION_LEXICON[byte as usize % NARRATION_LEXICON.len()]
                })
                .collect();
            let confidence_byte = digest[(i + 8) % digest.len()];
            segments.push(TranscriptSegment {
                start,
                end: start + self.segment_secs * 0.9,
                text: words.join(" "),
                confidence: 0.5 + (confidence_byte as f32 / 255.0) * 0.5,
            });
        }
        Ok(segments)
    }

    fn name(&self) -> &str {
        "signature-transcriber"
    }
}

/// A detector that derives deterministic labeled events from the video bytes.
#[derive(Debug, Clone, Default)]
pub struct SignatureDetector;

impl SignatureDetector {
    /// Create a new signature detector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Detector for SignatureDetector {
    async fn detect(&self, video: &VideoInput) -> Result<Vec<DetectionEvent>> {
        let digest = digest_of(video);
        let count = 2 + (digest[1] % 5) as usize;

        let mut events = Vec::with_capacity(count);
        for i in 0..count {
            let label_byte = digest[(i * 3) % digest.len()];
            let conf_byte = digest[(i * 3 + 1) % digest.len()];
            let pos_byte = digest[(i * 3 + 2) % digest.len()];
            let start = i as f64 * 3.0;
            events.push(DetectionEvent {
                start,
                end: start + 2.0,
                label: DETECTION_LABELS[label_byte as usize % DETECTION_LABELS.len()].to_string(),
                confidence: 0.25 + (conf_byte as f32 / 255.0) * 0.75,
                bbox: Some(BoundingBox {
                    x: (pos_byte as f32 / 255.0) * 0.5,
                    y: (label_byte as f32 / 255.0) * 0.5,
                    width: 0.25,
                    height: 0.25,
                }),
            });
        }
        Ok(events)
    }

    fn name(&self) -> &str {
        "signature-detector"
    }
}

/// Fallback transcriber that returns a placeholder segment.
#[derive(Debug, Clone, Default)]
pub struct StubTranscriber;

impl StubTranscriber {
    /// Create a new stub transcriber
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _video: &VideoInput) -> Result<Vec<TranscriptSegment>> {
        tracing::warn!("Using stub transcriber - configure a speech model for real transcription");
        Ok(vec![TranscriptSegment {
            start: 0.0,
            end: 5.0,
            text: "[Transcription unavailable: no speech model configured]".to_string(),
            confidence: 0.0,
        }])
    }

    fn name(&self) -> &str {
        "stub-transcriber"
    }
}

/// Fallback detector that returns no detections.
#[derive(Debug, Clone, Default)]
pub struct StubDetector;

impl StubDetector {
    /// Create a new stub detector
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, _video: &VideoInput) -> Result<Vec<DetectionEvent>> {
        tracing::warn!("Using stub detector - configure a vision model for real detections");
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stub-detector"
    }
}
