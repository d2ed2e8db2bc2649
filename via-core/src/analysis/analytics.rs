//! Derived analytics over completed analysis results
//!
//! Pure functions over the stored transcript and detections: object
//! frequency, label co-occurrence inside a time window around each
//! transcript segment, and a keyword-heuristic sentiment trend. Computed by
//! the result assembler at read time, never persisted, so they always agree
//! with the artifacts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{DetectionEvent, TranscriptSegment};

const POSITIVE_KEYWORDS: [&str; 6] = ["good", "great", "excellent", "happy", "success", "win"];
const NEGATIVE_KEYWORDS: [&str; 6] = ["bad", "poor", "sad", "fail", "loss", "danger"];

/// How often one object label was detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFrequency {
    /// Object class label
    pub label: String,
    /// Number of detection events carrying the label
    pub count: usize,
}

/// Two labels detected within the same transcript window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrence {
    /// The label pair, lexicographically ordered
    pub labels: Vec<String>,
    /// Number of windows the pair appeared in together
    pub count: usize,
}

/// Sentiment estimate for one transcript segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPoint {
    /// Segment start, seconds
    pub timestamp: f64,
    /// Heuristic sentiment score in [-1.0, 1.0]
    pub sentiment: f32,
}

/// Derived analytics exposed alongside the result bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBundle {
    /// Detection label counts, most frequent first
    pub object_frequency: Vec<ObjectFrequency>,
    /// Label pairs sharing transcript windows, most frequent first
    pub co_occurrence: Vec<CoOccurrence>,
    /// Per-segment sentiment estimates, in transcript order
    pub sentiment_trend: Vec<SentimentPoint>,
}

/// Count detection events per label, most frequent first
pub fn object_frequency(detections: &[DetectionEvent]) -> Vec<ObjectFrequency> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for event in detections {
        *counts.entry(event.label.as_str()).or_default() += 1;
    }
    let mut frequencies: Vec<ObjectFrequency> = counts
        .into_iter()
        .map(|(label, count)| ObjectFrequency {
            label: label.to_string(),
            count,
        })
        .collect();
    frequencies.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
    frequencies
}

/// Count label pairs detected inside the same transcript window
///
/// A detection belongs to a segment's window when its time range overlaps
/// `[start - window/2, end + window/2]`.
pub fn co_occurrence(
    transcript: &[TranscriptSegment],
    detections: &[DetectionEvent],
    window: f64,
) -> Vec<CoOccurrence> {
    let mut pair_counts: IndexMap<(String, String), usize> = IndexMap::new();
    for segment in transcript {
        let window_start = segment.start - window / 2.0;
        let window_end = segment.end + window / 2.0;
        let mut labels: Vec<&str> = detections
            .iter()
            .filter(|d| d.start <= window_end && d.end >= window_start)
            .map(|d| d.label.as_str())
            .collect();
        labels.sort_unstable();
        labels.dedup();

        for i in 0..labels.len() {
            for j in (i + 1)..labels.len() {
                let key = (labels[i].to_string(), labels[j].to_string());
                *pair_counts.entry(key).or_default() += 1;
            }
        }
    }
    let mut pairs: Vec<CoOccurrence> = pair_counts
        .into_iter()
        .map(|((a, b), count)| CoOccurrence {
            labels: vec![a, b],
            count,
        })
        .collect();
    pairs.sort_by(|a, b| b.count.cmp(&a.count).then(a.labels.cmp(&b.labels)));
    pairs
}

/// Keyword-heuristic sentiment estimation per transcript segment
pub fn sentiment_trend(transcript: &[TranscriptSegment]) -> Vec<SentimentPoint> {
    transcript
        .iter()
        .map(|segment| {
            let lowered = segment.text.to_lowercase();
            let words: Vec<&str> = lowered.split_whitespace().collect();
            let mut score = 0.0;
            if words.iter().any(|w| POSITIVE_KEYWORDS.contains(w)) {
                score += 0.6;
            }
            if words.iter().any(|w| NEGATIVE_KEYWORDS.contains(w)) {
                score -= 0.6;
            }
            SentimentPoint {
                timestamp: segment.start,
                sentiment: score,
            }
        })
        .collect()
}

/// Build the full analytics bundle
pub fn build_analytics(
    transcript: &[TranscriptSegment],
    detections: &[DetectionEvent],
    window: f64,
) -> AnalyticsBundle {
    AnalyticsBundle {
        object_frequency: object_frequency(detections),
        co_occurrence: co_occurrence(transcript, detections, window),
        sentiment_trend: sentiment_trend(transcript),
    }
}
