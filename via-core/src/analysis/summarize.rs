//! Summarizer implementations
//!
//! Both implementations work purely from the merged timeline they receive,
//! which keeps the summarization stage idempotent. Model-backed summarizers
//! implement the same [`Summarizer`] trait and register under their own
//! configuration identifiers.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::core::{MergedEntry, MergedPayload, Result, Summarizer, SummaryResult};

/// Extractive summarizer over the merged timeline
///
/// Selects the leading transcript lines as the narrative and the most
/// frequent detection labels as highlights. Deterministic and offline; the
/// default summarizer when no language model is configured.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    /// Number of transcript lines quoted in the summary text
    max_lines: usize,
    /// Number of detection labels surfaced as highlights
    max_highlights: usize,
}

impl ExtractiveSummarizer {
    /// Create a summarizer with explicit extraction limits
    pub fn new(max_lines: usize, max_highlights: usize) -> Self {
        Self {
            max_lines,
            max_highlights,
        }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(3, 5)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, timeline: &[MergedEntry]) -> Result<SummaryResult> {
        let mut lines = Vec::new();
        let mut label_counts: IndexMap<&str, usize> = IndexMap::new();
        for entry in timeline {
            match &entry.payload {
                MergedPayload::Transcript(segment) => {
                    if lines.len() < self.max_lines && !segment.text.trim().is_empty() {
                        lines.push(segment.text.trim().to_string());
                    }
                },
                MergedPayload::Detection(event) => {
                    *label_counts.entry(event.label.as_str()).or_default() += 1;
                },
            }
        }

        if lines.is_empty() && label_counts.is_empty() {
            return Ok(SummaryResult {
                text: "No analyzable content was found in this video.".to_string(),
                highlights: Vec::new(),
            });
        }

        let mut ranked: Vec<(&str, usize)> = label_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let highlights: Vec<String> = ranked
            .iter()
            .take(self.max_highlights)
            .map(|(label, count)| format!("{label} ({count})"))
            .collect();

        let mut text = String::new();
        if !lines.is_empty() {
            text.push_str(&lines.join(" "));
        } else {
            text.push_str("No speech was transcribed.");
        }
        if !highlights.is_empty() {
            text.push_str(" Notable detections: ");
            text.push_str(&highlights.join(", "));
            text.push('.');
        }

        Ok(SummaryResult { text, highlights })
    }

    fn name(&self) -> &str {
        "extractive-summarizer"
    }
}

/// Fallback summarizer returning a placeholder result
#[derive(Debug, Clone, Default)]
pub struct StubSummarizer;

impl StubSummarizer {
    /// Create a new stub summarizer
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, timeline: &[MergedEntry]) -> Result<SummaryResult> {
        tracing::warn!("Using stub summarizer - configure a language model for real summaries");
        let first_line = timeline.iter().find_map(|entry| match &entry.payload {
            MergedPayload::Transcript(segment) => Some(segment.text.clone()),
            _ => None,
        });
        let text = match first_line {
            Some(line) => format!(
                "Summary unavailable: no language model configured. First transcript segment: '{}'",
                line.chars().take(120).collect::<String>()
            ),
            None => "Summary unavailable: no language model configured.".to_string(),
        };
        Ok(SummaryResult {
            text,
            highlights: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "stub-summarizer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DetectionEvent, TranscriptSegment};

    fn transcript_entry(start: f64, text: &str) -> MergedEntry {
        MergedEntry {
            timestamp: start,
            payload: MergedPayload::Transcript(TranscriptSegment {
                start,
                end: start + 5.0,
                text: text.to_string(),
                confidence: 0.9,
            }),
        }
    }

    fn detection_entry(start: f64, label: &str) -> MergedEntry {
        MergedEntry {
            timestamp: start,
            payload: MergedPayload::Detection(DetectionEvent {
                start,
                end: start + 2.0,
                label: label.to_string(),
                confidence: 0.8,
                bbox: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_extractive_summary_quotes_transcript_and_ranks_labels() {
        let timeline = vec![
            transcript_entry(0.0, "a crowd gathers outside"),
            detection_entry(0.0, "person"),
            detection_entry(1.0, "person"),
            detection_entry(2.0, "dog"),
            transcript_entry(5.0, "music starts playing"),
        ];
        let summary = ExtractiveSummarizer::default().summarize(&timeline).await.unwrap();
        assert!(summary.text.contains("a crowd gathers outside"));
        assert!(summary.text.contains("music starts playing"));
        assert_eq!(summary.highlights[0], "person (2)");
        assert_eq!(summary.highlights[1], "dog (1)");
    }

    #[tokio::test]
    async fn test_extractive_summary_limits_lines() {
        let timeline: Vec<MergedEntry> = (0..10)
            .map(|i| transcript_entry(i as f64, &format!("line number {i}")))
            .collect();
        let summary = ExtractiveSummarizer::new(2, 5).summarize(&timeline).await.unwrap();
        assert!(summary.text.contains("line number 0"));
        assert!(summary.text.contains("line number 1"));
        assert!(!summary.text.contains("line number 2"));
    }

    #[tokio::test]
    async fn test_extractive_summary_empty_timeline() {
        let summary = ExtractiveSummarizer::default().summarize(&[]).await.unwrap();
        assert!(summary.text.contains("No analyzable content"));
        assert!(summary.highlights.is_empty());
    }

    #[tokio::test]
    async fn test_extractive_summary_is_deterministic() {
        let timeline = vec![
            transcript_entry(0.0, "hello"),
            detection_entry(0.0, "car"),
        ];
        let summarizer = ExtractiveSummarizer::default();
        let a = summarizer.summarize(&timeline).await.unwrap();
        let b = summarizer.summarize(&timeline).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stub_summary_quotes_first_segment() {
        let timeline = vec![
            detection_entry(0.0, "car"),
            transcript_entry(1.0, "the narration begins"),
        ];
        let summary = StubSummarizer::new().summarize(&timeline).await.unwrap();
        assert!(summary.text.contains("the narration begins"));
    }
}
