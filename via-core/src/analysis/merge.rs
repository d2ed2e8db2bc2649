//! Timeline merge
//!
//! Combines transcript segments and detection events into one timeline
//! ordered by `(timestamp, kind rank, original index)`. Transcript entries
//! rank before detection entries at equal timestamps, and entries sharing
//! timestamp and kind keep their input order (stable sort). This ordering is
//! a published contract: summarizers downstream rely on narration preceding
//! the detections it narrates.

use crate::core::{DetectionEvent, MergedEntry, MergedPayload, TranscriptSegment};

/// Merge transcript and detections into the ordered timeline
pub fn merge_timeline(
    transcript: &[TranscriptSegment],
    detections: &[DetectionEvent],
) -> Vec<MergedEntry> {
    let mut entries: Vec<MergedEntry> = Vec::with_capacity(transcript.len() + detections.len());
    entries.extend(transcript.iter().map(|segment| MergedEntry {
        timestamp: segment.start,
        payload: MergedPayload::Transcript(segment.clone()),
    }));
    entries.extend(detections.iter().map(|event| MergedEntry {
        timestamp: event.start,
        payload: MergedPayload::Detection(event.clone()),
    }));

    // Stable sort keeps original input order as the final tie-breaker.
    entries.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then(a.kind().rank().cmp(&b.kind().rank()))
    });
    entries
}
