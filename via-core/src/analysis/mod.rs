//! Analysis building blocks shared by the pipeline stages and the result
//! assembler: the timeline merge contract, derived analytics, and the
//! summarizer implementations.

pub mod analytics;
pub mod merge;
pub mod summarize;

pub use analytics::{build_analytics, AnalyticsBundle, CoOccurrence, ObjectFrequency, SentimentPoint};
pub use merge::merge_timeline;
pub use summarize::{ExtractiveSummarizer, StubSummarizer};
