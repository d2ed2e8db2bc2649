//! Pipeline metrics collection
//!
//! Thread-safe counters and duration tracking for job throughput and stage
//! behavior. Uses atomic operations for counters and a capped duration
//! window so long-running orchestrators don't grow without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

const DURATION_WINDOW: usize = 1000;

/// Metrics collector for the pipeline orchestrator
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Jobs accepted into the queue
    jobs_submitted: AtomicUsize,
    /// Jobs that reached COMPLETED
    jobs_completed: AtomicUsize,
    /// Jobs that reached FAILED
    jobs_failed: AtomicUsize,
    /// Jobs that reached CANCELLED
    jobs_cancelled: AtomicUsize,
    /// Stage attempts re-run after a transient failure
    stage_retries: AtomicUsize,
    /// Stage attempts that exceeded their deadline
    stage_timeouts: AtomicUsize,
    /// Durations of succeeded stage executions (capped window)
    stage_durations: RwLock<Vec<Duration>>,
    /// When this collector was created
    creation_time: Instant,
}

impl PipelineMetrics {
    /// Creates a collector with all counters at zero
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicUsize::new(0),
            jobs_completed: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            jobs_cancelled: AtomicUsize::new(0),
            stage_retries: AtomicUsize::new(0),
            stage_timeouts: AtomicUsize::new(0),
            stage_durations: RwLock::new(Vec::new()),
            creation_time: Instant::now(),
        }
    }

    /// Record a job entering the queue
    pub fn increment_jobs_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job reaching COMPLETED
    pub fn increment_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job reaching FAILED
    pub fn increment_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job reaching CANCELLED
    pub fn increment_jobs_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage attempt being retried
    pub fn increment_stage_retries(&self) {
        self.stage_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage attempt exceeding its deadline
    pub fn increment_stage_timeouts(&self) {
        self.stage_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of a succeeded stage execution
    pub fn record_stage_duration(&self, duration: Duration) {
        let mut durations = self.stage_durations.write();
        if durations.len() >= DURATION_WINDOW {
            durations.remove(0);
        }
        durations.push(duration);
    }

    /// Snapshot the collected metrics
    pub fn summary(&self) -> MetricsSummary {
        let durations = self.stage_durations.read();
        let average_stage_duration = if durations.is_empty() {
            Duration::ZERO
        } else {
            durations.iter().sum::<Duration>() / durations.len() as u32
        };
        let submitted = self.jobs_submitted.load(Ordering::Relaxed);
        let completed = self.jobs_completed.load(Ordering::Relaxed);
        let terminal = completed
            + self.jobs_failed.load(Ordering::Relaxed)
            + self.jobs_cancelled.load(Ordering::Relaxed);
        MetricsSummary {
            jobs_submitted: submitted,
            jobs_completed: completed,
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            stage_retries: self.stage_retries.load(Ordering::Relaxed),
            stage_timeouts: self.stage_timeouts.load(Ordering::Relaxed),
            average_stage_duration,
            completion_rate: if terminal == 0 {
                0.0
            } else {
                completed as f64 / terminal as f64
            },
            uptime: self.creation_time.elapsed(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the orchestrator's metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    /// Jobs accepted into the queue
    pub jobs_submitted: usize,
    /// Jobs that reached COMPLETED
    pub jobs_completed: usize,
    /// Jobs that reached FAILED
    pub jobs_failed: usize,
    /// Jobs that reached CANCELLED
    pub jobs_cancelled: usize,
    /// Stage attempts re-run after a transient failure
    pub stage_retries: usize,
    /// Stage attempts that exceeded their deadline
    pub stage_timeouts: usize,
    /// Mean duration of succeeded stage executions in the window
    pub average_stage_duration: Duration,
    /// Completed jobs as a fraction of terminal jobs
    pub completion_rate: f64,
    /// Time since the collector was created
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.increment_jobs_submitted();
        metrics.increment_jobs_submitted();
        metrics.increment_jobs_completed();
        metrics.increment_jobs_failed();
        metrics.increment_stage_retries();

        let summary = metrics.summary();
        assert_eq!(summary.jobs_submitted, 2);
        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.stage_retries, 1);
        assert_eq!(summary.completion_rate, 0.5);
    }

    #[test]
    fn test_average_duration() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.summary().average_stage_duration, Duration::ZERO);

        metrics.record_stage_duration(Duration::from_millis(100));
        metrics.record_stage_duration(Duration::from_millis(300));
        assert_eq!(
            metrics.summary().average_stage_duration,
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_duration_window_is_capped() {
        let metrics = PipelineMetrics::new();
        for _ in 0..(DURATION_WINDOW + 10) {
            metrics.record_stage_duration(Duration::from_millis(1));
        }
        assert_eq!(metrics.stage_durations.read().len(), DURATION_WINDOW);
    }
}
