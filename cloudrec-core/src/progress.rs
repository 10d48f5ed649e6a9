//! Progress and message reporting for long-running operations
//!
//! Operations push events into a [`ProgressObserver`] rather than depending on
//! any UI event loop. The throttle state (`threshold`) belongs to the running
//! operation; observers advance it to decide how often they actually react.
//! Observers cannot cancel an operation.

use tracing::info;

/// Reporting frequency, in percent, used when none is configured
pub const DEFAULT_PROGRESS_FREQUENCY: u32 = 5;

/// Receiver of messages and progress ticks
pub trait ProgressObserver: Send + Sync {
    /// A free-form status message
    fn message(&self, text: &str);

    /// Item `current` of `total` was reached in operation `label`.
    ///
    /// `frequency` is the reporting step in percent and `threshold` the
    /// percentage at which the observer next wants to react.
    fn progress(&self, label: &str, current: usize, total: usize, frequency: u32, threshold: &mut u32);
}

/// Percentage of work done once item `current` (zero based) is finished
pub fn percent_complete(current: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (((current + 1).min(total) * 100) / total) as u32
}

/// Returns true and advances `threshold` when `percent` has reached it.
pub fn advance_threshold(percent: u32, frequency: u32, threshold: &mut u32) -> bool {
    if percent < *threshold {
        return false;
    }
    let step = frequency.max(1);
    *threshold = (percent / step + 1) * step;
    true
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn message(&self, _text: &str) {}

    fn progress(&self, _label: &str, _current: usize, _total: usize, _frequency: u32, _threshold: &mut u32) {}
}

/// Observer that forwards messages and throttled progress to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn message(&self, text: &str) {
        info!("{}", text);
    }

    fn progress(&self, label: &str, current: usize, total: usize, frequency: u32, threshold: &mut u32) {
        let percent = percent_complete(current, total);
        if advance_threshold(percent, frequency, threshold) {
            info!("{}: {}%", label, percent);
        }
    }
}

/// Event pushed by [`ChannelProgress`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Message(String),
    Progress {
        label: String,
        percent: u32,
        current: usize,
        total: usize,
    },
}

/// Observer that pushes throttled events into a channel for another thread
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: flume::Sender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create an observer and the receiving end of its unbounded channel
    pub fn new() -> (Self, flume::Receiver<ProgressEvent>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelProgress {
    fn message(&self, text: &str) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(ProgressEvent::Message(text.to_string()));
    }

    fn progress(&self, label: &str, current: usize, total: usize, frequency: u32, threshold: &mut u32) {
        let percent = percent_complete(current, total);
        if advance_threshold(percent, frequency, threshold) {
            let _ = self.sender.send(ProgressEvent::Progress {
                label: label.to_string(),
                percent,
                current,
                total,
            });
        }
    }
}

/// Per-operation progress state: label, total, frequency and throttle
pub struct ProgressTracker<'a> {
    observer: Option<&'a dyn ProgressObserver>,
    label: &'a str,
    total: usize,
    frequency: u32,
    threshold: u32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: Option<&'a dyn ProgressObserver>, label: &'a str, total: usize, frequency: u32) -> Self {
        Self {
            observer,
            label,
            total,
            frequency,
            threshold: 0,
        }
    }

    /// Report that item `current` is being processed
    pub fn tick(&mut self, current: usize) {
        if let Some(observer) = self.observer {
            observer.progress(self.label, current, self.total, self.frequency, &mut self.threshold);
        }
    }

    pub fn message(&self, text: &str) {
        if let Some(observer) = self.observer {
            observer.message(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(0, 4), 25);
        assert_eq!(percent_complete(3, 4), 100);
        assert_eq!(percent_complete(10, 4), 100);
        assert_eq!(percent_complete(0, 0), 100);
    }

    #[test]
    fn test_threshold_advances_in_frequency_steps() {
        let mut threshold = 0;
        assert!(advance_threshold(1, 5, &mut threshold));
        assert_eq!(threshold, 5);
        assert!(!advance_threshold(4, 5, &mut threshold));
        assert!(advance_threshold(12, 5, &mut threshold));
        assert_eq!(threshold, 15);
    }

    #[test]
    fn test_channel_progress_is_throttled() {
        let (observer, receiver) = ChannelProgress::new();
        let mut tracker = ProgressTracker::new(Some(&observer), "Building", 100, 25);
        for i in 0..100 {
            tracker.tick(i);
        }
        tracker.message("done");
        drop(tracker);
        drop(observer);

        let events: Vec<ProgressEvent> = receiver.iter().collect();
        let percents: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![1, 25, 50, 75, 100]);
        assert_eq!(events.last(), Some(&ProgressEvent::Message("done".to_string())));
    }
}
