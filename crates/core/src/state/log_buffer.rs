//! Bounded log buffer and the auto-follow heuristic for log viewers.

use pw_protocol::{LogEntry, LogLevel};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Source tag of entries seeded from a snapshot's embedded log text.
pub const SNAPSHOT_SOURCE: &str = "snapshot";

/// FIFO buffer holding the most recent `capacity` log entries.
#[derive(Debug, Clone)]
pub struct LogStreamBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    ever_populated: bool,
}

impl LogStreamBuffer {
    /// Create a buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            ever_populated: false,
        }
    }

    /// Append to the tail, evicting from the head when full.
    pub fn append(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.ever_populated = true;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Seed the buffer from a full log text, one entry per non-empty line.
    ///
    /// Does nothing once the buffer has ever held an entry, so live entries
    /// are never mixed with a replayed copy of themselves. Returns the number
    /// of entries added.
    pub fn seed_from_blob(&mut self, blob: &str) -> usize {
        if self.ever_populated {
            return 0;
        }
        let mut added = 0;
        for line in blob.lines().filter(|line| !line.trim().is_empty()) {
            self.append(LogEntry::new(LogLevel::Info, line).with_source(SNAPSHOT_SOURCE));
            added += 1;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ever_populated(&self) -> bool {
        self.ever_populated
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Scroll position of a log viewport, in the viewer's own units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Distance from the top of the content to the top of the viewport.
    pub offset: f64,
    /// Visible height.
    pub viewport: f64,
    /// Total content height.
    pub content: f64,
}

impl ScrollMetrics {
    pub fn new(offset: f64, viewport: f64, content: f64) -> Self {
        Self {
            offset,
            viewport,
            content,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        (self.content - self.viewport - self.offset).max(0.0)
    }
}

/// Decides whether a log viewer should keep itself pinned to the bottom.
///
/// Following is on initially. Scrolling away from the bottom suspends it
/// until the viewer is back within `tolerance` of the bottom, either by a
/// new scroll or, once `settle` has passed, by the content moving under a
/// still viewport. Independently, the first population of the buffer
/// forces one scroll to the bottom until acknowledged.
#[derive(Debug, Clone)]
pub struct AutoFollow {
    tolerance: f64,
    settle: Duration,
    following: bool,
    initial_pending: bool,
    initial_done: bool,
    last_distance: f64,
    last_scroll_at: Option<Instant>,
}

impl AutoFollow {
    pub fn new(tolerance: f64, settle: Duration) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            settle,
            following: true,
            initial_pending: false,
            initial_done: false,
            last_distance: 0.0,
            last_scroll_at: None,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Notify that entries were added. The first call arms the initial
    /// scroll to the bottom.
    pub fn on_populated(&mut self) {
        if !self.initial_done {
            self.initial_done = true;
            self.initial_pending = true;
        }
    }

    /// Forget the initial population, e.g. after the buffer was cleared.
    pub fn reset_initial(&mut self) {
        self.initial_done = false;
        self.initial_pending = false;
    }

    /// A scroll made by the user.
    pub fn report_scroll(&mut self, metrics: ScrollMetrics, now: Instant) {
        let distance = metrics.distance_from_bottom();
        self.last_distance = distance;
        self.last_scroll_at = Some(now);
        self.initial_pending = false;
        self.following = distance <= self.tolerance;
    }

    /// A position change the user did not cause (resize, new content).
    pub fn report_viewport(&mut self, metrics: ScrollMetrics) {
        self.last_distance = metrics.distance_from_bottom();
    }

    /// Resume following, as from a "jump to bottom" control.
    pub fn resume(&mut self) {
        self.following = true;
        self.last_distance = 0.0;
    }

    /// Resume following when the viewport has rested inside the band for
    /// the settle delay. Returns `true` if following was resumed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.following || self.last_distance > self.tolerance {
            return false;
        }
        let settled = self
            .last_scroll_at
            .map_or(true, |at| now.saturating_duration_since(at) >= self.settle);
        if settled {
            self.following = true;
        }
        settled
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    pub fn should_auto_scroll(&self) -> bool {
        self.initial_pending || self.following
    }

    /// The viewer performed the scroll to the bottom.
    pub fn acknowledge(&mut self) {
        self.initial_pending = false;
    }
}
