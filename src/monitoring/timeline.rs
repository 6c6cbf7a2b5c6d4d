//! Execution Timeline
//!
//! Tracks action start/end times for the run summary and the ASCII
//! timeline chart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Width of the chart bar area in characters.
const CHART_WIDTH: f64 = 50.0;

/// Width of the name column in the chart.
const NAME_WIDTH: usize = 16;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Action started executing
    Started,
    /// Action completed successfully
    Completed,
    /// Action failed
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the action
    pub action: String,
    /// Type of event
    pub event_type: EventType,
    /// Monotonic time, used for durations
    pub instant: Instant,
    /// Wall-clock time, used for reports
    pub timestamp: DateTime<Utc>,
}

/// Records when each action starts, completes, or fails.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Records an event for an action.
    pub fn add_event(&mut self, action: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            action: action.into(),
            event_type,
            instant: Instant::now(),
            timestamp: Utc::now(),
        });
    }

    /// Returns all recorded events.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Wall-clock time the timeline was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// (start, end) offsets in milliseconds for every finished action,
    /// ordered by start time.
    fn spans(&self) -> Vec<(String, u128, u128)> {
        let mut starts: HashMap<&str, u128> = HashMap::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let offset = event.instant.duration_since(self.start_time).as_millis();
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.action.as_str(), offset);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(&start) = starts.get(event.action.as_str()) {
                        spans.push((event.action.clone(), start, offset));
                    }
                }
            }
        }

        spans.sort_by_key(|(_, start, _)| *start);
        spans
    }

    /// Generates an ASCII chart with one bar per finished action,
    /// positioned relative to the total run time.
    pub fn chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        let scale = CHART_WIDTH / total_time as f64;

        for (action, start, end) in self.spans() {
            let start_pos = (start as f64 * scale) as usize;
            let width = (((end - start) as f64 * scale) as usize).max(1);

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&"#".repeat(width));

            output.push_str(&format!(
                "{} |{}| ({} ms)\n",
                truncate(&action, NAME_WIDTH),
                bar,
                end - start
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns action durations in milliseconds.
    pub fn durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(action, start, end)| (action, end - start))
            .collect()
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a name to exactly `width` characters.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        format!("{:width$}", s, width = width)
    } else {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.events().is_empty());
        assert!(timeline.started_at() <= Utc::now());
    }

    #[test]
    fn test_add_events() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("lint", EventType::Started);
        thread::sleep(Duration::from_millis(10));
        timeline.add_event("lint", EventType::Completed);

        let events = timeline.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp <= events[1].timestamp);
        assert!(events[0].instant <= events[1].instant);
    }

    #[test]
    fn test_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("tests", EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event("tests", EventType::Completed);

        let durations = timeline.durations();
        assert!(durations["tests"] >= 50);
    }

    #[test]
    fn test_durations_only_started() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("tests", EventType::Started);
        assert!(timeline.durations().is_empty());
    }

    #[test]
    fn test_failed_event_closes_span() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("tests", EventType::Started);
        timeline.add_event("tests", EventType::Failed);

        assert_eq!(timeline.events()[1].event_type, EventType::Failed);
        assert!(timeline.durations().contains_key("tests"));
    }

    #[test]
    fn test_timeline_elapsed() {
        let timeline = ExecutionTimeline::new();
        thread::sleep(Duration::from_millis(20));
        assert!(timeline.elapsed().as_millis() >= 20);
    }

    #[test]
    fn test_chart_generation() {
        let mut timeline = ExecutionTimeline::new();

        timeline.add_event("Python 3.7 - tests", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("Python 3.7 - tests", EventType::Completed);

        timeline.add_event("lint", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("lint", EventType::Failed);

        let chart = timeline.chart();
        assert!(chart.contains("Python 3.7 - ..."));
        assert!(chart.contains("lint"));
        assert!(chart.contains('#'));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_chart_empty() {
        let timeline = ExecutionTimeline::default();
        let chart = timeline.chart();
        assert!(chart.contains("Timeline"));
        assert!(!chart.contains('#'));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("lint", 6), "lint  ");
        assert_eq!(truncate("typing-check", 8), "typin...");
    }
}
