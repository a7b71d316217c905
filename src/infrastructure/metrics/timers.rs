//! Elapsed-time groups recorded by the HTTP layer

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Totals and averages per group, in nanoseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimerSnapshot {
    pub totals: HashMap<String, i64>,
    pub averages: HashMap<String, i64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Span {
    start_time: i64,
    stop_time: i64,
}

/// Named groups of start/stop spans.
///
/// A span left running (never stopped) is excluded from the snapshot.
#[derive(Debug, Default)]
pub struct Timers {
    groups: RwLock<HashMap<String, Vec<Span>>>,
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a span in a group, returning its index for `stop`
    pub fn start(&self, group: &str) -> usize {
        let mut groups = self.groups.write().unwrap();
        let spans = groups.entry(group.to_string()).or_default();
        spans.push(Span {
            start_time: now_nanos(),
            stop_time: 0,
        });
        spans.len() - 1
    }

    /// Stops a span, returning its elapsed nanos; -1 for an unknown span
    pub fn stop(&self, group: &str, index: usize) -> i64 {
        let mut groups = self.groups.write().unwrap();
        let Some(spans) = groups.get_mut(group) else {
            return -1;
        };
        let Some(span) = spans.get_mut(index) else {
            return -1;
        };
        span.stop_time = now_nanos();
        span.stop_time - span.start_time
    }

    /// Snapshots totals and averages for every group
    pub fn read_all(&self) -> TimerSnapshot {
        let groups = self.groups.read().unwrap();
        let mut snapshot = TimerSnapshot::default();
        for (group, spans) in groups.iter() {
            let mut total = 0i64;
            let mut completed = 0i64;
            for span in spans {
                if span.stop_time <= 0 {
                    continue;
                }
                total += span.stop_time - span.start_time;
                completed += 1;
            }
            snapshot.totals.insert(group.clone(), total);
            let average = if completed > 0 { total / completed } else { 0 };
            snapshot.averages.insert(group.clone(), average);
        }
        snapshot
    }

    /// Removes every group
    pub fn clear(&self) {
        self.groups.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_measures_elapsed() {
        let timers = Timers::new();

        let index = timers.start("employee_read");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let elapsed = timers.stop("employee_read", index);

        assert!(elapsed > 0);
        let snapshot = timers.read_all();
        assert_eq!(snapshot.totals.get("employee_read"), Some(&elapsed));
    }

    #[test]
    fn test_stop_unknown_span() {
        let timers = Timers::new();
        assert_eq!(timers.stop("nope", 0), -1);

        timers.start("group");
        assert_eq!(timers.stop("group", 5), -1);
    }

    #[test]
    fn test_running_spans_excluded_from_snapshot() {
        let timers = Timers::new();
        let index = timers.start("group");
        timers.start("group"); // left running

        timers.stop("group", index);

        let snapshot = timers.read_all();
        // Average divides only by completed spans
        assert_eq!(
            snapshot.totals.get("group"),
            snapshot.averages.get("group")
        );
    }

    #[test]
    fn test_clear() {
        let timers = Timers::new();
        let index = timers.start("group");
        timers.stop("group", index);

        timers.clear();
        assert!(timers.read_all().totals.is_empty());
    }
}
