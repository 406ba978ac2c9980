//! Execution-limit tracking for logpoints
//!
//! The authoritative hit counter lives inside the debuggee (see
//! [`crate::session::logpoint`]); this tracker keeps the controller-side
//! mirror, reconciled solely by observing emitted log lines. The mirror is
//! never treated as authoritative for the crossing decision — that happens
//! locally in the debuggee where the ceiling is embedded in the condition.

use std::collections::{HashMap, VecDeque};

use super::logpoint::ObservedHit;

/// Controller-side record for one registered logpoint
#[derive(Debug, Clone)]
pub struct LogpointMetadata {
    /// Runtime-assigned breakpoint id
    pub breakpoint_id: String,
    /// Resolved runtime file (url)
    pub file: String,
    /// Resolved line, 0-based runtime coordinates
    pub line: u32,
    /// Original message template
    pub template: String,
    /// Execution ceiling (positive, never unlimited)
    pub ceiling: u32,
    /// Read-only mirror of the debuggee-side counter
    pub execution_count: u32,
    /// Recently captured log lines, oldest discarded first
    pub recent_logs: VecDeque<String>,
}

impl LogpointMetadata {
    /// Counter key used inside the debuggee for this logpoint
    pub fn key(&self) -> String {
        counter_key(&self.file, self.line)
    }
}

/// Counter key for a resolved location
pub fn counter_key(file: &str, line: u32) -> String {
    format!("{}:{}", file, line)
}

/// Details of a ceiling breach, handed to the session when the runtime pauses
#[derive(Debug, Clone)]
pub struct LimitBreach {
    pub breakpoint_id: String,
    pub file: String,
    pub line: u32,
    pub template: String,
    pub execution_count: u32,
    pub ceiling: u32,
    pub recent_logs: Vec<String>,
}

/// Mirrors execution counts and captured output for every live logpoint
#[derive(Debug)]
pub struct ExecutionLimitTracker {
    /// Metadata keyed by debuggee counter key
    by_key: HashMap<String, LogpointMetadata>,
    /// Breakpoint id -> counter key
    by_id: HashMap<String, String>,
    /// Ring size for captured log lines
    ring_capacity: usize,
}

impl ExecutionLimitTracker {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            by_key: HashMap::new(),
            by_id: HashMap::new(),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Register a placed logpoint
    pub fn register(
        &mut self,
        breakpoint_id: &str,
        file: &str,
        line: u32,
        template: &str,
        ceiling: u32,
    ) {
        let metadata = LogpointMetadata {
            breakpoint_id: breakpoint_id.to_string(),
            file: file.to_string(),
            line,
            template: template.to_string(),
            ceiling,
            execution_count: 0,
            recent_logs: VecDeque::new(),
        };
        let key = metadata.key();
        self.by_id.insert(breakpoint_id.to_string(), key.clone());
        self.by_key.insert(key, metadata);
    }

    /// Drop tracking for a removed breakpoint. Returns whether it was tracked.
    pub fn unregister(&mut self, breakpoint_id: &str) -> bool {
        if let Some(key) = self.by_id.remove(breakpoint_id) {
            self.by_key.remove(&key);
            true
        } else {
            false
        }
    }

    /// Whether a breakpoint id belongs to a tracked logpoint
    pub fn is_tracked(&self, breakpoint_id: &str) -> bool {
        self.by_id.contains_key(breakpoint_id)
    }

    /// Look up metadata by breakpoint id
    pub fn get(&self, breakpoint_id: &str) -> Option<&LogpointMetadata> {
        self.by_id.get(breakpoint_id).and_then(|k| self.by_key.get(k))
    }

    /// Record an observed log line for its logpoint.
    ///
    /// The mirror takes the debuggee-reported count (observation may lag or
    /// drop lines; the debuggee's number is the one the pause decision used).
    pub fn observe(&mut self, hit: &ObservedHit) -> bool {
        let Some(metadata) = self.by_key.get_mut(&hit.key) else {
            return false;
        };
        metadata.execution_count = metadata.execution_count.max(hit.count);
        if metadata.recent_logs.len() >= self.ring_capacity {
            metadata.recent_logs.pop_front();
        }
        metadata.recent_logs.push_back(hit.message.clone());
        true
    }

    /// Build breach details for a paused logpoint, if its ceiling is crossed
    pub fn breach_for(&self, breakpoint_id: &str) -> Option<LimitBreach> {
        let metadata = self.get(breakpoint_id)?;
        if metadata.execution_count <= metadata.ceiling {
            return None;
        }
        Some(LimitBreach {
            breakpoint_id: metadata.breakpoint_id.clone(),
            file: metadata.file.clone(),
            line: metadata.line,
            template: metadata.template.clone(),
            execution_count: metadata.execution_count,
            ceiling: metadata.ceiling,
            recent_logs: metadata.recent_logs.iter().cloned().collect(),
        })
    }

    /// Zero the controller-side mirror for a logpoint.
    ///
    /// The caller is responsible for zeroing the debuggee-side counter in the
    /// same operation; resetting only one side desynchronizes the pair.
    pub fn reset(&mut self, breakpoint_id: &str) -> bool {
        let Some(key) = self.by_id.get(breakpoint_id) else {
            return false;
        };
        if let Some(metadata) = self.by_key.get_mut(key) {
            metadata.execution_count = 0;
            metadata.recent_logs.clear();
            true
        } else {
            false
        }
    }

    /// Registered logpoints, for listings
    pub fn all(&self) -> impl Iterator<Item = &LogpointMetadata> {
        self.by_key.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(key: &str, count: u32, message: &str) -> ObservedHit {
        ObservedHit {
            key: key.to_string(),
            count,
            message: message.to_string(),
        }
    }

    fn tracker_with_one() -> ExecutionLimitTracker {
        let mut tracker = ExecutionLimitTracker::new(3);
        tracker.register("bp-1", "app.js", 11, "x is {x}", 5);
        tracker
    }

    #[test]
    fn observe_mirrors_count_and_captures_lines() {
        let mut tracker = tracker_with_one();
        let key = counter_key("app.js", 11);

        assert!(tracker.observe(&hit(&key, 1, "x is 1")));
        assert!(tracker.observe(&hit(&key, 2, "x is 2")));

        let metadata = tracker.get("bp-1").unwrap();
        assert_eq!(metadata.execution_count, 2);
        assert_eq!(metadata.recent_logs.len(), 2);
    }

    #[test]
    fn ring_discards_oldest_first() {
        let mut tracker = tracker_with_one();
        let key = counter_key("app.js", 11);
        for n in 1..=5 {
            tracker.observe(&hit(&key, n, &format!("x is {}", n)));
        }
        let metadata = tracker.get("bp-1").unwrap();
        assert_eq!(metadata.recent_logs.len(), 3);
        assert_eq!(metadata.recent_logs.front().unwrap(), "x is 3");
        assert_eq!(metadata.recent_logs.back().unwrap(), "x is 5");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut tracker = tracker_with_one();
        assert!(!tracker.observe(&hit("other.js:3", 1, "noise")));
    }

    #[test]
    fn breach_requires_count_past_ceiling() {
        let mut tracker = tracker_with_one();
        let key = counter_key("app.js", 11);
        for n in 1..=5 {
            tracker.observe(&hit(&key, n, "line"));
        }
        assert!(tracker.breach_for("bp-1").is_none());

        tracker.observe(&hit(&key, 6, "line"));
        let breach = tracker.breach_for("bp-1").unwrap();
        assert_eq!(breach.execution_count, 6);
        assert_eq!(breach.ceiling, 5);
        assert!(!breach.recent_logs.is_empty());
    }

    #[test]
    fn reset_zeroes_mirror_and_ring() {
        let mut tracker = tracker_with_one();
        let key = counter_key("app.js", 11);
        for n in 1..=6 {
            tracker.observe(&hit(&key, n, "line"));
        }
        assert!(tracker.reset("bp-1"));
        let metadata = tracker.get("bp-1").unwrap();
        assert_eq!(metadata.execution_count, 0);
        assert!(metadata.recent_logs.is_empty());
        assert!(tracker.breach_for("bp-1").is_none());
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut tracker = tracker_with_one();
        assert!(tracker.unregister("bp-1"));
        assert!(!tracker.unregister("bp-1"));
        assert!(tracker.get("bp-1").is_none());
    }
}
