//! Doom-loop detection for the agent runner.
//!
//! Keeps a bounded buffer of recent tool calls and flags a run that keeps
//! issuing the same call, or that ping-pongs between two calls.

use std::collections::VecDeque;
use std::fmt;

use serde_json::{Map, Value};

use crate::constants::DOOM_LOOP_THRESHOLD_MAX;

/// A tool call reduced to a comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub tool: String,
    /// Canonical JSON of the arguments.
    pub args: String,
}

impl ToolCallRecord {
    pub fn new(tool: &str, args: &Value) -> Self {
        Self {
            tool: tool.to_string(),
            args: canonical_json(args),
        }
    }
}

/// Which pattern tripped the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoomLoopKind {
    /// The same call `count` times in a row.
    Repetition { tool: String, count: usize },
    /// Two calls alternating for `count` calls.
    Alternation {
        first: String,
        second: String,
        count: usize,
    },
}

impl fmt::Display for DoomLoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoomLoopKind::Repetition { tool, count } => write!(
                f,
                "'{}' was called {} times in a row with identical arguments",
                tool, count
            ),
            DoomLoopKind::Alternation {
                first,
                second,
                count,
            } => write!(
                f,
                "'{}' and '{}' alternated for {} calls with identical arguments",
                first, second, count
            ),
        }
    }
}

/// Rolling detector owned by one run.
#[derive(Debug)]
pub struct DoomLoopDetector {
    threshold: usize,
    /// Holds the last `2 * threshold` calls, enough for both rules.
    capacity: usize,
    recent: VecDeque<ToolCallRecord>,
}

impl DoomLoopDetector {
    /// A threshold below 2 would flag every call, so it is clamped to 2. The
    /// upper clamp keeps the buffer bounded.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.clamp(2, DOOM_LOOP_THRESHOLD_MAX);
        let capacity = threshold * 2;
        Self {
            threshold,
            capacity,
            recent: VecDeque::with_capacity(capacity),
        }
    }

    /// Records a call and reports whether the run is now looping.
    pub fn record(&mut self, tool: &str, args: &Value) -> Option<DoomLoopKind> {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(ToolCallRecord::new(tool, args));
        self.check()
    }

    fn check(&self) -> Option<DoomLoopKind> {
        let n = self.threshold;
        let len = self.recent.len();

        if len >= n {
            let last = &self.recent[len - 1];
            if self.recent.iter().skip(len - n).all(|r| r == last) {
                return Some(DoomLoopKind::Repetition {
                    tool: last.tool.clone(),
                    count: n,
                });
            }
        }

        let window = 2 * n;
        if len >= window {
            let a = &self.recent[len - window];
            let b = &self.recent[len - window + 1];
            if a != b {
                let alternates = self
                    .recent
                    .iter()
                    .skip(len - window)
                    .enumerate()
                    .all(|(i, r)| r == if i % 2 == 0 { a } else { b });
                if alternates {
                    return Some(DoomLoopKind::Alternation {
                        first: a.tool.clone(),
                        second: b.tool.clone(),
                        count: window,
                    });
                }
            }
        }

        None
    }
}

/// Serializes `value` with object keys sorted at every depth and integral
/// floats written as integers, so `{"b":1.0,"a":2}` and `{"a":2,"b":1}`
/// compare equal.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        return Value::from(f as i64);
                    }
                }
            }
            value.clone()
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_ignores_key_order_and_float_form() {
        let a = json!({"b": {"y": 1, "x": [1.0, {"k": 2, "j": 3}]}, "a": 2.0});
        let b = json!({"a": 2, "b": {"x": [1, {"j": 3, "k": 2}], "y": 1.0}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_ne!(canonical_json(&json!({"a": 1.5})), canonical_json(&json!({"a": 1})));
    }

    #[test]
    fn test_third_identical_call_trips() {
        let mut detector = DoomLoopDetector::new(3);
        let args = json!({"path": "src"});
        assert!(detector.record("ls", &args).is_none());
        assert!(detector.record("ls", &args).is_none());
        assert_eq!(
            detector.record("ls", &json!({"path": "src"})),
            Some(DoomLoopKind::Repetition {
                tool: "ls".into(),
                count: 3
            })
        );
    }

    #[test]
    fn test_different_args_reset_repetition() {
        let mut detector = DoomLoopDetector::new(3);
        detector.record("read_file", &json!({"path": "a"}));
        detector.record("read_file", &json!({"path": "a"}));
        assert!(detector.record("read_file", &json!({"path": "b"})).is_none());
        assert!(detector.record("read_file", &json!({"path": "b"})).is_none());
    }

    #[test]
    fn test_alternation_trips_on_sixth_call() {
        let mut detector = DoomLoopDetector::new(3);
        let a = json!({"path": "a"});
        let b = json!({"path": "b"});
        for i in 0..5 {
            let args = if i % 2 == 0 { &a } else { &b };
            assert!(detector.record("read_file", args).is_none(), "call {}", i);
        }
        assert!(matches!(
            detector.record("read_file", &b),
            Some(DoomLoopKind::Alternation { count: 6, .. })
        ));
    }

    #[test]
    fn test_three_distinct_calls_do_not_alternate() {
        let mut detector = DoomLoopDetector::new(2);
        assert!(detector.record("ls", &json!({})).is_none());
        assert!(detector.record("glob", &json!({})).is_none());
        assert!(detector.record("grep", &json!({})).is_none());
        assert!(detector.record("glob", &json!({})).is_none());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut detector = DoomLoopDetector::new(3);
        for i in 0..100 {
            detector.record("read_file", &json!({ "path": i }));
        }
        assert_eq!(detector.recent.len(), 6);
    }

    #[test]
    fn test_large_threshold_still_detects_alternation() {
        let mut detector = DoomLoopDetector::new(40);
        let a = json!({"path": "a"});
        let b = json!({"path": "b"});
        for i in 0..79 {
            let args = if i % 2 == 0 { &a } else { &b };
            assert!(detector.record("read_file", args).is_none(), "call {}", i);
        }
        assert_eq!(
            detector.record("read_file", &b),
            Some(DoomLoopKind::Alternation {
                first: "read_file".into(),
                second: "read_file".into(),
                count: 80
            })
        );
    }

    #[test]
    fn test_huge_threshold_is_clamped() {
        let mut detector = DoomLoopDetector::new(usize::MAX);
        assert_eq!(detector.threshold, DOOM_LOOP_THRESHOLD_MAX);
        for _ in 0..(DOOM_LOOP_THRESHOLD_MAX - 1) {
            assert!(detector.record("ls", &json!({})).is_none());
        }
        assert!(matches!(
            detector.record("ls", &json!({})),
            Some(DoomLoopKind::Repetition { .. })
        ));
    }
}
