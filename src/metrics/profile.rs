//! Folded-stack aggregation for method samples.

use std::collections::HashMap;
use std::fmt::Write as _;

use parking_lot::Mutex;

use crate::event::StackTrace;

/// Suffix used once the profile holds `max_stacks` distinct stacks.
pub const TRUNCATED_FRAME: &str = "[truncated]";

/// Aggregates `group;outermost;...;innermost` stacks into sample counts.
///
/// Written by the event consumer and read by the `/debug/profile`
/// endpoint. The lock is never taken on the gauge path.
pub struct ExecutionProfile {
    max_stacks: usize,
    stacks: Mutex<HashMap<String, u64>>,
}

impl ExecutionProfile {
    pub fn new(max_stacks: usize) -> Self {
        Self {
            max_stacks,
            stacks: Mutex::new(HashMap::new()),
        }
    }

    /// Writes the folded form of `trace` under `group` into `out`.
    ///
    /// `out` is cleared first so a caller can reuse one buffer.
    pub fn fold_into(group: &str, trace: Option<&StackTrace>, out: &mut String) {
        out.clear();
        out.push_str(group);
        if let Some(trace) = trace {
            for frame in trace.frames.iter().rev() {
                out.push(';');
                frame.describe_into(out);
            }
        }
    }

    /// Counts one sample for an already folded stack.
    ///
    /// A stack not seen before is counted under `group;[truncated]` once
    /// the bound is reached.
    pub fn record(&self, group: &str, folded: &str) {
        let mut stacks = self.stacks.lock();
        if let Some(count) = stacks.get_mut(folded) {
            *count += 1;
            return;
        }
        if stacks.len() < self.max_stacks {
            stacks.insert(folded.to_string(), 1);
            return;
        }
        let mut truncated = String::with_capacity(group.len() + TRUNCATED_FRAME.len() + 1);
        truncated.push_str(group);
        truncated.push(';');
        truncated.push_str(TRUNCATED_FRAME);
        *stacks.entry(truncated).or_insert(0) += 1;
    }

    /// Number of distinct stacks held.
    pub fn len(&self) -> usize {
        self.stacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.lock().is_empty()
    }

    pub fn count(&self, folded: &str) -> u64 {
        self.stacks.lock().get(folded).copied().unwrap_or(0)
    }

    /// Renders `stack count` lines, sorted by stack, in the folded format
    /// understood by flame graph tools.
    pub fn render(&self) -> String {
        let stacks = self.stacks.lock();
        let mut entries: Vec<(&String, &u64)> = stacks.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (stack, count) in entries {
            let _ = writeln!(out, "{stack} {count}");
        }
        out
    }
}
