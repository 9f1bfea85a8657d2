//! Correlation of two-phase events that share an id.

use std::collections::HashMap;

use tracing::warn;

/// Pending count at which, and at each multiple of which, a warning is logged.
pub const PENDING_SOFT_LIMIT: usize = 64;

/// Which half of a two-phase event an arrival carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    /// Parses the `when` marker of a GC heap summary.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "Before GC" => Some(Self::Before),
            "After GC" => Some(Self::After),
            _ => None,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
        }
    }
}

/// Both halves of a completed pair, ordered by phase.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPair<T> {
    pub before: T,
    pub after: T,
}

/// Holds the first-arrived half of each pair until its partner shows up.
///
/// Ids that never complete stay pending until the correlator is dropped.
pub struct PairedEventCorrelator<T> {
    name: &'static str,
    pending: HashMap<i64, (Phase, T)>,
}

impl<T> PairedEventCorrelator<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: HashMap::new(),
        }
    }

    /// Offers one half. Returns the pair once both phases for `id` arrived.
    ///
    /// A second half with the same phase replaces the pending one.
    pub fn offer(&mut self, id: i64, phase: Phase, value: T) -> Option<CompletedPair<T>> {
        match self.pending.remove(&id) {
            Some((pending_phase, pending)) if pending_phase == phase.opposite() => {
                Some(match phase {
                    Phase::After => CompletedPair {
                        before: pending,
                        after: value,
                    },
                    Phase::Before => CompletedPair {
                        before: value,
                        after: pending,
                    },
                })
            }
            replaced => {
                self.pending.insert(id, (phase, value));
                if replaced.is_none() {
                    self.check_soft_limit();
                }
                None
            }
        }
    }

    fn check_soft_limit(&self) {
        let n = self.pending.len();
        if n % PENDING_SOFT_LIMIT == 0 {
            warn!(
                correlator = self.name,
                pending = n,
                "Unmatched pending pairs are accumulating"
            );
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_pending(&self, id: i64) -> bool {
        self.pending.contains_key(&id)
    }
}
