//! Detection of instructions that depend on values not yet opened to both parties.

/// The outcome of a [`TaintTracker::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Checkpoint {
    /// Nothing was tainted since the last checkpoint.
    Continue,
    /// The last instruction depended on a pending value and must be executed again once it has
    /// been opened.
    RestartRequested,
}

/// A single taint flag, owned by one processor.
#[derive(Debug, Clone, Default)]
pub struct TaintTracker {
    tainted: bool,
}

impl TaintTracker {
    /// Marks the current instruction as depending on a value that is not opened to both parties.
    pub fn taint(&mut self) {
        self.tainted = true;
    }

    /// Whether the flag is currently set.
    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Reads and clears the flag.
    pub fn checkpoint(&mut self) -> Checkpoint {
        if std::mem::take(&mut self.tainted) {
            Checkpoint::RestartRequested
        } else {
            Checkpoint::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_is_idempotent_and_cleared_by_checkpoint() {
        let mut tracker = TaintTracker::default();
        assert_eq!(tracker.checkpoint(), Checkpoint::Continue);
        tracker.taint();
        tracker.taint();
        assert!(tracker.is_tainted());
        assert_eq!(tracker.checkpoint(), Checkpoint::RestartRequested);
        assert!(!tracker.is_tainted());
        assert_eq!(tracker.checkpoint(), Checkpoint::Continue);
    }
}
