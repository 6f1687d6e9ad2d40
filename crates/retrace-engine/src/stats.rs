//! Cumulative replay counters.

/// Work counters accumulated over the lifetime of a
/// [`Replayer`](crate::Replayer).
///
/// Counters are never reset by `end_replay`; take a copy before an
/// operation and compare afterwards to observe what it did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Recorded commands fed to `Simulation::execute`.
    pub commands_executed: u64,
    /// State-change records applied instead of executing a command.
    pub changes_applied: u64,
    /// Checkpoint restores from an in-memory snapshot.
    pub fast_restores: u64,
    /// Checkpoint restores that went through the log.
    pub slow_restores: u64,
    /// Checkpoints created, periodic and desync.
    pub checkpoints_created: u64,
    /// Desync checkpoints dropped by the retention budget.
    pub checkpoints_pruned: u64,
    /// Divergences detected.
    pub desyncs: u64,
}

impl ReplayStats {
    /// Total checkpoint restores.
    pub fn restores(&self) -> u64 {
        self.fast_restores + self.slow_restores
    }

    /// Log steps taken, by execution or by change record.
    pub fn steps(&self) -> u64 {
        self.commands_executed + self.changes_applied
    }
}
