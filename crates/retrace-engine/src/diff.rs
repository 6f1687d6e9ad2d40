//! Desync detection state.
//!
//! [`DiffBitmap`] records, per action, whether replaying it under the
//! current code is known to reproduce the log ([`DiffMark::Safe`]) or must
//! go through recorded change data instead ([`DiffMark::Desynced`]).
//! [`DesyncTracker`] owns the bitmap together with the per-session desync
//! flag and the one-time notice.

use std::ops::RangeInclusive;

use retrace_core::ActionIndex;

/// What is known about replaying one action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiffMark {
    /// Not replayed since the log was opened.
    #[default]
    Unknown,
    /// Replayed and matched the recorded checksum.
    Safe,
    /// Must be re-simulated from change data.
    Desynced,
}

/// Resizable per-action mark table, indexed by [`ActionIndex`].
///
/// Actions outside the table read as [`DiffMark::Unknown`].
#[derive(Clone, Debug, Default)]
pub struct DiffBitmap {
    /// `marks[i]` belongs to `ActionIndex(i + 1)`.
    marks: Vec<DiffMark>,
}

impl DiffBitmap {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions covered.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no action is covered.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Grow to cover `action_count` actions. Existing marks are kept and
    /// the table never shrinks.
    pub fn resize(&mut self, action_count: u64) {
        let wanted = action_count as usize;
        if wanted > self.marks.len() {
            self.marks.resize(wanted, DiffMark::Unknown);
        }
    }

    /// Mark for `action`.
    pub fn get(&self, action: ActionIndex) -> DiffMark {
        action
            .0
            .checked_sub(1)
            .and_then(|slot| self.marks.get(slot as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Set the mark for `action`, growing the table if needed.
    pub fn set(&mut self, action: ActionIndex, mark: DiffMark) {
        let Some(slot) = action.0.checked_sub(1) else {
            return;
        };
        self.resize(slot + 1);
        self.marks[slot as usize] = mark;
    }

    /// Mark every action in `range` as [`DiffMark::Desynced`].
    pub fn mark_desynced(&mut self, range: RangeInclusive<ActionIndex>) {
        let (start, end) = (range.start().0.max(1), range.end().0);
        if start > end {
            return;
        }
        self.resize(end);
        for mark in &mut self.marks[(start - 1) as usize..end as usize] {
            *mark = DiffMark::Desynced;
        }
    }

    /// Whether `action` must be re-simulated from change data.
    pub fn is_desynced(&self, action: ActionIndex) -> bool {
        self.get(action) == DiffMark::Desynced
    }

    /// Actions currently marked desynced, in order.
    pub fn desynced(&self) -> impl Iterator<Item = ActionIndex> + '_ {
        self.marks
            .iter()
            .enumerate()
            .filter(|(_, m)| **m == DiffMark::Desynced)
            .map(|(i, _)| ActionIndex(i as u64 + 1))
    }

    /// Forget every mark.
    pub fn clear(&mut self) {
        self.marks.clear();
    }
}

/// Exit predicate of the change-by-change recovery loop.
///
/// Recovery stops once the position reached is at or past the seek target,
/// or when it is interrupted (the log ran out), even if the state has not
/// yet been brought back in line with the log.
pub fn reached_target(cur: ActionIndex, to: ActionIndex, by_interrupt: bool) -> bool {
    by_interrupt || cur >= to
}

/// Desync state that survives across sessions of the same identity.
#[derive(Clone, Debug, Default)]
pub struct DesyncTracker {
    bitmap: DiffBitmap,
    desynced: bool,
    notified: bool,
    last_detected: Option<ActionIndex>,
}

impl DesyncTracker {
    /// A tracker with nothing marked.
    pub fn new() -> Self {
        Self::default()
    }

    /// The per-action marks.
    pub fn bitmap(&self) -> &DiffBitmap {
        &self.bitmap
    }

    /// Whether a desync has been detected for the current identity.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Action of the most recent detection.
    pub fn last_detected(&self) -> Option<ActionIndex> {
        self.last_detected
    }

    /// Whether `action` must be re-simulated from change data.
    pub fn must_resimulate(&self, action: ActionIndex) -> bool {
        self.bitmap.is_desynced(action)
    }

    /// Record a divergence detected at `at`, marking everything from
    /// `since` (the last periodic checkpoint) through `at`.
    ///
    /// Returns `true` the first time this happens for the current identity,
    /// when the caller should notify the user.
    pub fn record(&mut self, since: ActionIndex, at: ActionIndex) -> bool {
        self.bitmap.mark_desynced(since..=at);
        self.desynced = true;
        self.last_detected = Some(at);
        let first = !self.notified;
        self.notified = true;
        first
    }

    /// Mark one action crossed during recovery.
    pub fn mark_crossed(&mut self, action: ActionIndex) {
        self.bitmap.set(action, DiffMark::Desynced);
    }

    /// Mark an action that replayed cleanly, unless it is already desynced.
    pub fn mark_safe(&mut self, action: ActionIndex) {
        if self.bitmap.get(action) == DiffMark::Unknown {
            self.bitmap.set(action, DiffMark::Safe);
        }
    }

    /// Grow the bitmap to cover a log of `action_count` commands.
    pub fn resize(&mut self, action_count: u64) {
        self.bitmap.resize(action_count);
    }

    /// Forget everything; used when the session identity changes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
