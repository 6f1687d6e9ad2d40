//! The checkpoint arena and its ordered chain.

use retrace_core::{ActionIndex, SessionId};

use crate::checkpoint::Checkpoint;
use crate::id::CheckpointId;

/// A single arena slot.
#[derive(Debug)]
struct Slot {
    /// Bumped every time the slot is freed.
    generation: u32,
    entry: Option<Checkpoint>,
}

/// Ordered collection of checkpoints, at most one per action.
///
/// Structural violations (an out-of-order link, a dangling id inside the
/// chain, a nested restore) are programming errors and panic.
///
/// # Examples
///
/// ```
/// use retrace_checkpoint::{Checkpoint, CheckpointState, CheckpointStore};
/// use retrace_core::{ActionIndex, MoveIndex};
///
/// let mut store = CheckpointStore::new();
/// for action in [1, 51, 101] {
///     let cp = Checkpoint::new(ActionIndex(action), MoveIndex(action), CheckpointState::Blob(vec![]), 0);
///     store.create_or_replace(cp);
/// }
/// let id = store.nearest_behind(ActionIndex(80)).unwrap();
/// assert_eq!(store.get(id).unwrap().action, ActionIndex(51));
/// assert!(store.nearest_behind(ActionIndex(0)).is_none());
/// ```
#[derive(Debug, Default)]
pub struct CheckpointStore {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    head: Option<CheckpointId>,
    tail: Option<CheckpointId>,
    /// Most recently linked node; searches start here.
    near: Option<CheckpointId>,
    len: usize,
    session: Option<SessionId>,
    restoring: Option<CheckpointId>,
}

impl CheckpointStore {
    /// An empty store bound to no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of linked checkpoints.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no checkpoint is linked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of desync-originated checkpoints.
    pub fn desync_count(&self) -> usize {
        self.iter().filter(|(_, cp)| cp.is_desync()).count()
    }

    /// The checkpoint behind `id`, if `id` is still live.
    pub fn get(&self, id: CheckpointId) -> Option<&Checkpoint> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    /// Earliest checkpoint.
    pub fn head(&self) -> Option<CheckpointId> {
        self.head
    }

    /// Latest checkpoint.
    pub fn tail(&self) -> Option<CheckpointId> {
        self.tail
    }

    /// Checkpoints in action order.
    pub fn iter(&self) -> impl Iterator<Item = (CheckpointId, &Checkpoint)> + '_ {
        std::iter::successors(self.head, move |&id| self.node(id).next).map(move |id| (id, self.node(id)))
    }

    // ── Lookup ──────────────────────────────────────────────────

    /// The checkpoint at exactly `action`.
    pub fn at_action(&self, action: ActionIndex) -> Option<CheckpointId> {
        self.nearest_behind(action)
            .filter(|&id| self.node(id).action == action)
    }

    /// The latest checkpoint whose nominal action is at or before `action`.
    pub fn nearest_behind(&self, action: ActionIndex) -> Option<CheckpointId> {
        self.locate(action).0
    }

    /// The earliest checkpoint whose nominal action is after `action`.
    pub fn nearest_ahead(&self, action: ActionIndex) -> Option<CheckpointId> {
        self.locate(action).1
    }

    /// `(behind, ahead)` such that `behind.action <= action < ahead.action`.
    fn locate(&self, action: ActionIndex) -> (Option<CheckpointId>, Option<CheckpointId>) {
        let start = self.near.filter(|&id| self.get(id).is_some()).or(self.head);
        let Some(mut id) = start else {
            return (None, None);
        };
        if self.node(id).action <= action {
            while let Some(next) = self.node(id).next {
                if self.node(next).action > action {
                    return (Some(id), Some(next));
                }
                id = next;
            }
            (Some(id), None)
        } else {
            while let Some(prev) = self.node(id).prev {
                if self.node(prev).action <= action {
                    return (Some(prev), Some(id));
                }
                id = prev;
            }
            (None, Some(id))
        }
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Link `checkpoint` into the chain.
    ///
    /// A checkpoint already at the same action has its contents replaced in
    /// place and keeps its id.
    pub fn create_or_replace(&mut self, mut checkpoint: Checkpoint) -> CheckpointId {
        let (behind, ahead) = self.locate(checkpoint.action);

        if let Some(id) = behind.filter(|&id| self.node(id).action == checkpoint.action) {
            if self.restoring == Some(id) {
                panic!("checkpoint {id} replaced while it is being restored");
            }
            let node = self.node_mut(id);
            checkpoint.prev = node.prev;
            checkpoint.next = node.next;
            *node = checkpoint;
            self.near = Some(id);
            return id;
        }

        checkpoint.prev = behind;
        checkpoint.next = ahead;
        let id = self.alloc(checkpoint);
        match behind {
            Some(b) => self.node_mut(b).next = Some(id),
            None => self.head = Some(id),
        }
        match ahead {
            Some(a) => self.node_mut(a).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        self.near = Some(id);
        self.assert_ordered(id);
        id
    }

    /// Unlink and free a checkpoint. Stale ids return `None`.
    pub fn remove(&mut self, id: CheckpointId) -> Option<Checkpoint> {
        self.get(id)?;
        if self.restoring == Some(id) {
            panic!("checkpoint {id} removed while it is being restored");
        }
        let slot = &mut self.slots[id.index as usize];
        let mut checkpoint = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);

        let (prev, next) = (checkpoint.prev.take(), checkpoint.next.take());
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        if self.near == Some(id) {
            self.near = prev.or(next);
        }
        Some(checkpoint)
    }

    /// Drop every checkpoint. Outstanding ids become stale.
    pub fn clear(&mut self) {
        if let Some(active) = self.restoring {
            panic!("checkpoint store cleared while {active} is being restored");
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
        self.head = None;
        self.tail = None;
        self.near = None;
        self.len = 0;
    }

    /// Discard desync checkpoints beyond `budget`, farthest from `current`
    /// first. Periodic checkpoints are never pruned. Returns the number
    /// removed.
    pub fn prune_desync(&mut self, budget: usize, current: ActionIndex) -> usize {
        let mut desync: Vec<(u64, CheckpointId)> = self
            .iter()
            .filter(|(_, cp)| cp.is_desync())
            .map(|(id, cp)| (cp.action.0.abs_diff(current.0), id))
            .collect();
        if desync.len() <= budget {
            return 0;
        }
        desync.sort_by(|a, b| b.0.cmp(&a.0));
        let excess = desync.len() - budget;
        for &(_, id) in &desync[..excess] {
            self.remove(id);
        }
        excess
    }

    // ── Session identity ────────────────────────────────────────

    /// The session the stored checkpoints belong to.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Bind the store to `session`.
    ///
    /// Returns `true` if the store was reset because it held checkpoints
    /// for a different session (or none).
    pub fn bind_session(&mut self, session: &SessionId) -> bool {
        if self.session.as_ref() == Some(session) {
            return false;
        }
        self.clear();
        self.session = Some(session.clone());
        true
    }

    // ── Restore bracket ─────────────────────────────────────────

    /// Mark `id` as being restored and return it.
    ///
    /// # Panics
    ///
    /// If another restore has not been closed with
    /// [`end_restore`](Self::end_restore).
    pub fn begin_restore(&mut self, id: CheckpointId) -> Option<&Checkpoint> {
        if let Some(active) = self.restoring {
            panic!("restore of {id} started while {active} is still being restored");
        }
        self.get(id)?;
        self.restoring = Some(id);
        self.get(id)
    }

    /// Close the restore bracket.
    pub fn end_restore(&mut self) {
        self.restoring = None;
    }

    /// Whether a restore is in progress.
    pub fn is_restoring(&self) -> bool {
        self.restoring.is_some()
    }

    // ── Invariants ──────────────────────────────────────────────

    /// Walk the whole chain and panic on the first structural violation.
    pub fn check_chain(&self) {
        let mut count = 0;
        let mut prev: Option<CheckpointId> = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = self.node(id);
            assert_eq!(node.prev, prev, "checkpoint {id} has a broken back link");
            if let Some(p) = prev {
                assert!(
                    self.node(p).action < node.action,
                    "checkpoint chain out of order at {id}"
                );
            }
            count += 1;
            prev = Some(id);
            cursor = node.next;
        }
        assert_eq!(self.tail, prev, "checkpoint chain tail does not match");
        assert_eq!(self.len, count, "checkpoint count does not match chain");
    }

    fn assert_ordered(&self, id: CheckpointId) {
        let node = self.node(id);
        if let Some(p) = node.prev {
            assert!(
                self.node(p).action < node.action,
                "checkpoint chain out of order before {id}"
            );
        }
        if let Some(n) = node.next {
            assert!(
                node.action < self.node(n).action,
                "checkpoint chain out of order after {id}"
            );
        }
    }

    fn alloc(&mut self, checkpoint: Checkpoint) -> CheckpointId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(checkpoint);
            CheckpointId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(checkpoint),
            });
            CheckpointId::new(index, 0)
        }
    }

    fn node(&self, id: CheckpointId) -> &Checkpoint {
        match self.get(id) {
            Some(cp) => cp,
            None => panic!("checkpoint chain references dead slot {id}"),
        }
    }

    fn node_mut(&mut self, id: CheckpointId) -> &mut Checkpoint {
        let slot = match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => slot,
            _ => panic!("checkpoint chain references dead slot {id}"),
        };
        match slot.entry.as_mut() {
            Some(cp) => cp,
            None => panic!("checkpoint chain references dead slot {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointState, Origin};
    use retrace_core::MoveIndex;

    fn periodic(action: u64) -> Checkpoint {
        Checkpoint::new(
            ActionIndex(action),
            MoveIndex(action * 2),
            CheckpointState::Blob(vec![action as u8]),
            action as usize,
        )
    }

    fn desync(action: u64, from: u64) -> Checkpoint {
        Checkpoint::new(
            ActionIndex(action),
            MoveIndex(action),
            CheckpointState::LogOffset(action as usize),
            from as usize,
        )
        .resumed_from(ActionIndex(from), MoveIndex(from))
    }

    fn actions(store: &CheckpointStore) -> Vec<u64> {
        store.iter().map(|(_, cp)| cp.action.0).collect()
    }

    #[test]
    fn out_of_order_inserts_stay_sorted() {
        let mut store = CheckpointStore::new();
        for a in [101, 1, 51, 151, 26] {
            store.create_or_replace(periodic(a));
        }
        assert_eq!(actions(&store), vec![1, 26, 51, 101, 151]);
        store.check_chain();
    }

    #[test]
    fn recreate_replaces_in_place() {
        let mut store = CheckpointStore::new();
        let first = store.create_or_replace(periodic(51));
        store.create_or_replace(periodic(101));
        let again = store.create_or_replace(desync(51, 54));
        assert_eq!(first, again);
        assert_eq!(store.len(), 2);
        let cp = store.get(again).unwrap();
        assert_eq!(cp.origin, Origin::Desync);
        assert_eq!(cp.from_action, ActionIndex(54));
        store.check_chain();
    }

    #[test]
    fn nearest_lookups_bracket_the_action() {
        let mut store = CheckpointStore::new();
        for a in [1, 51, 101] {
            store.create_or_replace(periodic(a));
        }
        let behind = |s: &CheckpointStore, a| s.nearest_behind(ActionIndex(a)).map(|id| s.get(id).unwrap().action.0);
        let ahead = |s: &CheckpointStore, a| s.nearest_ahead(ActionIndex(a)).map(|id| s.get(id).unwrap().action.0);
        assert_eq!(behind(&store, 51), Some(51));
        assert_eq!(behind(&store, 100), Some(51));
        assert_eq!(behind(&store, 500), Some(101));
        assert_eq!(ahead(&store, 51), Some(101));
        assert_eq!(ahead(&store, 101), None);
        assert_eq!(ahead(&store, 0), Some(1));
        assert!(store.at_action(ActionIndex(52)).is_none());
    }

    #[test]
    fn removed_ids_go_stale_and_slots_are_reused() {
        let mut store = CheckpointStore::new();
        let a = store.create_or_replace(periodic(1));
        let b = store.create_or_replace(periodic(51));
        store.remove(b).unwrap();
        assert!(store.get(b).is_none());
        assert!(store.remove(b).is_none());

        let c = store.create_or_replace(periodic(76));
        assert_eq!(c.index(), b.index());
        assert_ne!(c.generation(), b.generation());
        assert_eq!(store.get(a).unwrap().next(), Some(c));
        store.check_chain();
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut store = CheckpointStore::new();
        let id = store.create_or_replace(periodic(1));
        store.clear();
        assert!(store.is_empty());
        assert!(store.get(id).is_none());
        assert!(store.head().is_none() && store.tail().is_none());
        store.check_chain();
    }

    #[test]
    fn prune_keeps_nearest_desync_and_all_periodic() {
        let mut store = CheckpointStore::new();
        store.create_or_replace(periodic(1));
        store.create_or_replace(periodic(51));
        for a in [10, 20, 30, 60, 70] {
            store.create_or_replace(desync(a, a + 2));
        }
        let removed = store.prune_desync(2, ActionIndex(62));
        assert_eq!(removed, 3);
        assert_eq!(actions(&store), vec![1, 51, 60, 70]);
        assert_eq!(store.desync_count(), 2);
        assert_eq!(store.prune_desync(2, ActionIndex(62)), 0);
        store.check_chain();
    }

    #[test]
    fn bind_session_resets_only_on_identity_change() {
        let mut store = CheckpointStore::new();
        let alice = SessionId::new("alice", 100);
        assert!(store.bind_session(&alice));
        store.create_or_replace(periodic(1));
        assert!(!store.bind_session(&alice));
        assert_eq!(store.len(), 1);
        assert!(store.bind_session(&SessionId::new("alice", 101)));
        assert!(store.is_empty());
    }

    #[test]
    #[should_panic(expected = "still being restored")]
    fn nested_restore_panics() {
        let mut store = CheckpointStore::new();
        let a = store.create_or_replace(periodic(1));
        let b = store.create_or_replace(periodic(51));
        store.begin_restore(a);
        store.begin_restore(b);
    }

    #[test]
    fn restore_bracket_closes() {
        let mut store = CheckpointStore::new();
        let a = store.create_or_replace(periodic(1));
        assert!(store.begin_restore(a).is_some());
        assert!(store.is_restoring());
        store.end_restore();
        assert!(!store.is_restoring());
        assert!(store.remove(a).is_some());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Insert(u64),
            InsertDesync(u64),
            Remove(usize),
            Prune(usize, u64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1u64..200).prop_map(Op::Insert),
                (1u64..200).prop_map(Op::InsertDesync),
                (0usize..64).prop_map(Op::Remove),
                (0usize..5, 1u64..200).prop_map(|(b, c)| Op::Prune(b, c)),
            ]
        }

        proptest! {
            #[test]
            fn chain_stays_ordered_and_unique(ops in prop::collection::vec(op(), 1..80)) {
                let mut store = CheckpointStore::new();
                let mut model = std::collections::BTreeSet::new();
                for op in ops {
                    match op {
                        Op::Insert(a) => {
                            store.create_or_replace(periodic(a));
                            model.insert(a);
                        }
                        Op::InsertDesync(a) => {
                            store.create_or_replace(desync(a, a + 3));
                            model.insert(a);
                        }
                        Op::Remove(n) => {
                            let ids: Vec<_> = store.iter().map(|(id, _)| id).collect();
                            if !ids.is_empty() {
                                let id = ids[n % ids.len()];
                                let cp = store.remove(id).unwrap();
                                model.remove(&cp.action.0);
                            }
                        }
                        Op::Prune(budget, current) => {
                            store.prune_desync(budget, ActionIndex(current));
                            prop_assert!(store.desync_count() <= budget);
                            model = store.iter().map(|(_, cp)| cp.action.0).collect();
                        }
                    }
                    store.check_chain();
                    let listed: Vec<u64> = store.iter().map(|(_, cp)| cp.action.0).collect();
                    let expected: Vec<u64> = model.iter().copied().collect();
                    prop_assert_eq!(listed, expected);
                }
            }
        }
    }
}
