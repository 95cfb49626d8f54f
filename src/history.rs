//! Transactional edit history.
//!
//! Every user gesture (pointer-down to pointer-up, or one discrete tool
//! invocation) owns exactly one [`Transaction`]: an ordered list of
//! `(index, previous color)` records appended *before* each pixel is
//! mutated. Multiple writes to the same index within a gesture each get
//! their own record; no de-duplication happens, and replay relies on that
//! order being preserved.
//!
//! The ledger holds two bounded circular stacks of committed
//! transactions. Pushing past capacity silently evicts the oldest entry,
//! which puts a hard depth limit on undo history and bounds memory.

use std::collections::VecDeque;

use crate::canvas::PixelCanvas;
use crate::color::Color;

/// One pre-mutation pixel record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelDiff {
    pub index: u32,
    pub previous: Color,
}

/// The per-gesture diff list. Created at gesture start and passed by the
/// caller to every mutating operation, so there is no ambient "open
/// transaction" state anywhere.
#[derive(Default)]
pub struct Transaction {
    diffs: Vec<PixelDiff>,
}

impl Transaction {
    pub fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    /// Record a pixel's current color. Call exactly once per pixel
    /// actually changed, immediately before overwriting it.
    #[inline]
    pub fn record(&mut self, index: usize, previous: Color) {
        self.diffs.push(PixelDiff {
            index: index as u32,
            previous,
        });
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Restore every recorded pixel and discard the transaction, for
    /// abandoning a gesture that never reaches the ledger. Applies in
    /// reverse append order like a committed undo would.
    pub fn rollback(self, canvas: &mut PixelCanvas) {
        for diff in self.diffs.iter().rev() {
            canvas.set_index(diff.index as usize, diff.previous);
        }
    }
}

/// Which stack a replay came from, deciding where its mirror goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReplayDirection {
    Undo,
    Redo,
}

/// Bounded undo/redo ledger.
pub struct EditLedger {
    undo: VecDeque<Transaction>,
    redo: VecDeque<Transaction>,
    capacity: usize,
    replay_frames: usize,
}

impl EditLedger {
    /// `capacity` bounds each stack; `replay_frames` is the step budget
    /// animated replay spreads a transaction over.
    pub fn new(capacity: usize, replay_frames: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            capacity: capacity.max(1),
            replay_frames: replay_frames.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Commit a finished gesture. Empty transactions are dropped (a
    /// gesture boundary only exists when something changed); a real
    /// commit invalidates the redo stack, since its diffs no longer
    /// replay against the state they were captured from.
    pub fn commit(&mut self, tx: Transaction) {
        if tx.is_empty() {
            return;
        }
        self.redo.clear();
        push_bounded(&mut self.undo, tx, self.capacity);
    }

    /// Synchronous undo. Returns `false` on an empty stack, which is a
    /// benign condition rather than an error.
    pub fn undo(&mut self, canvas: &mut PixelCanvas) -> bool {
        self.replay_sync(ReplayDirection::Undo, canvas)
    }

    /// Synchronous redo; exact inverse of [`EditLedger::undo`].
    pub fn redo(&mut self, canvas: &mut PixelCanvas) -> bool {
        self.replay_sync(ReplayDirection::Redo, canvas)
    }

    /// Begin a step-by-step undo for the visible replay animation.
    /// `None` on an empty stack.
    pub fn begin_undo_animated(&mut self) -> Option<ReplayCursor> {
        self.begin_animated(ReplayDirection::Undo)
    }

    /// Begin a step-by-step redo.
    pub fn begin_redo_animated(&mut self) -> Option<ReplayCursor> {
        self.begin_animated(ReplayDirection::Redo)
    }

    /// Store a finished cursor's mirror transaction on the opposite
    /// stack. Must be called once the cursor reports completion.
    pub fn finish_replay(&mut self, cursor: ReplayCursor) {
        debug_assert!(cursor.is_done());
        let mirror = Transaction {
            diffs: cursor.mirror,
        };
        if mirror.is_empty() {
            return;
        }
        match cursor.direction {
            ReplayDirection::Undo => push_bounded(&mut self.redo, mirror, self.capacity),
            ReplayDirection::Redo => push_bounded(&mut self.undo, mirror, self.capacity),
        }
    }

    fn begin_animated(&mut self, direction: ReplayDirection) -> Option<ReplayCursor> {
        let stack = match direction {
            ReplayDirection::Undo => &mut self.undo,
            ReplayDirection::Redo => &mut self.redo,
        };
        let Some(tx) = stack.pop_back() else {
            log::debug!("ledger: nothing to {:?}", direction);
            return None;
        };
        // Spread the whole transaction over roughly `replay_frames` steps.
        let chunk = tx.len().div_ceil(self.replay_frames).max(1);
        Some(ReplayCursor::new(tx, direction, chunk))
    }

    fn replay_sync(&mut self, direction: ReplayDirection, canvas: &mut PixelCanvas) -> bool {
        let Some(mut cursor) = self.begin_animated(direction) else {
            return false;
        };
        cursor.chunk = usize::MAX;
        let done = cursor.step(canvas);
        debug_assert!(done);
        self.finish_replay(cursor);
        true
    }
}

fn push_bounded(stack: &mut VecDeque<Transaction>, tx: Transaction, capacity: usize) {
    if stack.len() == capacity {
        stack.pop_front();
    }
    stack.push_back(tx);
}

// ============================================================================
// REPLAY CURSOR
// ============================================================================

/// In-progress replay of one transaction.
///
/// Records are applied in reverse append order while the color each one
/// overwrites is captured into a mirror transaction. Reverse application
/// is what makes the round-trip exact when a gesture touched the same
/// pixel more than once: the earliest record (the true pre-gesture color)
/// is the last one applied.
pub struct ReplayCursor {
    records: Vec<PixelDiff>,
    mirror: Vec<PixelDiff>,
    /// Number of records still to apply; counts down to zero.
    remaining: usize,
    /// Records applied per `step` call.
    chunk: usize,
    direction: ReplayDirection,
}

impl ReplayCursor {
    fn new(tx: Transaction, direction: ReplayDirection, chunk: usize) -> Self {
        let remaining = tx.diffs.len();
        Self {
            records: tx.diffs,
            mirror: Vec::with_capacity(remaining),
            remaining,
            chunk,
            direction,
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Apply one chunk of records. Returns `true` once the transaction is
    /// fully replayed; hand the cursor back to
    /// [`EditLedger::finish_replay`] at that point.
    pub fn step(&mut self, canvas: &mut PixelCanvas) -> bool {
        let mut budget = self.chunk;
        while budget > 0 && self.remaining > 0 {
            self.remaining -= 1;
            budget -= 1;
            let record = self.records[self.remaining];
            let index = record.index as usize;
            self.mirror.push(PixelDiff {
                index: record.index,
                previous: canvas.get_index(index),
            });
            canvas.set_index(index, record.previous);
        }
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::TRANSPARENT;

    fn write(canvas: &mut PixelCanvas, tx: &mut Transaction, x: u32, y: u32, c: Color) {
        let i = canvas.index(x, y).unwrap();
        tx.record(i, canvas.get_index(i));
        canvas.set_index(i, c);
    }

    fn snapshot(canvas: &PixelCanvas) -> Vec<Color> {
        canvas.pixels().to_vec()
    }

    #[test]
    fn undo_restores_pre_gesture_state_exactly() {
        let mut canvas = PixelCanvas::new_filled(3, 3, Color::opaque(0, 0, 0));
        let mut ledger = EditLedger::new(75, 600);
        let before = snapshot(&canvas);

        let mut tx = Transaction::new();
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(255, 0, 0));
        write(&mut canvas, &mut tx, 2, 1, Color::opaque(0, 255, 0));
        ledger.commit(tx);

        assert!(ledger.undo(&mut canvas));
        assert_eq!(snapshot(&canvas), before);
    }

    #[test]
    fn redo_is_the_exact_inverse_of_undo() {
        let mut canvas = PixelCanvas::new_filled(2, 2, Color::opaque(10, 10, 10));
        let mut ledger = EditLedger::new(75, 600);

        let mut tx = Transaction::new();
        write(&mut canvas, &mut tx, 1, 1, Color::opaque(50, 60, 70));
        ledger.commit(tx);
        let after = snapshot(&canvas);

        ledger.undo(&mut canvas);
        let undone = snapshot(&canvas);
        ledger.redo(&mut canvas);
        assert_eq!(snapshot(&canvas), after);
        // undo; redo; undo lands where a single undo does.
        ledger.undo(&mut canvas);
        assert_eq!(snapshot(&canvas), undone);
    }

    #[test]
    fn duplicate_index_writes_replay_in_order() {
        let mut canvas = PixelCanvas::new_filled(1, 1, TRANSPARENT);
        let mut ledger = EditLedger::new(75, 600);

        let mut tx = Transaction::new();
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(1, 1, 1));
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(2, 2, 2));
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(3, 3, 3));
        ledger.commit(tx);

        ledger.undo(&mut canvas);
        assert_eq!(canvas.get_pixel(0, 0), TRANSPARENT);
        ledger.redo(&mut canvas);
        assert_eq!(canvas.get_pixel(0, 0), Color::opaque(3, 3, 3));
        ledger.undo(&mut canvas);
        assert_eq!(canvas.get_pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let mut canvas = PixelCanvas::new_filled(1, 1, TRANSPARENT);
        let mut ledger = EditLedger::new(3, 600);

        for v in 1..=5u8 {
            let mut tx = Transaction::new();
            write(&mut canvas, &mut tx, 0, 0, Color::opaque(v, v, v));
            ledger.commit(tx);
        }
        assert_eq!(ledger.undo_len(), 3);

        // Only the three newest gestures can be undone.
        assert!(ledger.undo(&mut canvas));
        assert!(ledger.undo(&mut canvas));
        assert!(ledger.undo(&mut canvas));
        assert!(!ledger.undo(&mut canvas));
        assert_eq!(canvas.get_pixel(0, 0), Color::opaque(2, 2, 2));
    }

    #[test]
    fn empty_stacks_are_benign_no_ops() {
        let mut canvas = PixelCanvas::new(2, 2);
        let mut ledger = EditLedger::new(75, 600);
        assert!(!ledger.undo(&mut canvas));
        assert!(!ledger.redo(&mut canvas));
        assert!(ledger.begin_undo_animated().is_none());
    }

    #[test]
    fn empty_transaction_is_not_committed() {
        let mut ledger = EditLedger::new(75, 600);
        ledger.commit(Transaction::new());
        assert_eq!(ledger.undo_len(), 0);
    }

    #[test]
    fn new_commit_invalidates_redo() {
        let mut canvas = PixelCanvas::new_filled(1, 1, TRANSPARENT);
        let mut ledger = EditLedger::new(75, 600);

        let mut tx = Transaction::new();
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(9, 9, 9));
        ledger.commit(tx);
        ledger.undo(&mut canvas);
        assert_eq!(ledger.redo_len(), 1);

        let mut tx = Transaction::new();
        write(&mut canvas, &mut tx, 0, 0, Color::opaque(7, 7, 7));
        ledger.commit(tx);
        assert_eq!(ledger.redo_len(), 0);
    }

    #[test]
    fn animated_replay_matches_synchronous_result() {
        let mut fast = PixelCanvas::new_filled(8, 8, TRANSPARENT);
        let mut slow = PixelCanvas::new_filled(8, 8, TRANSPARENT);
        let mut fast_ledger = EditLedger::new(75, 4); // tiny frame budget
        let mut slow_ledger = EditLedger::new(75, 4);

        for (canvas, ledger) in [(&mut fast, &mut fast_ledger), (&mut slow, &mut slow_ledger)] {
            let mut tx = Transaction::new();
            for i in 0..40u32 {
                write(canvas, &mut tx, i % 8, i / 8, Color::opaque(i as u8, 0, 0));
            }
            ledger.commit(tx);
        }

        fast_ledger.undo(&mut fast);

        let mut cursor = slow_ledger.begin_undo_animated().unwrap();
        let mut steps = 0;
        while !cursor.step(&mut slow) {
            steps += 1;
            assert!(steps < 1000);
        }
        slow_ledger.finish_replay(cursor);

        assert_eq!(fast.pixels(), slow.pixels());
        // 40 records over a 4-frame budget: 10 per step, 4 steps total.
        assert_eq!(steps, 3);
        assert_eq!(slow_ledger.redo_len(), 1);
    }
}
