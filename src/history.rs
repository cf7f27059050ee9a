//! Bounded undo/redo history with debounced settling.
//!
//! Settled mutations are recorded through [`History::record`], which arms a
//! short debounce on the clock rather than pushing immediately, so a burst of
//! updates (a drag commit plus its push displacements, a multi-step command)
//! collapses into one entry. [`History::flush`] runs from the scheduler tick
//! and from undo/redo themselves, which must see the latest settled state.

use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::Clock;
use crate::grid::GridSnapshot;

#[derive(Debug)]
pub struct History {
    entries: VecDeque<GridSnapshot>,
    /// Index of the entry the store currently matches.
    cursor: usize,
    capacity: usize,
    debounce: Duration,
    pending: Option<(GridSnapshot, Duration)>,
    clock: Clock,
}

impl History {
    pub fn new(initial: GridSnapshot, capacity: usize, debounce: Duration, clock: Clock) -> Self {
        let mut entries = VecDeque::with_capacity(capacity);
        entries.push_back(initial);
        Self {
            entries,
            cursor: 0,
            capacity: capacity.max(1),
            debounce,
            pending: None,
            clock,
        }
    }

    /// Schedules a settled snapshot for the history. Re-recording before the
    /// debounce expires replaces the pending snapshot and restarts the timer.
    pub fn record(&mut self, snapshot: GridSnapshot) {
        let due = self.clock.now() + self.debounce;
        self.pending = Some((snapshot, due));
    }

    /// Pushes the pending snapshot if its debounce has expired. Returns
    /// whether an entry was pushed.
    pub fn maybe_flush(&mut self) -> bool {
        let due = match &self.pending {
            Some((_, due)) => *due,
            None => return false,
        };
        if self.clock.now() >= due {
            self.flush()
        } else {
            false
        }
    }

    /// Pushes the pending snapshot immediately, if any.
    pub fn flush(&mut self) -> bool {
        let Some((snapshot, _)) = self.pending.take() else {
            return false;
        };

        // Identical states don't deserve an entry; undo would be a no-op.
        if self.entries[self.cursor] == snapshot {
            return false;
        }

        // Pushing past the cursor discards redo entries.
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(snapshot);

        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
        true
    }

    /// Steps back one entry. No-op at the oldest entry.
    pub fn undo(&mut self) -> Option<GridSnapshot> {
        self.flush();
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    /// Steps forward one entry. No-op at the newest entry.
    pub fn redo(&mut self) -> Option<GridSnapshot> {
        self.flush();
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }

    /// Drops everything and starts over from a single entry. Used after an
    /// import, which fully replaces the state.
    pub fn reset(&mut self, initial: GridSnapshot) {
        self.entries.clear();
        self.entries.push_back(initial);
        self.cursor = 0;
        self.pending = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::geometry::Rect;
    use crate::grid::{GridState, Widget};
    use crate::Options;

    fn snapshot_with_widget(x: f64) -> GridSnapshot {
        let mut state = GridState::new(Rc::new(Options::default()));
        state
            .add_widget(Widget::new(Rect::new(x, 0., 100., 100.), "w", "chart"))
            .unwrap();
        state.snapshot()
    }

    fn history() -> (History, Clock) {
        let clock = Clock::new();
        let history = History::new(
            snapshot_with_widget(0.),
            50,
            Duration::from_millis(100),
            clock.clone(),
        );
        (history, clock)
    }

    #[test]
    fn debounce_coalesces_rapid_records() {
        let (mut history, clock) = history();

        history.record(snapshot_with_widget(20.));
        clock.advance(Duration::from_millis(50));
        assert!(!history.maybe_flush());

        history.record(snapshot_with_widget(40.));
        clock.advance(Duration::from_millis(50));
        // First record's deadline has passed, but the re-record restarted it.
        assert!(!history.maybe_flush());

        clock.advance(Duration::from_millis(50));
        assert!(history.maybe_flush());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn undo_redo_round_trip() {
        let (mut history, _clock) = history();

        let snapshots: Vec<_> = (1..=5).map(|i| snapshot_with_widget(f64::from(i) * 20.)).collect();
        for snapshot in &snapshots {
            history.record(snapshot.clone());
            history.flush();
        }

        let mut restored = Vec::new();
        while let Some(snapshot) = history.undo() {
            restored.push(snapshot);
        }
        assert_eq!(restored.len(), 5);

        let mut replayed = Vec::new();
        while let Some(snapshot) = history.redo() {
            replayed.push(snapshot);
        }
        assert_eq!(replayed.len(), 5);
        // Redo all the way forward restores the exact final state.
        assert_eq!(replayed.last(), snapshots.last());
    }

    #[test]
    fn push_after_undo_truncates_redo() {
        let (mut history, _clock) = history();

        history.record(snapshot_with_widget(20.));
        history.flush();
        history.record(snapshot_with_widget(40.));
        history.flush();

        history.undo().unwrap();
        history.record(snapshot_with_widget(60.));
        history.flush();

        // The 40-entry branch is gone.
        assert!(history.redo().is_none());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let clock = Clock::new();
        let mut history = History::new(
            snapshot_with_widget(0.),
            3,
            Duration::ZERO,
            clock.clone(),
        );

        for i in 1..=5 {
            history.record(snapshot_with_widget(f64::from(i) * 20.));
            history.flush();
        }

        assert_eq!(history.len(), 3);
        // Undo bottoms out before reaching the evicted entries.
        assert!(history.undo().is_some());
        assert!(history.undo().is_some());
        assert!(history.undo().is_none());
    }

    #[test]
    fn identical_snapshots_are_not_pushed() {
        let (mut history, _clock) = history();
        let snapshot = snapshot_with_widget(20.);

        history.record(snapshot.clone());
        history.flush();
        history.record(snapshot);
        assert!(!history.flush());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn undo_flushes_pending_first() {
        let (mut history, _clock) = history();

        history.record(snapshot_with_widget(20.));
        // Debounce hasn't expired, but undo must not lose the settled state.
        let restored = history.undo().unwrap();
        assert_eq!(history.len(), 2);
        // Undo lands on the initial entry.
        assert_eq!(restored.widgets[0].rect.loc.x, 0.);
    }
}
