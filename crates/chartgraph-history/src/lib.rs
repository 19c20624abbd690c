//! Grouped undo/redo action log.
//!
//! Actions hold plain command values rather than closures; a [`TaskRunner`]
//! supplied by the caller interprets them. The archiver itself knows nothing
//! about the diagram.

use serde::{Deserialize, Serialize};

/// One step of an undo or redo list: a command to execute and the events to
/// re-emit once it has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTask<C, E> {
    pub command: C,
    pub events: Vec<E>,
}

impl<C, E> ActionTask<C, E> {
    pub fn new(command: C, events: Vec<E>) -> Self {
        Self { command, events }
    }

    pub fn silent(command: C) -> Self {
        Self {
            command,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<C, E> {
    pub undo: Vec<ActionTask<C, E>>,
    pub redo: Vec<ActionTask<C, E>>,
}

impl<C, E> Default for Action<C, E> {
    fn default() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }
}

impl<C, E> Action<C, E> {
    pub fn new(undo: Vec<ActionTask<C, E>>, redo: Vec<ActionTask<C, E>>) -> Self {
        Self { undo, redo }
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty() && self.redo.is_empty()
    }

    /// Fold a later action into this one. Undo tasks of the later action run
    /// first so the combined action unwinds in reverse order.
    fn absorb(&mut self, later: Action<C, E>) {
        let mut undo = later.undo;
        undo.append(&mut self.undo);
        self.undo = undo;
        self.redo.extend(later.redo);
    }
}

/// Executes archived commands on behalf of the archiver.
pub trait TaskRunner<C, E> {
    type Error;

    fn run(&mut self, command: &C) -> Result<(), Self::Error>;

    /// Re-emit an archived event, marked as a restore.
    fn replay(&mut self, event: &E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Off,
    /// Grouping is on; `started` turns true once the group's first action
    /// has been pushed.
    Open { started: bool },
}

/// Manages action history for undo/redo
#[derive(Debug, Clone)]
pub struct ActionsArchiver<C, E> {
    actions: Vec<Action<C, E>>,
    /// Index of the action the next undo will revert; `None` when there is
    /// nothing to undo.
    pointer: Option<usize>,
    grouping: Grouping,
    limit: Option<usize>,
}

impl<C, E> Default for ActionsArchiver<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> ActionsArchiver<C, E> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            pointer: None,
            grouping: Grouping::Off,
            limit: None,
        }
    }

    /// Archiver that evicts the oldest actions beyond `limit` entries.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    pub fn push(&mut self, action: Action<C, E>) {
        if action.is_empty() {
            return;
        }

        if let Grouping::Open { started: true } = self.grouping
            && let Some(current) = self.pointer.and_then(|p| self.actions.get_mut(p))
        {
            current.absorb(action);
            return;
        }

        // A new action discards everything past the pointer.
        let keep = self.pointer.map_or(0, |p| p + 1);
        self.actions.truncate(keep);
        self.actions.push(action);
        self.pointer = Some(self.actions.len() - 1);

        if let Grouping::Open { started } = &mut self.grouping {
            *started = true;
        }

        if let Some(limit) = self.limit {
            while self.actions.len() > limit.max(1) {
                self.actions.remove(0);
                self.pointer = self.pointer.and_then(|p| p.checked_sub(1));
            }
        }

        tracing::debug!(len = self.actions.len(), pointer = ?self.pointer, "action pushed");
    }

    /// Start coalescing subsequent pushes into one action. Nested calls are
    /// flattened into the outer group.
    pub fn begin_group(&mut self) {
        if self.grouping == Grouping::Off {
            self.grouping = Grouping::Open { started: false };
        }
    }

    pub fn end_group(&mut self) {
        self.grouping = Grouping::Off;
    }

    pub fn is_grouping(&self) -> bool {
        self.grouping != Grouping::Off
    }

    /// Revert the action at the pointer. Returns `Ok(false)` when there is
    /// nothing to undo.
    ///
    /// A failing task aborts the replay and leaves the pointer where it was,
    /// even though earlier tasks of the same action have already run.
    pub fn undo<R>(&mut self, runner: &mut R) -> Result<bool, R::Error>
    where
        R: TaskRunner<C, E>,
    {
        self.end_group();
        let Some(index) = self.pointer else {
            return Ok(false);
        };
        for task in &self.actions[index].undo {
            runner.run(&task.command)?;
            for event in &task.events {
                runner.replay(event);
            }
        }
        self.pointer = index.checked_sub(1);
        Ok(true)
    }

    /// Re-apply the action after the pointer. Returns `Ok(false)` when there
    /// is nothing to redo.
    pub fn redo<R>(&mut self, runner: &mut R) -> Result<bool, R::Error>
    where
        R: TaskRunner<C, E>,
    {
        self.end_group();
        let index = self.pointer.map_or(0, |p| p + 1);
        let Some(action) = self.actions.get(index) else {
            return Ok(false);
        };
        for task in &action.redo {
            runner.run(&task.command)?;
            for event in &task.events {
                runner.replay(event);
            }
        }
        self.pointer = Some(index);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.pointer.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.pointer.map_or(0, |p| p + 1) < self.actions.len()
    }

    pub fn pointer(&self) -> Option<usize> {
        self.pointer
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action<C, E>] {
        &self.actions
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.pointer = None;
        self.grouping = Grouping::Off;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Commands are "set the counter to n"; events are recorded strings.
    #[derive(Default)]
    struct Counter {
        value: i32,
        replayed: Vec<&'static str>,
        fail_on: Option<i32>,
    }

    impl TaskRunner<i32, &'static str> for Counter {
        type Error = String;

        fn run(&mut self, command: &i32) -> Result<(), String> {
            if self.fail_on == Some(*command) {
                return Err(format!("cannot set {command}"));
            }
            self.value = *command;
            Ok(())
        }

        fn replay(&mut self, event: &&'static str) {
            self.replayed.push(event);
        }
    }

    fn set(from: i32, to: i32) -> Action<i32, &'static str> {
        Action::new(
            vec![ActionTask::new(from, vec!["changed"])],
            vec![ActionTask::new(to, vec!["changed"])],
        )
    }

    #[test]
    fn test_undo_redo_moves_pointer() {
        let mut counter = Counter::default();
        let mut history = ActionsArchiver::new();

        counter.value = 1;
        history.push(set(0, 1));
        counter.value = 2;
        history.push(set(1, 2));

        assert_eq!(history.pointer(), Some(1));
        assert!(history.undo(&mut counter).unwrap());
        assert_eq!(counter.value, 1);
        assert!(history.undo(&mut counter).unwrap());
        assert_eq!(counter.value, 0);
        assert!(!history.undo(&mut counter).unwrap());
        assert_eq!(history.pointer(), None);

        assert!(history.redo(&mut counter).unwrap());
        assert_eq!(counter.value, 1);
        assert_eq!(counter.replayed.len(), 3);
    }

    #[test]
    fn test_push_after_undo_discards_redo_history() {
        let mut counter = Counter::default();
        let mut history = ActionsArchiver::new();
        history.push(set(0, 1));
        history.push(set(1, 2));
        history.undo(&mut counter).unwrap();
        assert!(history.can_redo());

        history.push(set(1, 5));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        history.undo(&mut counter).unwrap();
        assert_eq!(counter.value, 1);
    }

    #[test]
    fn test_grouping_coalesces_and_unwinds_in_reverse() {
        let mut counter = Counter::default();
        let mut history = ActionsArchiver::new();
        history.push(set(0, 1));

        history.begin_group();
        history.push(set(1, 2));
        history.begin_group(); // flattened
        history.push(set(2, 3));
        history.end_group();

        assert_eq!(history.len(), 2);
        history.undo(&mut counter).unwrap();
        // Undo of the group restores the state before its first step.
        assert_eq!(counter.value, 1);
        history.redo(&mut counter).unwrap();
        assert_eq!(counter.value, 3);
    }

    #[test]
    fn test_failed_task_leaves_pointer() {
        let mut counter = Counter {
            fail_on: Some(0),
            ..Default::default()
        };
        let mut history = ActionsArchiver::new();
        history.push(set(0, 1));
        let err = history.undo(&mut counter).unwrap_err();
        assert_eq!(err, "cannot set 0");
        assert_eq!(history.pointer(), Some(0));
    }

    #[test]
    fn test_limit_evicts_oldest() {
        let mut history: ActionsArchiver<i32, &'static str> = ActionsArchiver::with_limit(Some(2));
        history.push(set(0, 1));
        history.push(set(1, 2));
        history.push(set(2, 3));
        assert_eq!(history.len(), 2);
        assert_eq!(history.pointer(), Some(1));
        assert_eq!(history.actions()[0].redo[0].command, 2);
    }

    #[test]
    fn test_empty_action_ignored() {
        let mut history: ActionsArchiver<i32, &'static str> = ActionsArchiver::new();
        history.push(Action::default());
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    struct Value(i32);

    impl TaskRunner<i32, ()> for Value {
        type Error = ();
        fn run(&mut self, command: &i32) -> Result<(), ()> {
            self.0 = *command;
            Ok(())
        }
        fn replay(&mut self, _: &()) {}
    }

    proptest! {
        /// Undoing everything returns to the initial value and redoing
        /// everything returns to the last value.
        #[test]
        fn prop_full_unwind_and_replay(values in proptest::collection::vec(-100i32..100, 1..20)) {
            let mut state = Value(0);
            let mut history = ActionsArchiver::new();
            let mut previous = 0;
            for v in &values {
                state.0 = *v;
                history.push(Action::new(
                    vec![ActionTask::silent(previous)],
                    vec![ActionTask::silent(*v)],
                ));
                previous = *v;
            }
            while history.undo(&mut state).unwrap() {}
            prop_assert_eq!(state.0, 0);
            while history.redo(&mut state).unwrap() {}
            prop_assert_eq!(state.0, *values.last().unwrap());
        }
    }
}
