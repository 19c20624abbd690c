//! "After the current handler chain settles" task queue.
//!
//! Work that depends on side effects of other handlers (for example a
//! spatial-index rebuild that must observe a reparenting decision) is
//! deferred here and drained at a well-defined point instead of being
//! sequenced with timers.

use crossbeam_channel::{Receiver, Sender, unbounded};

#[derive(Debug, Clone)]
pub struct DeferredQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn defer(&self, task: T) {
        // Both halves live in self, so the channel cannot be disconnected.
        let _ = self.tx.send(task);
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Take every pending task in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T: PartialEq> DeferredQueue<T> {
    /// Like [`drain`](Self::drain) but keeps only the first occurrence of
    /// equal tasks.
    pub fn drain_unique(&self) -> Vec<T> {
        let mut out: Vec<T> = Vec::new();
        for task in self.rx.try_iter() {
            if !out.contains(&task) {
                out.push(task);
            }
        }
        out
    }
}
