use crate::slices::StateSlices;
use crate::store::panic_message;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Token returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Pass it back to `unsubscribe` to stop the reactor.
#[must_use]
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactorHandle(u64);

pub type ReactorFn = Box<dyn FnMut(&StateSlices)>;

/// Callbacks re-run after every pass that applied at least one action.
pub(crate) struct ReactorRegistry {
    entries: Vec<(u64, ReactorFn)>,
    next_id: u64,
}

impl ReactorRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn subscribe(&mut self, reactor: ReactorFn) -> ReactorHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, reactor));
        ReactorHandle(id)
    }

    pub(crate) fn unsubscribe(&mut self, handle: ReactorHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != handle.0);
        self.entries.len() != before
    }

    /// A panicking reactor is logged and the rest still run.
    pub(crate) fn run(&mut self, store: &str, state: &StateSlices) {
        for (id, reactor) in &mut self.entries {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reactor(state))) {
                error!(
                    store,
                    reactor = *id,
                    panic = panic_message(payload.as_ref()),
                    "reactor panicked"
                );
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
