use crate::action::{Action, ActionDraft};
use crate::error::{ReceptorError, StoreError};
use crate::slices::StateSlices;

/// Handle for a registered receptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceptorId(pub(crate) u64);

/// A function reacting to every applied action.
pub type ReceptorFn<A> =
    Box<dyn FnMut(&mut ReceptorContext<'_, A>, &Action<A>) -> Result<(), ReceptorError>>;

pub(crate) enum ReceptorChange<A> {
    Add(ReceptorId, ReceptorFn<A>),
    Remove(ReceptorId),
}

pub(crate) struct PendingDispatch<A> {
    pub(crate) draft: ActionDraft<A>,
    pub(crate) local: bool,
}

/// Receptors in registration order.
pub(crate) struct ReceptorRegistry<A> {
    pub(crate) entries: Vec<(ReceptorId, ReceptorFn<A>)>,
    pub(crate) next_id: u64,
}

impl<A> ReceptorRegistry<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn allocate(next_id: &mut u64) -> ReceptorId {
        let id = ReceptorId(*next_id);
        *next_id += 1;
        id
    }

    pub(crate) fn push(&mut self, id: ReceptorId, receptor: ReceptorFn<A>) {
        self.entries.push((id, receptor));
    }

    pub(crate) fn remove(&mut self, id: ReceptorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn apply(&mut self, change: ReceptorChange<A>) {
        match change {
            ReceptorChange::Add(id, receptor) => self.push(id, receptor),
            ReceptorChange::Remove(id) => {
                self.remove(id);
            }
        }
    }

    pub(crate) fn contains(&self, id: ReceptorId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }
}

/// What a receptor can touch while it handles one action.
///
/// Receptor list changes and dispatches made here are applied once every
/// receptor has seen the current action.
pub struct ReceptorContext<'a, A> {
    pub(crate) receptor: ReceptorId,
    pub(crate) state: &'a mut StateSlices,
    pub(crate) next_id: &'a mut u64,
    pub(crate) changes: &'a mut Vec<ReceptorChange<A>>,
    pub(crate) dispatched: &'a mut Vec<PendingDispatch<A>>,
}

impl<A> ReceptorContext<'_, A> {
    /// Id of the receptor currently running.
    pub fn receptor_id(&self) -> ReceptorId {
        self.receptor
    }

    pub fn state<S: 'static>(&self, name: &str) -> Result<&S, StoreError> {
        self.state.get(name)
    }

    pub fn state_mut<S: 'static>(&mut self, name: &str) -> Result<&mut S, StoreError> {
        self.state.get_mut(name)
    }

    /// Dispatch a follow-up action with the store's usual routing.
    pub fn dispatch(&mut self, draft: impl Into<ActionDraft<A>>) {
        self.dispatched.push(PendingDispatch {
            draft: draft.into(),
            local: false,
        });
    }

    /// Dispatch a follow-up action straight into `incoming`.
    pub fn dispatch_local(&mut self, draft: impl Into<ActionDraft<A>>) {
        self.dispatched.push(PendingDispatch {
            draft: draft.into(),
            local: true,
        });
    }

    pub fn add_receptor<F>(&mut self, receptor: F) -> ReceptorId
    where
        F: FnMut(&mut ReceptorContext<'_, A>, &Action<A>) -> Result<(), ReceptorError> + 'static,
    {
        let id = ReceptorRegistry::<A>::allocate(self.next_id);
        self.changes.push(ReceptorChange::Add(id, Box::new(receptor)));
        id
    }

    pub fn remove_receptor(&mut self, id: ReceptorId) {
        self.changes.push(ReceptorChange::Remove(id));
    }

    pub fn remove_self(&mut self) {
        self.changes.push(ReceptorChange::Remove(self.receptor));
    }
}
