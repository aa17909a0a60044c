use crate::action::{Action, ActionDraft, ActionKind};
use crate::error::{ReceptorError, StoreError};
use crate::reactor::{ReactorHandle, ReactorRegistry};
use crate::receptor::{ReceptorContext, ReceptorId, ReceptorRegistry};
use crate::slices::StateSlices;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};
use worldsync_common::{DispatchTime, UserId};

/// Returns the id stamped into `$from` on dispatch.
pub type DispatchIdFn = Box<dyn Fn() -> UserId>;
/// Returns the current logical dispatch time.
pub type DispatchTimeFn = Box<dyn Fn() -> DispatchTime>;

/// Construction parameters for a [`Store`].
pub struct StoreOptions {
    name: String,
    networked: bool,
    get_dispatch_id: DispatchIdFn,
    get_dispatch_time: DispatchTimeFn,
    default_dispatch_delay: DispatchTime,
    history_limit: Option<usize>,
}

impl StoreOptions {
    /// A non-networked store dispatching as the nil user at time 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            networked: false,
            get_dispatch_id: Box::new(UserId::nil),
            get_dispatch_time: Box::new(|| 0),
            default_dispatch_delay: 0,
            history_limit: None,
        }
    }

    pub fn networked(mut self, networked: bool) -> Self {
        self.networked = networked;
        self
    }

    pub fn dispatch_id(mut self, get_dispatch_id: impl Fn() -> UserId + 'static) -> Self {
        self.get_dispatch_id = Box::new(get_dispatch_id);
        self
    }

    pub fn dispatch_time(mut self, get_dispatch_time: impl Fn() -> DispatchTime + 'static) -> Self {
        self.get_dispatch_time = Box::new(get_dispatch_time);
        self
    }

    pub fn default_dispatch_delay(mut self, delay: DispatchTime) -> Self {
        self.default_dispatch_delay = delay;
        self
    }

    /// Keep at most `limit` actions in each history queue. `None` keeps all.
    pub fn history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }
}

/// The five action queues of a store.
#[derive(Debug)]
pub struct ActionQueues<A> {
    /// Applied actions flagged `$cache`, retained for late joiners.
    pub cached: Vec<Action<A>>,
    /// Waiting for the next processing pass.
    pub incoming: VecDeque<Action<A>>,
    /// Applied, oldest first.
    pub incoming_history: Vec<Action<A>>,
    /// Authored on a networked store, waiting for the transport.
    pub outgoing: Vec<Action<A>>,
    /// Handed to the transport, oldest first.
    pub outgoing_history: Vec<Action<A>>,
}

impl<A> Default for ActionQueues<A> {
    fn default() -> Self {
        Self {
            cached: Vec::new(),
            incoming: VecDeque::new(),
            incoming_history: Vec::new(),
            outgoing: Vec::new(),
            outgoing_history: Vec::new(),
        }
    }
}

/// Per-process container of state slices, action queues, receptors and reactors.
///
/// # Invariants
/// - State slices are mutated only by receptors during [`Store::apply_incoming_actions`].
/// - An action is in exactly one of `incoming` / `incoming_history`, and moves
///   between them once, after every receptor has seen it.
/// - Receptors run in registration order.
pub struct Store<A> {
    name: String,
    networked: bool,
    get_dispatch_id: DispatchIdFn,
    get_dispatch_time: DispatchTimeFn,
    default_dispatch_delay: DispatchTime,
    history_limit: Option<usize>,
    state: StateSlices,
    actions: ActionQueues<A>,
    receptors: ReceptorRegistry<A>,
    reactors: ReactorRegistry,
}

impl<A: ActionKind> Store<A> {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            name: options.name,
            networked: options.networked,
            get_dispatch_id: options.get_dispatch_id,
            get_dispatch_time: options.get_dispatch_time,
            default_dispatch_delay: options.default_dispatch_delay,
            history_limit: options.history_limit,
            state: StateSlices::new(),
            actions: ActionQueues::default(),
            receptors: ReceptorRegistry::new(),
            reactors: ReactorRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_networked(&self) -> bool {
        self.networked
    }

    pub fn dispatch_id(&self) -> UserId {
        (self.get_dispatch_id)()
    }

    pub fn dispatch_time(&self) -> DispatchTime {
        (self.get_dispatch_time)()
    }

    /// Fill in `$from` and `$time` where the draft leaves them unset.
    pub fn stamp(&self, draft: impl Into<ActionDraft<A>>) -> Action<A> {
        let draft = draft.into();
        Action {
            from: draft.from.unwrap_or_else(|| self.dispatch_id()),
            to: draft.to,
            time: draft.time.unwrap_or_else(|| {
                self.dispatch_time().saturating_add(self.default_dispatch_delay)
            }),
            cache: draft.cache,
            payload: draft.payload,
        }
    }

    /// Stamp and enqueue an action.
    ///
    /// Networked stores queue it on `outgoing`; it takes effect only once the
    /// transport delivers it back. Other stores queue it on `incoming`.
    pub fn dispatch(&mut self, draft: impl Into<ActionDraft<A>>) {
        let action = self.stamp(draft);
        debug!(store = %self.name, kind = action.kind(), time = action.time, "dispatch");
        if self.networked {
            self.actions.outgoing.push(action);
        } else {
            self.actions.incoming.push_back(action);
        }
    }

    /// Stamp and enqueue an action on `incoming`, skipping the network round trip.
    pub fn dispatch_local(&mut self, draft: impl Into<ActionDraft<A>>) {
        let action = self.stamp(draft);
        debug!(store = %self.name, kind = action.kind(), "dispatch local");
        self.actions.incoming.push_back(action);
    }

    /// Enqueue an action received from a transport, unchanged.
    pub fn receive(&mut self, action: Action<A>) {
        self.actions.incoming.push_back(action);
    }

    /// Run one processing pass and return how many actions were applied.
    ///
    /// Actions stamped later than the current dispatch time stay queued, in
    /// order, for a later pass. Receptor errors and panics are logged and do
    /// not stop the pass.
    pub fn apply_incoming_actions(&mut self) -> usize {
        let now = self.dispatch_time();
        let pending = std::mem::take(&mut self.actions.incoming);
        let mut deferred = VecDeque::new();
        let mut applied = 0;

        for action in pending {
            if action.time > now {
                deferred.push_back(action);
                continue;
            }
            self.run_receptors(&action);
            if action.cache {
                self.actions.cached.push(action.clone());
            }
            self.actions.incoming_history.push(action);
            applied += 1;
        }

        // Dispatches made by receptors during this pass queue behind deferred ones.
        deferred.extend(self.actions.incoming.drain(..));
        self.actions.incoming = deferred;

        if let Some(limit) = self.history_limit {
            prune_front(&mut self.actions.incoming_history, limit);
        }
        if applied > 0 {
            self.reactors.run(&self.name, &self.state);
        }
        applied
    }

    fn run_receptors(&mut self, action: &Action<A>) {
        let mut changes = Vec::new();
        let mut dispatched = Vec::new();

        for (id, receptor) in self.receptors.entries.iter_mut() {
            let mut ctx = ReceptorContext {
                receptor: *id,
                state: &mut self.state,
                next_id: &mut self.receptors.next_id,
                changes: &mut changes,
                dispatched: &mut dispatched,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| receptor(&mut ctx, action))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log_receptor_error(&self.name, *id, action, &err),
                Err(payload) => error!(
                    store = %self.name,
                    receptor = ?id,
                    kind = action.kind(),
                    panic = panic_message(payload.as_ref()),
                    "receptor panicked"
                ),
            }
        }

        for change in changes {
            self.receptors.apply(change);
        }
        for pending in dispatched {
            if pending.local {
                self.dispatch_local(pending.draft);
            } else {
                self.dispatch(pending.draft);
            }
        }
    }

    /// Move everything on `outgoing` to `outgoing_history` and return it for sending.
    pub fn take_outgoing(&mut self) -> Vec<Action<A>> {
        let sent = std::mem::take(&mut self.actions.outgoing);
        self.actions.outgoing_history.extend(sent.iter().cloned());
        if let Some(limit) = self.history_limit {
            prune_front(&mut self.actions.outgoing_history, limit);
        }
        sent
    }

    /// Hand `outgoing` to `send` in order, moving each action to
    /// `outgoing_history` once it went out.
    ///
    /// Stops at the first error; that action and everything after it stay
    /// queued for the next attempt.
    pub fn send_outgoing<E>(
        &mut self,
        mut send: impl FnMut(&Action<A>) -> Result<(), E>,
    ) -> Result<usize, E> {
        let mut sent = 0;
        let mut result = Ok(());
        for action in &self.actions.outgoing {
            if let Err(err) = send(action) {
                result = Err(err);
                break;
            }
            sent += 1;
        }
        let delivered: Vec<Action<A>> = self.actions.outgoing.drain(..sent).collect();
        self.actions.outgoing_history.extend(delivered);
        if let Some(limit) = self.history_limit {
            prune_front(&mut self.actions.outgoing_history, limit);
        }
        result.map(|()| sent)
    }

    pub fn add_action_receptor<F>(&mut self, receptor: F) -> ReceptorId
    where
        F: FnMut(&mut ReceptorContext<'_, A>, &Action<A>) -> Result<(), ReceptorError> + 'static,
    {
        let id = ReceptorRegistry::<A>::allocate(&mut self.receptors.next_id);
        self.receptors.push(id, Box::new(receptor));
        id
    }

    /// Returns false if the receptor was not registered.
    pub fn remove_action_receptor(&mut self, id: ReceptorId) -> bool {
        self.receptors.remove(id)
    }

    pub fn has_receptor(&self, id: ReceptorId) -> bool {
        self.receptors.contains(id)
    }

    pub fn receptor_count(&self) -> usize {
        self.receptors.entries.len()
    }

    /// Register a callback run after every pass that applied an action.
    pub fn subscribe(&mut self, reactor: impl FnMut(&StateSlices) + 'static) -> ReactorHandle {
        self.reactors.subscribe(Box::new(reactor))
    }

    pub fn unsubscribe(&mut self, handle: ReactorHandle) -> bool {
        self.reactors.unsubscribe(handle)
    }

    pub fn reactor_count(&self) -> usize {
        self.reactors.len()
    }

    pub fn register_state<S: 'static>(
        &mut self,
        name: impl Into<String>,
        initial: S,
    ) -> Result<(), StoreError> {
        self.state.insert(name, initial)
    }

    /// Read-only view of a state slice.
    pub fn state<S: 'static>(&self, name: &str) -> Result<&S, StoreError> {
        self.state.get(name)
    }

    pub fn slices(&self) -> &StateSlices {
        &self.state
    }

    pub fn actions(&self) -> &ActionQueues<A> {
        &self.actions
    }

    pub fn cached_actions(&self) -> &[Action<A>] {
        &self.actions.cached
    }

    /// Keep only the cached actions `keep` accepts. Returns how many were removed.
    pub fn retain_cached(&mut self, mut keep: impl FnMut(&Action<A>) -> bool) -> usize {
        let before = self.actions.cached.len();
        self.actions.cached.retain(|action| keep(action));
        before - self.actions.cached.len()
    }
}

impl<A> std::fmt::Debug for Store<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("networked", &self.networked)
            .field("slices", &self.state)
            .field("incoming", &self.actions.incoming.len())
            .field("incoming_history", &self.actions.incoming_history.len())
            .field("outgoing", &self.actions.outgoing.len())
            .field("receptors", &self.receptors.entries.len())
            .finish()
    }
}

fn prune_front<T>(history: &mut Vec<T>, limit: usize) {
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}

fn log_receptor_error<A: ActionKind>(
    store: &str,
    receptor: ReceptorId,
    action: &Action<A>,
    err: &ReceptorError,
) {
    warn!(store, receptor = ?receptor, kind = action.kind(), error = %err, "receptor failed");
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic>"
    }
}
