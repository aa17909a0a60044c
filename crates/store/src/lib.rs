//! Action store: the single path by which shared state changes.
//!
//! # Invariants
//! - Actions are applied in enqueue order within a store.
//! - State slices change only inside receptors, during a processing pass.
//! - A failing receptor never stops the pass or the tick that runs it.

pub mod action;
pub mod error;
pub mod once;
pub mod reactor;
pub mod receptor;
pub mod slices;
pub mod store;

pub use action::{Action, ActionDraft, ActionKind, ActionTarget};
pub use error::{ReceptorError, StoreError, WaitCancelled};
pub use once::{PendingWait, match_action_once, receive_action_once, wait_for_action};
pub use reactor::ReactorHandle;
pub use receptor::{ReceptorContext, ReceptorFn, ReceptorId};
pub use slices::StateSlices;
pub use store::{ActionQueues, DispatchIdFn, DispatchTimeFn, Store, StoreOptions};
