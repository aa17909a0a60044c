//! One-shot and conditional action matching on top of receptors.

use crate::action::{Action, ActionKind};
use crate::error::WaitCancelled;
use crate::receptor::ReceptorId;
use crate::store::Store;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Register a receptor that narrows each action with `predicate` and hands
/// matches to `callback`.
///
/// The receptor removes itself when `callback` returns `true`; returning
/// `false` keeps it registered for further matches.
pub fn match_action_once<A, T, P, F>(
    store: &mut Store<A>,
    mut predicate: P,
    mut callback: F,
) -> ReceptorId
where
    A: ActionKind,
    P: FnMut(&Action<A>) -> Option<T> + 'static,
    F: FnMut(T) -> bool + 'static,
{
    store.add_action_receptor(move |ctx, action| {
        if let Some(matched) = predicate(action) {
            if callback(matched) {
                ctx.remove_self();
            }
        }
        Ok(())
    })
}

/// Run `callback` for the first action whose kind is `kind`, then unregister.
///
/// The callback runs at most once no matter how many matching actions follow.
pub fn receive_action_once<A, F>(
    store: &mut Store<A>,
    kind: &'static str,
    callback: F,
) -> ReceptorId
where
    A: ActionKind,
    F: FnOnce(&Action<A>) + 'static,
{
    let mut callback = Some(callback);
    store.add_action_receptor(move |ctx, action| {
        if action.kind() == kind {
            ctx.remove_self();
            if let Some(callback) = callback.take() {
                callback(action);
            }
        }
        Ok(())
    })
}

/// A future resolving with the first action matched by a predicate.
///
/// Removing [`PendingWait::receptor`] from the store cancels the wait; the
/// future then resolves to [`WaitCancelled`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PendingWait<T> {
    receptor: ReceptorId,
    rx: oneshot::Receiver<T>,
}

impl<T> PendingWait<T> {
    pub fn receptor(&self) -> ReceptorId {
        self.receptor
    }

    /// Non-blocking check, for callers driving the wait from a tick loop.
    pub fn try_take(&mut self) -> Result<Option<T>, WaitCancelled> {
        self.rx.try_recv().map_err(|_| WaitCancelled)
    }
}

impl<T> Future for PendingWait<T> {
    type Output = Result<T, WaitCancelled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| WaitCancelled))
    }
}

/// Wait for the first action `predicate` accepts.
pub fn wait_for_action<A, T, P>(store: &mut Store<A>, mut predicate: P) -> PendingWait<T>
where
    A: ActionKind,
    T: 'static,
    P: FnMut(&Action<A>) -> Option<T> + 'static,
{
    let (tx, rx) = oneshot::channel();
    let mut tx = Some(tx);
    let receptor = store.add_action_receptor(move |ctx, action| {
        if tx.is_none() {
            return Ok(());
        }
        if let Some(matched) = predicate(action) {
            ctx.remove_self();
            if let Some(tx) = tx.take() {
                // The caller may have dropped the future; nothing to deliver then.
                let _ = tx.send(matched);
            }
        }
        Ok(())
    });
    PendingWait { receptor, rx }
}
