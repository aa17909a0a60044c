//! Transports move encoded actions between stores.
//!
//! A transport never applies anything: [`pump`] hands sent actions to it and
//! queues whatever it delivers on the store's `incoming` queue.

use crate::wire::{WireError, decode_action, encode_action};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};
use worldsync_common::UserId;
use worldsync_kernel::WorldAction;
use worldsync_store::{Action, ActionTarget, Store};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection for {0} is closed")]
    Disconnected(UserId),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A bidirectional action channel, polled by the session loop.
pub trait Transport<A> {
    fn send(&mut self, action: &Action<A>) -> Result<(), TransportError>;

    /// Drain everything delivered since the last call.
    ///
    /// Frames that fail to decode are logged and skipped.
    fn receive(&mut self) -> Result<Vec<Action<A>>, TransportError>;
}

fn decode_frames<A: DeserializeOwned>(frames: impl IntoIterator<Item = String>) -> Vec<Action<A>> {
    frames
        .into_iter()
        .filter_map(|frame| match decode_action(&frame) {
            Ok(action) => Some(action),
            Err(err) => {
                warn!(error = %err, len = frame.len(), "dropping malformed frame");
                None
            }
        })
        .collect()
}

/// Offline transport: every sent action comes straight back.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    frames: VecDeque<String>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw frame as if it had arrived from the network.
    pub fn push_frame(&mut self, frame: impl Into<String>) {
        self.frames.push_back(frame.into());
    }

    pub fn pending(&self) -> usize {
        self.frames.len()
    }
}

impl<A: Serialize + DeserializeOwned> Transport<A> for LoopbackTransport {
    fn send(&mut self, action: &Action<A>) -> Result<(), TransportError> {
        self.frames.push_back(encode_action(action)?);
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<Action<A>>, TransportError> {
        Ok(decode_frames(self.frames.drain(..)))
    }
}

#[derive(Debug, Default)]
struct HubInner {
    inboxes: BTreeMap<UserId, VecDeque<String>>,
}

/// In-memory relay between the peers of one process.
///
/// Frames are routed by `$to`: broadcast frames reach every connected peer,
/// the sender included; targeted frames reach only their target.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Rc<RefCell<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `user`. Reconnecting starts with an empty inbox.
    pub fn connect(&self, user: UserId) -> HubConnection {
        self.inner.borrow_mut().inboxes.insert(user, VecDeque::new());
        debug!(user = %user, "hub connect");
        HubConnection {
            user,
            inner: Rc::clone(&self.inner),
        }
    }

    /// Close `user`'s connection; its undelivered frames are discarded.
    pub fn disconnect(&self, user: &UserId) -> bool {
        let closed = self.inner.borrow_mut().inboxes.remove(user).is_some();
        if closed {
            debug!(user = %user, "hub disconnect");
        }
        closed
    }

    pub fn is_connected(&self, user: &UserId) -> bool {
        self.inner.borrow().inboxes.contains_key(user)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.borrow().inboxes.len()
    }
}

/// One peer's end of a [`MemoryHub`].
#[derive(Debug)]
pub struct HubConnection {
    user: UserId,
    inner: Rc<RefCell<HubInner>>,
}

impl HubConnection {
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.inner
            .borrow()
            .inboxes
            .get(&self.user)
            .map_or(0, VecDeque::len)
    }
}

impl<A: Serialize + DeserializeOwned> Transport<A> for HubConnection {
    fn send(&mut self, action: &Action<A>) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.inboxes.contains_key(&self.user) {
            return Err(TransportError::Disconnected(self.user));
        }
        let frame = encode_action(action)?;
        match action.to {
            ActionTarget::All => {
                for inbox in inner.inboxes.values_mut() {
                    inbox.push_back(frame.clone());
                }
            }
            ActionTarget::User(target) => match inner.inboxes.get_mut(&target) {
                Some(inbox) => inbox.push_back(frame),
                None => debug!(from = %self.user, to = %target, "target not connected"),
            },
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<Action<A>>, TransportError> {
        let frames: Vec<String> = {
            let mut inner = self.inner.borrow_mut();
            let inbox = inner
                .inboxes
                .get_mut(&self.user)
                .ok_or(TransportError::Disconnected(self.user))?;
            inbox.drain(..).collect()
        };
        Ok(decode_frames(frames))
    }
}

/// Send the store's outgoing actions and queue what the transport delivered.
///
/// Returns how many actions were received. When the connection is gone a
/// local `ConnectToWorldTimeout { instance: true }` is dispatched and the
/// error is returned, so the caller can stop pumping.
pub fn pump<T: Transport<WorldAction>>(
    store: &mut Store<WorldAction>,
    transport: &mut T,
) -> Result<usize, TransportError> {
    match exchange(store, transport) {
        Err(TransportError::Disconnected(user)) => {
            warn!(store = store.name(), user = %user, "connection lost");
            store.dispatch_local(WorldAction::ConnectToWorldTimeout { instance: true });
            Err(TransportError::Disconnected(user))
        }
        other => other,
    }
}

/// Sends stop at the first closed connection; what was not sent stays on
/// `outgoing`. An action that cannot be encoded is logged and dropped so it
/// does not block the queue.
fn exchange<T: Transport<WorldAction>>(
    store: &mut Store<WorldAction>,
    transport: &mut T,
) -> Result<usize, TransportError> {
    let name = store.name().to_owned();
    store.send_outgoing(|action| match transport.send(action) {
        Err(TransportError::Wire(err)) => {
            warn!(
                store = %name,
                kind = action.kind(),
                error = %err,
                "dropping unencodable action"
            );
            Ok(())
        }
        other => other,
    })?;
    let received = transport.receive()?;
    let count = received.len();
    for action in received {
        store.receive(action);
    }
    Ok(count)
}
