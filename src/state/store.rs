//! Serialized dispatch path for session transitions.
//!
//! DESIGN
//! ======
//! The store wraps a `tokio::sync::watch` sender holding `Arc<Session>`.
//! `dispatch` replaces the snapshot under the sender's lock, so transitions
//! are applied one at a time in dispatch order and each sees the settled
//! result of the previous one. Observers hold `Arc` snapshots that are never
//! mutated after publication.
//!
//! The store also counts sessions. The epoch advances under the same lock on
//! every `Authenticate`, `Logout` and `Error`, so work started for one sign-in
//! can tell it has been overtaken even when the same user signs back in and
//! the published snapshots look identical.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use super::action::Action;
use super::reducer::reduce;
use super::session::Session;

#[derive(Clone, Debug)]
pub struct Store {
    tx: Arc<watch::Sender<Arc<Session>>>,
    epoch: Arc<AtomicU64>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Session::default())
    }
}

impl Store {
    #[must_use]
    pub fn new(initial: Session) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx), epoch: Arc::new(AtomicU64::new(0)) }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::trace!(action = action.name(), "dispatch");
        self.tx.send_modify(|session| self.apply(session, action));
    }

    /// Dispatch only if `guard` holds for the session the action would apply to.
    ///
    /// The check and the transition happen under one lock. Subscribers are not
    /// woken when the guard rejects. Returns whether the action was applied.
    pub fn dispatch_if(&self, guard: impl FnOnce(&Session) -> bool, action: Action) -> bool {
        self.tx.send_if_modified(|session| {
            if !guard(&**session) {
                tracing::debug!(action = action.name(), "guard rejected dispatch");
                return false;
            }
            self.apply(session, action);
            true
        })
    }

    /// Dispatch only if no sign-in or sign-out happened since `epoch` was read.
    pub fn dispatch_in_epoch(&self, epoch: u64, action: Action) -> bool {
        self.dispatch_if(|_| self.epoch() == epoch, action)
    }

    /// Number of identity transitions so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn apply(&self, session: &mut Arc<Session>, action: Action) {
        if matches!(action, Action::Authenticate(_) | Action::Logout | Action::Error) {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        *session = Arc::new(reduce(session, action));
    }

    /// Current published session.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Session> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified after every dispatch.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Session>> {
        self.tx.subscribe()
    }
}
