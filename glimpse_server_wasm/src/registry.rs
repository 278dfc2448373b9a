//! Live user sessions and message delivery
//!
//! The registry maps a [`UserId`] to the single connection handle currently
//! serving that user. Rooms and join requests never hold handles; they store
//! identities, which are resolved here at send time.

use crate::error::SignalingError;
use glimpse_protocol::{Message, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Write side of a live connection
pub trait ConnectionHandle: Send + Sync {
    /// Queue one serialized envelope for transmission.
    ///
    /// Writing to a handle that was already closed must succeed as a no-op.
    fn send(&self, text: String) -> Result<(), SignalingError>;

    /// Stop accepting writes and discard anything not yet transmitted
    fn close(&self);
}

/// Thread-safe map of connected users.
///
/// Generic over the handle type so transports can get their concrete handle
/// back; use `SessionRegistry<dyn ConnectionHandle>` to mix handle kinds.
pub struct SessionRegistry<H: ?Sized> {
    sessions: Mutex<HashMap<UserId, Arc<H>>>,
}

impl<H: ?Sized> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<H: ConnectionHandle + ?Sized> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any existing one for the same user.
    ///
    /// The superseded handle is returned untouched; closing it is up to the
    /// caller.
    pub fn on_connect(&self, user_id: UserId, handle: Arc<H>) -> Option<Arc<H>> {
        info!(%user_id, "user connected");
        self.sessions.lock().insert(user_id, handle)
    }

    /// Forget whatever connection is registered for `user_id`
    pub fn on_disconnect(&self, user_id: &UserId) -> Option<Arc<H>> {
        let removed = self.sessions.lock().remove(user_id);
        if removed.is_some() {
            info!(%user_id, "user disconnected");
        }
        removed
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.sessions.lock().contains_key(user_id)
    }

    /// The handle currently registered for `user_id`
    pub fn handle(&self, user_id: &UserId) -> Option<Arc<H>> {
        self.sessions.lock().get(user_id).cloned()
    }

    /// Deliver a message to a connected user, at most once.
    ///
    /// The handle is cloned under the lock and written after releasing it, so
    /// a slow write never blocks registrations.
    pub fn send(&self, user_id: &UserId, message: &Message) -> Result<(), SignalingError> {
        let text = serde_json::to_string(message)?;
        let handle = self
            .handle(user_id)
            .ok_or_else(|| SignalingError::UserNotConnected(user_id.clone()))?;
        debug!(%user_id, message_type = ?message.message_type(), "sending message");
        handle.send(text)
    }

    /// Number of users with a live connection
    pub fn connection_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Every registered user with their handle
    pub fn entries(&self) -> Vec<(UserId, Arc<H>)> {
        self.sessions
            .lock()
            .iter()
            .map(|(user_id, handle)| (user_id.clone(), handle.clone()))
            .collect()
    }

    /// Unregister every connection for which `expired` holds, in one pass
    /// under the lock. The removed handles are returned unclosed.
    pub fn evict(&self, mut expired: impl FnMut(&H) -> bool) -> Vec<(UserId, Arc<H>)> {
        let mut sessions = self.sessions.lock();
        let stale: Vec<UserId> = sessions
            .iter()
            .filter(|(_, handle)| expired(handle))
            .map(|(user_id, _)| user_id.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|user_id| {
                let handle = sessions.remove(&user_id)?;
                Some((user_id, handle))
            })
            .collect()
    }
}
