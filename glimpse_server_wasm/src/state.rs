//! Server state management for the WASM signaling server
//!
//! This module wires the session registry, room orchestrator and connection
//! handler together. A [`ServerState`] can be captured as a
//! [`StateSnapshot`] and rebuilt from one, which is how state survives hosts
//! that start a fresh instance per request.

use crate::config::ServerConfig;
use crate::connection::ConnectionEvents;
use crate::error::SignalingError;
use crate::mailbox::{Mailbox, now_millis};
use crate::orchestrator::RoomManager;
use crate::registry::{ConnectionHandle, SessionRegistry};
use crate::rooms::{RoomStore, User};
use crate::snapshot::{SessionSnapshot, StateSnapshot};
use glimpse_protocol::UserId;
use std::sync::Arc;
use tracing::info;
use wstd::http::HeaderValue;

struct InnerState {
    config: ServerConfig,
    allowed_origin: HeaderValue,
    sessions: Arc<SessionRegistry<Mailbox>>,
    rooms: RoomManager<Mailbox>,
    connections: ConnectionEvents<Mailbox>,
}

/// The main server state handle; clones share the same state
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<InnerState>,
}

impl ServerState {
    /// Create a new server state handle
    pub fn new(config: ServerConfig) -> Self {
        Self::restore(config, StateSnapshot::default())
    }

    /// Rebuild state from a snapshot
    pub fn restore(config: ServerConfig, snapshot: StateSnapshot) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        for session in snapshot.sessions {
            let mailbox = Mailbox::restore(
                config.max_buffered_bytes,
                session.events,
                session.last_seen_ms,
            );
            sessions.on_connect(session.user_id, Arc::new(mailbox));
        }
        Self::assemble(config, sessions, snapshot.rooms)
    }

    fn assemble(
        config: ServerConfig,
        sessions: Arc<SessionRegistry<Mailbox>>,
        rooms: RoomStore,
    ) -> Self {
        let allowed_origin = config
            .origin_header()
            .unwrap_or_else(|_| HeaderValue::from_static("*"));
        Self {
            inner: Arc::new(InnerState {
                rooms: RoomManager::with_store(sessions.clone(), rooms),
                connections: ConnectionEvents::new(sessions.clone()),
                sessions,
                allowed_origin,
                config,
            }),
        }
    }

    /// Capture sessions and rooms
    pub fn snapshot(&self) -> StateSnapshot {
        let mut sessions: Vec<SessionSnapshot> = self
            .inner
            .sessions
            .entries()
            .into_iter()
            .map(|(user_id, mailbox)| SessionSnapshot {
                user_id,
                events: mailbox.pending(),
                last_seen_ms: mailbox.last_seen_ms(),
            })
            .collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        StateSnapshot {
            sessions,
            rooms: self.inner.rooms.store_snapshot(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Precomputed `access-control-allow-origin` value
    pub fn allowed_origin(&self) -> &HeaderValue {
        &self.inner.allowed_origin
    }

    pub fn sessions(&self) -> &SessionRegistry<Mailbox> {
        &self.inner.sessions
    }

    pub fn rooms(&self) -> &RoomManager<Mailbox> {
        &self.inner.rooms
    }

    pub fn connections(&self) -> &ConnectionEvents<Mailbox> {
        &self.inner.connections
    }

    /// Open a long-polled connection for `user`, replacing any earlier one
    pub fn connect(&self, user: &User) -> Arc<Mailbox> {
        let mailbox = Arc::new(Mailbox::new(self.inner.config.max_buffered_bytes));
        self.inner.connections.on_open(user, mailbox.clone());
        mailbox
    }

    /// Take every pending event for a connected user.
    ///
    /// Returns `None` if the user has no open connection.
    pub fn poll(&self, user_id: &UserId) -> Option<Vec<String>> {
        let mailbox = self.inner.sessions.handle(user_id)?;
        mailbox.touch(now_millis());
        Some(mailbox.drain())
    }

    /// Handle a raw frame sent by a connected user
    pub fn receive(&self, user_id: &UserId, raw: &str) -> Result<(), SignalingError> {
        if let Some(mailbox) = self.inner.sessions.handle(user_id) {
            mailbox.touch(now_millis());
        }
        self.inner.connections.on_message(user_id, raw)
    }

    pub fn disconnect(&self, user_id: &UserId) {
        self.inner.connections.on_close(user_id);
    }

    /// Drop every connection idle for longer than the configured timeout
    pub fn expire_idle_connections(&self) -> Vec<UserId> {
        self.expire_idle_at(now_millis())
    }

    /// [`ServerState::expire_idle_connections`] against an explicit clock
    pub fn expire_idle_at(&self, now_ms: u64) -> Vec<UserId> {
        let timeout_ms = self.inner.config.idle_timeout_ms();
        self.inner
            .sessions
            .evict(|mailbox| mailbox.idle_for(now_ms) > timeout_ms)
            .into_iter()
            .map(|(user_id, mailbox)| {
                info!(%user_id, "connection idle timeout");
                mailbox.close();
                user_id
            })
            .collect()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_protocol::Message;

    #[test]
    fn idle_connections_are_dropped_after_the_timeout() {
        let state = ServerState::default();
        let quiet = state.connect(&User::new("quiet", "Quiet"));
        let busy = state.connect(&User::new("busy", "Busy"));
        let timeout = state.config().idle_timeout_ms();
        let now = quiet.last_seen_ms();

        busy.touch(now + timeout);
        assert!(state.expire_idle_at(now + timeout).is_empty());

        let expired = state.expire_idle_at(now + timeout + 1);

        assert_eq!(expired, vec![UserId::from("quiet")]);
        assert!(quiet.is_closed());
        assert!(!state.sessions().is_online(&"quiet".into()));
        assert!(state.sessions().is_online(&"busy".into()));
        assert!(matches!(
            state.sessions().send(&"quiet".into(), &Message::Ping),
            Err(SignalingError::UserNotConnected(_))
        ));
    }

    fn stale_session(user_id: &str) -> ServerState {
        let snapshot = StateSnapshot {
            sessions: vec![SessionSnapshot {
                user_id: user_id.into(),
                events: Vec::new(),
                last_seen_ms: 0,
            }],
            rooms: RoomStore::new(),
        };
        ServerState::restore(ServerConfig::default(), snapshot)
    }

    #[test]
    fn polling_counts_as_activity() {
        let state = stale_session("u1");
        let mailbox = state.sessions().handle(&"u1".into()).unwrap();

        state.poll(&"u1".into()).unwrap();

        assert!(mailbox.last_seen_ms() > 0);
        assert!(state.expire_idle_connections().is_empty());
    }

    #[test]
    fn inbound_frames_count_as_activity() {
        let state = stale_session("u1");
        let mailbox = state.sessions().handle(&"u1".into()).unwrap();

        state.receive(&"u1".into(), r#"{"type":0,"payload":""}"#).unwrap();

        assert!(mailbox.last_seen_ms() > 0);
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn stale_restored_session_expires_on_the_next_sweep() {
        let state = stale_session("u1");
        assert_eq!(state.expire_idle_connections(), vec![UserId::from("u1")]);
        assert_eq!(state.sessions().connection_count(), 0);
    }

    #[test]
    fn restored_state_keeps_mailboxes_and_rooms() {
        let state = ServerState::default();
        state.connect(&User::new("h1", "Host"));
        let room_id = state.rooms().create_room(&"h1".into()).unwrap();
        state.sessions().send(&"h1".into(), &Message::Ping).unwrap();

        let restored = ServerState::restore(state.config().clone(), state.snapshot());

        assert!(restored.rooms().is_host(&"h1".into(), &room_id));
        assert_eq!(
            restored.poll(&"h1".into()),
            Some(vec![r#"{"type":0,"payload":""}"#.to_string()])
        );
    }
}
