//! Per-connection events: open, close, and the keepalive message loop

use crate::error::SignalingError;
use crate::registry::{ConnectionHandle, SessionRegistry};
use crate::rooms::User;
use glimpse_protocol::{Message, UserId};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reply text for anything the connection loop does not understand
pub const INVALID_MESSAGE: &str = "Invalid message";

pub struct ConnectionEvents<H: ?Sized> {
    sessions: Arc<SessionRegistry<H>>,
}

impl<H: ConnectionHandle + ?Sized> ConnectionEvents<H> {
    pub fn new(sessions: Arc<SessionRegistry<H>>) -> Self {
        Self { sessions }
    }

    /// Bind `handle` to the user. A previous connection for the same user is
    /// closed so only the newest one receives messages.
    pub fn on_open(&self, user: &User, handle: Arc<H>) {
        info!(user_id = %user.id, username = %user.name, "connection opened");
        if let Some(previous) = self.sessions.on_connect(user.id.clone(), handle.clone()) {
            if !Arc::ptr_eq(&previous, &handle) {
                info!(user_id = %user.id, "closing superseded connection");
                previous.close();
            }
        }
    }

    pub fn on_close(&self, user_id: &UserId) {
        match self.sessions.on_disconnect(user_id) {
            Some(handle) => handle.close(),
            None => debug!(%user_id, "close for unknown connection"),
        }
    }

    /// Handle a raw inbound frame from `user_id`, writing the reply back onto
    /// that user's connection. The connection is never closed here.
    pub fn on_message(&self, user_id: &UserId, raw: &str) -> Result<(), SignalingError> {
        let handle = self
            .sessions
            .handle(user_id)
            .ok_or_else(|| SignalingError::UserNotConnected(user_id.clone()))?;
        let reply = reply_to(user_id, raw);
        handle.send(serde_json::to_string(&reply)?)
    }
}

/// PING is answered with PONG and PONG with PING; everything else is an error
pub fn reply_to(user_id: &UserId, raw: &str) -> Message {
    match Message::from_str(raw) {
        Ok(Message::Ping) => Message::Pong,
        Ok(Message::Pong) => Message::Ping,
        Ok(other) => {
            warn!(%user_id, message_type = ?other.message_type(), "unsupported message type on connection");
            Message::error(INVALID_MESSAGE)
        }
        Err(error) => {
            let error = SignalingError::InvalidPayload(error.to_string());
            warn!(%user_id, %error, "failed to handle connection message");
            Message::error(INVALID_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Mailbox;

    fn setup() -> (ConnectionEvents<Mailbox>, Arc<SessionRegistry<Mailbox>>) {
        let sessions = Arc::new(SessionRegistry::new());
        (ConnectionEvents::new(sessions.clone()), sessions)
    }

    fn reply(raw: &str) -> Message {
        reply_to(&"u1".into(), raw)
    }

    #[test]
    fn keepalive_echoes() {
        assert_eq!(reply(r#"{"type":0,"payload":""}"#), Message::Pong);
        assert_eq!(reply(r#"{"type":1,"payload":""}"#), Message::Ping);
    }

    #[test]
    fn garbage_and_unhandled_types_get_an_error() {
        let error = Message::error(INVALID_MESSAGE);
        assert_eq!(reply("{"), error);
        assert_eq!(reply(r#"{"type":99}"#), error);
        assert_eq!(reply(r#"{"type":6,"payload":{"roomId":"r"}}"#), error);
        assert_eq!(reply(r#"{"type":8,"payload":"offer"}"#), error);
    }

    #[test]
    fn reply_lands_on_the_senders_connection() {
        let (events, _sessions) = setup();
        let mailbox = Arc::new(Mailbox::new(1024));
        events.on_open(&User::new("u1", "User"), mailbox.clone());

        events.on_message(&"u1".into(), r#"{"type":0,"payload":""}"#).unwrap();
        events.on_message(&"u1".into(), "nonsense").unwrap();

        assert_eq!(
            mailbox.drain(),
            vec![
                r#"{"type":1,"payload":""}"#.to_string(),
                r#"{"type":2,"payload":"Invalid message"}"#.to_string(),
            ]
        );
        assert!(!mailbox.is_closed());
    }

    #[test]
    fn message_without_connection_fails() {
        let (events, _sessions) = setup();
        assert!(matches!(
            events.on_message(&"u1".into(), r#"{"type":0}"#),
            Err(SignalingError::UserNotConnected(_))
        ));
    }

    #[test]
    fn reopen_closes_superseded_connection() {
        let (events, sessions) = setup();
        let first = Arc::new(Mailbox::new(1024));
        let second = Arc::new(Mailbox::new(1024));
        events.on_open(&User::new("u1", "User"), first.clone());
        events.on_open(&User::new("u1", "User"), second.clone());

        assert!(first.is_closed());
        assert!(!second.is_closed());
        sessions.send(&"u1".into(), &Message::Ping).unwrap();
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn close_unregisters_and_closes_handle() {
        let (events, sessions) = setup();
        let mailbox = Arc::new(Mailbox::new(1024));
        events.on_open(&User::new("u1", "User"), mailbox.clone());

        events.on_close(&"u1".into());

        assert!(!sessions.is_online(&"u1".into()));
        assert!(mailbox.is_closed());
        events.on_close(&"u1".into());
    }
}
