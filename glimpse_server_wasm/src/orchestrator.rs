//! Room lifecycle operations
//!
//! [`RoomManager`] drives the host/guest handshake: every operation applies a
//! single transition to the [`RoomStore`] under its lock, releases the lock,
//! and only then notifies the affected users through the [`SessionRegistry`].

use crate::error::SignalingError;
use crate::registry::{ConnectionHandle, SessionRegistry};
use crate::rooms::{JoinTicket, Room, RoomStore, User};
use glimpse_protocol::{
    JoinRoomRequestPayload, JoinRoomResultPayload, Message, RequestId, RoomId, RoomPayload, UserId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which relay channel a blob travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Sdp,
    Ice,
}

impl Negotiation {
    fn wrap(self, blob: String) -> Message {
        match self {
            Negotiation::Sdp => Message::Sdp(blob),
            Negotiation::Ice => Message::Ice(blob),
        }
    }
}

pub struct RoomManager<H: ?Sized> {
    store: Mutex<RoomStore>,
    sessions: Arc<SessionRegistry<H>>,
}

impl<H: ConnectionHandle + ?Sized> RoomManager<H> {
    pub fn new(sessions: Arc<SessionRegistry<H>>) -> Self {
        Self::with_store(sessions, RoomStore::new())
    }

    /// Resume from a previously captured store
    pub fn with_store(sessions: Arc<SessionRegistry<H>>, store: RoomStore) -> Self {
        Self {
            store: Mutex::new(store),
            sessions,
        }
    }

    /// Copy of the whole store, taken under its lock
    pub fn store_snapshot(&self) -> RoomStore {
        self.store.lock().clone()
    }

    /// Open a new room owned by `host`
    pub fn create_room(&self, host: &UserId) -> Result<RoomId, SignalingError> {
        require_identity(host)?;
        let room_id = self.store.lock().create_room(host.clone());
        info!(%room_id, host = %host, "room created");
        Ok(room_id)
    }

    /// False for unknown rooms
    pub fn is_host(&self, user_id: &UserId, room_id: &RoomId) -> bool {
        self.store
            .lock()
            .room(room_id)
            .is_some_and(|room| room.is_host(user_id))
    }

    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.store.lock().contains_room(room_id)
    }

    /// Snapshot of a room's current state
    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        self.store.lock().room(room_id).cloned()
    }

    /// Number of join requests awaiting a decision
    pub fn pending_requests(&self) -> usize {
        self.store.lock().pending_count()
    }

    /// Ask to join `room_id`.
    ///
    /// The host asking to join their own room is approved immediately with an
    /// `ALLOW_JOIN_ROOM` message; the id returned in that case is never
    /// recorded, so it cannot be approved or denied later. Anyone else gets a
    /// pending request and the host receives `REQUEST_JOIN_ROOM`.
    ///
    /// If the host is offline the request is still recorded but the call
    /// fails with `UserNotConnected`, so the requester never learns its id.
    /// Such a request stays pending until the host decides on it, which in
    /// practice means never.
    pub fn join_room(&self, requester: &User, room_id: &RoomId) -> Result<RequestId, SignalingError> {
        require_identity(&requester.id)?;
        let ticket = self.store.lock().open_request(requester, room_id)?;

        match ticket {
            JoinTicket::HostReentry { request_id } => {
                debug!(%room_id, host = %requester.id, "host rejoined own room");
                let allow = Message::AllowJoinRoom(JoinRoomResultPayload {
                    request_id: request_id.clone(),
                    room_id: room_id.clone(),
                    approved: true,
                });
                self.sessions.send(&requester.id, &allow)?;
                Ok(request_id)
            }
            JoinTicket::Pending { request, host } => {
                info!(%room_id, request_id = %request.id, requester = %requester.id, "join requested");
                let ask = Message::RequestJoinRoom(JoinRoomRequestPayload {
                    request_id: request.id.clone(),
                    room_id: room_id.clone(),
                    user_id: request.requester.id.clone(),
                    username: request.requester.name.clone(),
                });
                self.sessions.send(&host, &ask)?;
                Ok(request.id)
            }
        }
    }

    /// Admit the requester of `request_id` as the room's guest.
    ///
    /// The requester receives `ALLOW_JOIN_ROOM` then `ROOM_READY`, and the host
    /// receives `ROOM_READY`. Each delivery is independent: an offline
    /// recipient is logged and does not stop the others.
    pub fn approve_join_room_request(
        &self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<(), SignalingError> {
        require_identity(caller)?;
        let request = self.store.lock().approve(request_id, caller)?;
        info!(room_id = %request.room_id, %request_id, guest = %request.requester.id, "join approved");

        let guest = &request.requester.id;
        let ready = Message::RoomReady(RoomPayload {
            room_id: request.room_id.clone(),
        });
        self.notify(
            guest,
            &Message::AllowJoinRoom(JoinRoomResultPayload {
                request_id: request.id.clone(),
                room_id: request.room_id.clone(),
                approved: true,
            }),
        );
        self.notify(guest, &ready);
        self.notify(caller, &ready);
        Ok(())
    }

    /// Turn down `request_id`; the room itself is left as it was.
    ///
    /// The request is consumed even when the requester is offline: the
    /// `DENY_JOIN_ROOM` delivery is best-effort and only logged on failure.
    pub fn deny_join_room_request(
        &self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<(), SignalingError> {
        require_identity(caller)?;
        let request = self.store.lock().deny(request_id, caller)?;
        info!(room_id = %request.room_id, %request_id, requester = %request.requester.id, "join denied");

        let deny = Message::DenyJoinRoom(JoinRoomResultPayload {
            request_id: request.id,
            room_id: request.room_id,
            approved: false,
        });
        self.notify(&request.requester.id, &deny);
        Ok(())
    }

    /// Forward a session description to the other participant
    pub fn exchange_sdp(
        &self,
        room_id: &RoomId,
        from: &UserId,
        blob: String,
    ) -> Result<(), SignalingError> {
        self.relay(room_id, from, Negotiation::Sdp, blob)
    }

    /// Forward an ICE candidate to the other participant
    pub fn exchange_ice(
        &self,
        room_id: &RoomId,
        from: &UserId,
        blob: String,
    ) -> Result<(), SignalingError> {
        self.relay(room_id, from, Negotiation::Ice, blob)
    }

    /// Relay `blob` untouched from one participant to the other
    pub fn relay(
        &self,
        room_id: &RoomId,
        from: &UserId,
        kind: Negotiation,
        blob: String,
    ) -> Result<(), SignalingError> {
        require_identity(from)?;
        let to = {
            let store = self.store.lock();
            let room = store.participant_room(room_id, from)?;
            room.counterpart(from).cloned().ok_or(SignalingError::NoGuest)?
        };
        debug!(%room_id, %from, %to, ?kind, bytes = blob.len(), "relaying negotiation");
        self.sessions.send(&to, &kind.wrap(blob))
    }

    /// Close a room on behalf of its host or guest.
    ///
    /// `ROOM_END` goes to whichever participants are online; the room is
    /// removed regardless.
    pub fn end_room(&self, room_id: &RoomId, caller: &UserId) -> Result<(), SignalingError> {
        require_identity(caller)?;
        let room = self.store.lock().end_room(room_id, caller)?;
        info!(%room_id, by = %caller, "room ended");

        let end = Message::RoomEnd(RoomPayload {
            room_id: room.id.clone(),
        });
        for participant in room.guest.iter().chain(std::iter::once(&room.host)) {
            if self.sessions.is_online(participant) {
                self.notify(participant, &end);
            }
        }
        Ok(())
    }

    /// Best-effort delivery; failures are logged and swallowed
    fn notify(&self, to: &UserId, message: &Message) {
        if let Err(error) = self.sessions.send(to, message) {
            warn!(user_id = %to, message_type = ?message.message_type(), %error, "failed to deliver notification");
        }
    }
}

fn require_identity(user_id: &UserId) -> Result<(), SignalingError> {
    if user_id.is_empty() {
        return Err(SignalingError::InvalidPayload("empty user id".to_string()));
    }
    Ok(())
}
