//! In-memory rooms and pending join requests
//!
//! Each lifecycle transition is one method taking `&mut self`; the
//! orchestrator holds the store lock for exactly one such call.

use crate::error::SignalingError;
use glimpse_protocol::{RequestId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user as known to the control plane: identity plus display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub host: UserId,
    pub guest: Option<UserId>,
}

impl Room {
    pub fn is_host(&self, user_id: &UserId) -> bool {
        &self.host == user_id
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.is_host(user_id) || self.guest.as_ref() == Some(user_id)
    }

    /// The participant on the other side of `user_id`, if any
    pub fn counterpart(&self, user_id: &UserId) -> Option<&UserId> {
        if self.is_host(user_id) {
            self.guest.as_ref()
        } else {
            Some(&self.host)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: RequestId,
    pub room_id: RoomId,
    pub requester: User,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RoomStore {
    rooms: HashMap<RoomId, Room>,
    requests: HashMap<RequestId, JoinRequest>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a room hosted by `host`
    pub fn create_room(&mut self, host: UserId) -> RoomId {
        let id = RoomId(new_id());
        self.rooms.insert(
            id.clone(),
            Room {
                id: id.clone(),
                host,
                guest: None,
            },
        );
        id
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&JoinRequest> {
        self.requests.get(request_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    /// Issue a request id for `requester` joining `room_id`.
    ///
    /// A host joining their own room needs no approval: nothing is recorded and
    /// the returned request can never be approved or denied.
    pub fn open_request(
        &mut self,
        requester: &User,
        room_id: &RoomId,
    ) -> Result<JoinTicket, SignalingError> {
        let room = self.rooms.get(room_id).ok_or(SignalingError::RoomNotFound)?;
        let request_id = RequestId(new_id());
        if room.is_host(&requester.id) {
            return Ok(JoinTicket::HostReentry { request_id });
        }
        let host = room.host.clone();
        let request = JoinRequest {
            id: request_id.clone(),
            room_id: room_id.clone(),
            requester: requester.clone(),
        };
        self.requests.insert(request_id, request.clone());
        Ok(JoinTicket::Pending { request, host })
    }

    /// Admit the requester as guest and consume the request
    pub fn approve(
        &mut self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<JoinRequest, SignalingError> {
        let (room_id, requester) = self.check_decision(request_id, caller)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(SignalingError::RoomNotFound)?;
        if room.guest.as_ref().is_some_and(|guest| guest != &requester) {
            return Err(SignalingError::GuestAlreadyPresent);
        }
        room.guest = Some(requester);
        self.requests
            .remove(request_id)
            .ok_or(SignalingError::RequestNotFound)
    }

    /// Consume the request without touching the room
    pub fn deny(
        &mut self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<JoinRequest, SignalingError> {
        self.check_decision(request_id, caller)?;
        self.requests
            .remove(request_id)
            .ok_or(SignalingError::RequestNotFound)
    }

    /// Remove a room on behalf of one of its participants
    pub fn end_room(&mut self, room_id: &RoomId, caller: &UserId) -> Result<Room, SignalingError> {
        self.participant_room(room_id, caller)?;
        self.rooms.remove(room_id).ok_or(SignalingError::RoomNotFound)
    }

    /// Look up a room and make sure `caller` is in it
    pub fn participant_room(
        &self,
        room_id: &RoomId,
        caller: &UserId,
    ) -> Result<&Room, SignalingError> {
        let room = self.rooms.get(room_id).ok_or(SignalingError::RoomNotFound)?;
        if room.is_participant(caller) {
            Ok(room)
        } else {
            Err(SignalingError::NotParticipant)
        }
    }

    fn check_decision(
        &self,
        request_id: &RequestId,
        caller: &UserId,
    ) -> Result<(RoomId, UserId), SignalingError> {
        let request = self
            .requests
            .get(request_id)
            .ok_or(SignalingError::RequestNotFound)?;
        let room = self
            .rooms
            .get(&request.room_id)
            .ok_or(SignalingError::RoomNotFound)?;
        if !room.is_host(caller) {
            return Err(SignalingError::NotHost);
        }
        Ok((room.id.clone(), request.requester.id.clone()))
    }
}

/// Result of [`RoomStore::open_request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTicket {
    /// Host rejoining their own room; approved on the spot
    HostReentry { request_id: RequestId },
    /// Recorded request awaiting the host's decision
    Pending { request: JoinRequest, host: UserId },
}

impl JoinTicket {
    pub fn request_id(&self) -> &RequestId {
        match self {
            JoinTicket::HostReentry { request_id } => request_id,
            JoinTicket::Pending { request, .. } => &request.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_room() -> (RoomStore, RoomId) {
        let mut store = RoomStore::new();
        let room_id = store.create_room("h1".into());
        (store, room_id)
    }

    fn pending_id(ticket: JoinTicket) -> RequestId {
        match ticket {
            JoinTicket::Pending { request, .. } => request.id,
            JoinTicket::HostReentry { .. } => panic!("expected a pending request"),
        }
    }

    #[test]
    fn room_ids_are_unique() {
        let mut store = RoomStore::new();
        let a = store.create_room("h1".into());
        let b = store.create_room("h1".into());
        assert_ne!(a, b);
        assert_eq!(store.room_count(), 2);
    }

    #[test]
    fn host_reentry_records_nothing() {
        let (mut store, room_id) = store_with_room();
        let ticket = store
            .open_request(&User::new("h1", "Host"), &room_id)
            .unwrap();
        assert!(matches!(ticket, JoinTicket::HostReentry { .. }));
        assert_eq!(store.pending_count(), 0);
        assert!(store.request(ticket.request_id()).is_none());
    }

    #[test]
    fn open_request_on_missing_room_fails() {
        let mut store = RoomStore::new();
        let err = store
            .open_request(&User::new("g1", "Guest"), &"nope".into())
            .unwrap_err();
        assert!(matches!(err, SignalingError::RoomNotFound));
    }

    #[test]
    fn approve_sets_guest_and_consumes_request() {
        let (mut store, room_id) = store_with_room();
        let request_id = pending_id(
            store
                .open_request(&User::new("g1", "Guest"), &room_id)
                .unwrap(),
        );

        let request = store.approve(&request_id, &"h1".into()).unwrap();

        assert_eq!(request.requester, User::new("g1", "Guest"));
        assert_eq!(store.room(&room_id).unwrap().guest, Some("g1".into()));
        assert!(matches!(
            store.approve(&request_id, &"h1".into()),
            Err(SignalingError::RequestNotFound)
        ));
        assert!(matches!(
            store.deny(&request_id, &"h1".into()),
            Err(SignalingError::RequestNotFound)
        ));
    }

    #[test]
    fn only_host_may_decide() {
        let (mut store, room_id) = store_with_room();
        let request_id = pending_id(
            store
                .open_request(&User::new("g1", "Guest"), &room_id)
                .unwrap(),
        );
        assert!(matches!(
            store.approve(&request_id, &"g1".into()),
            Err(SignalingError::NotHost)
        ));
        assert!(matches!(
            store.deny(&request_id, &"someone".into()),
            Err(SignalingError::NotHost)
        ));
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn decision_after_room_ended_reports_missing_room() {
        let (mut store, room_id) = store_with_room();
        let request_id = pending_id(
            store
                .open_request(&User::new("g1", "Guest"), &room_id)
                .unwrap(),
        );
        store.end_room(&room_id, &"h1".into()).unwrap();
        assert!(matches!(
            store.approve(&request_id, &"h1".into()),
            Err(SignalingError::RoomNotFound)
        ));
    }

    #[test]
    fn deny_leaves_room_untouched() {
        let (mut store, room_id) = store_with_room();
        let request_id = pending_id(
            store
                .open_request(&User::new("g1", "Guest"), &room_id)
                .unwrap(),
        );
        store.deny(&request_id, &"h1".into()).unwrap();
        assert_eq!(store.room(&room_id).unwrap().guest, None);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn second_guest_is_refused() {
        let (mut store, room_id) = store_with_room();
        let first = pending_id(
            store
                .open_request(&User::new("g1", "Guest"), &room_id)
                .unwrap(),
        );
        let second = pending_id(
            store
                .open_request(&User::new("g2", "Other"), &room_id)
                .unwrap(),
        );
        store.approve(&first, &"h1".into()).unwrap();

        assert!(matches!(
            store.approve(&second, &"h1".into()),
            Err(SignalingError::GuestAlreadyPresent)
        ));
        assert_eq!(store.room(&room_id).unwrap().guest, Some("g1".into()));
        // still pending so the host can turn it down
        store.deny(&second, &"h1".into()).unwrap();
    }

    #[test]
    fn current_guest_may_be_readmitted() {
        let (mut store, room_id) = store_with_room();
        for _ in 0..2 {
            let request_id = pending_id(
                store
                    .open_request(&User::new("g1", "Guest"), &room_id)
                    .unwrap(),
            );
            store.approve(&request_id, &"h1".into()).unwrap();
        }
        assert_eq!(store.room(&room_id).unwrap().guest, Some("g1".into()));
    }

    #[test]
    fn end_room_requires_participant() {
        let (mut store, room_id) = store_with_room();
        assert!(matches!(
            store.end_room(&room_id, &"stranger".into()),
            Err(SignalingError::NotParticipant)
        ));
        assert!(store.contains_room(&room_id));
        store.end_room(&room_id, &"h1".into()).unwrap();
        assert!(!store.contains_room(&room_id));
        assert!(matches!(
            store.end_room(&room_id, &"h1".into()),
            Err(SignalingError::RoomNotFound)
        ));
    }

    #[test]
    fn counterpart_is_the_other_side() {
        let room = Room {
            id: "r".into(),
            host: "h1".into(),
            guest: Some("g1".into()),
        };
        assert_eq!(room.counterpart(&"h1".into()), Some(&UserId::from("g1")));
        assert_eq!(room.counterpart(&"g1".into()), Some(&UserId::from("h1")));
        let lonely = Room { guest: None, ..room };
        assert_eq!(lonely.counterpart(&"h1".into()), None);
    }
}
