//! HTTP handlers for the WASM signaling server
//!
//! Control-plane operations (create, join, approve, deny, relay, end) are
//! plain JSON POSTs. The per-user "connection" is long-polled: a client opens
//! it with `GET /ws`, drains pushed envelopes with `GET /ws/poll`, sends
//! keepalive frames with `POST /ws/message` and closes it with
//! `POST /ws/close`.

use crate::error::{ClientRequestError, SignalingError};
use crate::rooms::User;
use crate::state::ServerState;
use glimpse_protocol::requests::{
    ConnectResponse, CreateRoomRequest, CreateRoomResponse, EndRoomRequest, ErrorResponse,
    JoinDecisionRequest, JoinRoomRequest, JoinRoomResponse, PollResponse, RelayRequest,
    RoomStatusResponse,
};
use glimpse_protocol::{RoomId, UserId};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};
use wstd::http::{Body, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};

const USER_HEADER: &str = "x-user-id";

const INFO_PAGE: &str = "Glimpse WASI Signaling Server (Long-Polling)\n\
    \n\
    Connection:\n\
    - GET /ws?userId={id}&username={name} - Open a connection\n\
    - GET /ws/poll?userId={id} - Drain pushed messages\n\
    - POST /ws/message - Send PING/PONG (X-User-Id header required)\n\
    - POST /ws/close - Close the connection (X-User-Id header required)\n\
    \n\
    Rooms:\n\
    - POST /room {userId, username} -> {roomId}\n\
    - GET /room?roomId={id}&userId={id} -> {roomId, exists, isHost}\n\
    - POST /room/join {userId, username, roomId} -> {requestId}\n\
    - POST /room/join/approve {userId, requestId}\n\
    - POST /room/join/deny {userId, requestId}\n\
    - POST /room/sdp {userId, roomId, message}\n\
    - POST /room/ice {userId, roomId, message}\n\
    - POST /room/end {userId, roomId}\n\
    \n\
    Poll response format: {\"events\": [\"{\\\"type\\\":6,\\\"payload\\\":{...}}\", ...]}\n";

/// Why a request could not be served
#[derive(Error, Debug)]
enum Rejection {
    #[error(transparent)]
    Client(#[from] ClientRequestError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

impl Rejection {
    fn status(&self) -> StatusCode {
        match self {
            Rejection::Client(ClientRequestError::PayloadTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Rejection::Client(_) => StatusCode::BAD_REQUEST,
            Rejection::Signaling(error) => signaling_status(error),
        }
    }

    fn into_reply(self) -> Reply {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "request rejected");
        Reply::json(
            status,
            &ErrorResponse {
                message: self.to_string(),
            },
        )
    }
}

fn signaling_status(error: &SignalingError) -> StatusCode {
    match error {
        SignalingError::RoomNotFound
        | SignalingError::RequestNotFound
        | SignalingError::UserNotConnected(_) => StatusCode::NOT_FOUND,
        SignalingError::NotHost | SignalingError::NotParticipant => StatusCode::FORBIDDEN,
        SignalingError::GuestAlreadyPresent | SignalingError::NoGuest => StatusCode::CONFLICT,
        SignalingError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        SignalingError::SendError(_) => StatusCode::SERVICE_UNAVAILABLE,
        SignalingError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A request with its body read and checked against the payload limit
#[derive(Debug)]
pub struct Inbound {
    method: Method,
    path: String,
    query: Option<String>,
    user_header: Option<String>,
    body: String,
}

impl Inbound {
    /// Accept a request whose body has already been read as text
    pub fn from_request(request: Request<String>, limit: usize) -> Result<Self, ClientRequestError> {
        let (parts, body) = request.into_parts();
        if declared_length_exceeds(&parts.headers, limit) || body.len() > limit {
            return Err(ClientRequestError::PayloadTooLarge { limit });
        }
        let user_header = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            method: parts.method,
            user_header,
            body,
        })
    }

    /// Read the body of a POST, refusing anything over `limit` bytes before
    /// and after reading it
    async fn read(request: Request<Body>, limit: usize) -> Result<Self, ClientRequestError> {
        if declared_length_exceeds(request.headers(), limit) {
            return Err(ClientRequestError::PayloadTooLarge { limit });
        }
        let (parts, mut body) = request.into_parts();
        let text = if parts.method == Method::POST {
            body.str_contents()
                .await
                .map_err(|e| ClientRequestError::Body(format!("{e:?}")))?
                .to_string()
        } else {
            String::new()
        };
        Self::from_request(Request::from_parts(parts, text), limit)
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn user_id(&self) -> Result<UserId, ClientRequestError> {
        self.user_header
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(UserId::from)
            .ok_or(ClientRequestError::MissingUserHeader)
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T, ClientRequestError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

fn declared_length_exceeds(headers: &HeaderMap, limit: usize) -> bool {
    headers
        .get("content-length")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|length| length > limit)
}

/// Response contents before the CORS origin is attached
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl Reply {
    fn new(status: StatusCode, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            headers: vec![("content-type", content_type)],
            body,
        }
    }

    fn text(status: StatusCode, body: &str) -> Self {
        Self::new(status, "text/plain", body.to_string())
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::new(status, "application/json", body),
            Err(error) => {
                warn!(%error, "failed to encode response");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    fn empty_json() -> Self {
        Self::new(StatusCode::OK, "application/json", "{}".to_string())
    }

    /// Handle CORS preflight
    fn preflight() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: vec![
                ("access-control-allow-methods", "GET, POST, OPTIONS"),
                ("access-control-allow-headers", "content-type, x-user-id"),
                ("access-control-max-age", "86400"),
            ],
            body: String::new(),
        }
    }

    /// Header value, if set
    pub fn header(&self, name: &str) -> Option<&'static str> {
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    pub fn into_response(self, origin: &HeaderValue) -> Response<Body> {
        let body = if self.body.is_empty() {
            Body::empty()
        } else {
            Body::from(self.body)
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert("access-control-allow-origin", origin.clone());
        for (name, value) in self.headers {
            headers.insert(name, HeaderValue::from_static(value));
        }
        response
    }
}

type HandlerResult = Result<Reply, Rejection>;

/// Get a percent-decoded query parameter from the URI
fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| {
            percent_decode_str(&v.replace('+', " "))
                .decode_utf8_lossy()
                .into_owned()
        })
    })
}

fn required_param(query: Option<&str>, key: &'static str) -> Result<String, ClientRequestError> {
    query_param(query, key)
        .filter(|value| !value.is_empty())
        .ok_or(ClientRequestError::MissingField(key))
}

fn require(field: &'static str, value: &str) -> Result<(), ClientRequestError> {
    if value.is_empty() {
        Err(ClientRequestError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Open a connection for the user named in the query string
fn handle_connect(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let user_id = required_param(inbound.query(), "userId")?;
    let username = required_param(inbound.query(), "username")?;
    let user = User::new(user_id, username);
    state.connect(&user);
    Ok(Reply::json(StatusCode::OK, &ConnectResponse { user_id: user.id }))
}

fn handle_poll(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let user_id = UserId::from(required_param(inbound.query(), "userId")?);
    let events = state
        .poll(&user_id)
        .ok_or(SignalingError::UserNotConnected(user_id))?;
    Ok(Reply::json(StatusCode::OK, &PollResponse { events }))
}

fn handle_ws_message(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let user_id = inbound.user_id()?;
    state.receive(&user_id, &inbound.body)?;
    Ok(Reply::empty_json())
}

fn handle_ws_close(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let user_id = inbound.user_id()?;
    state.disconnect(&user_id);
    Ok(Reply::empty_json())
}

fn handle_create_room(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let body: CreateRoomRequest = inbound.json()?;
    require("userId", body.user_id.as_str())?;
    require("username", &body.username)?;

    let room_id = state.rooms().create_room(&body.user_id)?;
    Ok(Reply::json(StatusCode::OK, &CreateRoomResponse { room_id }))
}

fn handle_room_status(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let room_id = RoomId::from(required_param(inbound.query(), "roomId")?);
    let is_host = query_param(inbound.query(), "userId")
        .map(UserId::from)
        .is_some_and(|user_id| state.rooms().is_host(&user_id, &room_id));
    let exists = state.rooms().room_exists(&room_id);
    Ok(Reply::json(
        StatusCode::OK,
        &RoomStatusResponse {
            room_id,
            exists,
            is_host,
        },
    ))
}

fn handle_join_room(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let body: JoinRoomRequest = inbound.json()?;
    require("roomId", body.room_id.as_str())?;
    require("userId", body.user_id.as_str())?;
    require("username", &body.username)?;

    // The requester learns the outcome through ALLOW/DENY_JOIN_ROOM carrying
    // this id on their connection.
    let requester = User::new(body.user_id, body.username);
    let request_id = state.rooms().join_room(&requester, &body.room_id)?;
    Ok(Reply::json(StatusCode::OK, &JoinRoomResponse { request_id }))
}

fn handle_join_decision(inbound: &Inbound, state: &ServerState, approve: bool) -> HandlerResult {
    let body: JoinDecisionRequest = inbound.json()?;
    require("requestId", body.request_id.as_str())?;
    require("userId", body.user_id.as_str())?;

    if approve {
        state
            .rooms()
            .approve_join_room_request(&body.request_id, &body.user_id)?;
    } else {
        state
            .rooms()
            .deny_join_room_request(&body.request_id, &body.user_id)?;
    }
    Ok(Reply::empty_json())
}

fn handle_relay(inbound: &Inbound, state: &ServerState, sdp: bool) -> HandlerResult {
    let body: RelayRequest = inbound.json()?;
    require("roomId", body.room_id.as_str())?;
    require("userId", body.user_id.as_str())?;

    if sdp {
        state
            .rooms()
            .exchange_sdp(&body.room_id, &body.user_id, body.message)?;
    } else {
        state
            .rooms()
            .exchange_ice(&body.room_id, &body.user_id, body.message)?;
    }
    Ok(Reply::empty_json())
}

fn handle_end_room(inbound: &Inbound, state: &ServerState) -> HandlerResult {
    let body: EndRoomRequest = inbound.json()?;
    require("roomId", body.room_id.as_str())?;
    require("userId", body.user_id.as_str())?;

    state.rooms().end_room(&body.room_id, &body.user_id)?;
    Ok(Reply::empty_json())
}

/// Route a read request to its handler
pub fn route(inbound: &Inbound, state: &ServerState) -> Reply {
    debug!(method = %inbound.method, path = %inbound.path, "handling request");

    let result = match (&inbound.method, inbound.path.as_str()) {
        (&Method::OPTIONS, _) => Ok(Reply::preflight()),
        (&Method::GET, "/") => Ok(Reply::text(StatusCode::OK, INFO_PAGE)),
        (&Method::GET, "/health") => Ok(Reply::text(StatusCode::OK, "OK")),

        (&Method::GET, "/ws") => handle_connect(inbound, state),
        (&Method::GET, "/ws/poll") => handle_poll(inbound, state),
        (&Method::POST, "/ws/message") => handle_ws_message(inbound, state),
        (&Method::POST, "/ws/close") => handle_ws_close(inbound, state),

        (&Method::POST, "/room") => handle_create_room(inbound, state),
        (&Method::GET, "/room") => handle_room_status(inbound, state),
        (&Method::POST, "/room/join") => handle_join_room(inbound, state),
        (&Method::POST, "/room/join/approve") => handle_join_decision(inbound, state, true),
        (&Method::POST, "/room/join/deny") => handle_join_decision(inbound, state, false),
        (&Method::POST, "/room/sdp") => handle_relay(inbound, state, true),
        (&Method::POST, "/room/ice") => handle_relay(inbound, state, false),
        (&Method::POST, "/room/end") => handle_end_room(inbound, state),

        _ => Ok(Reply::text(StatusCode::NOT_FOUND, "Not Found")),
    };

    result.unwrap_or_else(Rejection::into_reply)
}

fn reply_for(inbound: Result<Inbound, ClientRequestError>, state: &ServerState) -> Reply {
    let expired = state.expire_idle_connections();
    if !expired.is_empty() {
        info!(count = expired.len(), "dropped idle connections");
    }
    match inbound {
        Ok(inbound) => route(&inbound, state),
        Err(error) => Rejection::from(error).into_reply(),
    }
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let inbound = Inbound::read(request, state.config().max_payload_bytes).await;
    Ok(reply_for(inbound, state).into_response(state.allowed_origin()))
}
