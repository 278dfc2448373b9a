//! WASI-compatible WebRTC signaling relay using wstd
//!
//! Two peers, a host and a guest, meet in a room identified by a short code.
//! The guest asks to join, the host approves or denies, and the two then
//! exchange opaque SDP and ICE blobs through the server, which never looks
//! inside them.
//!
//! # Protocol
//!
//! WASI HTTP has no WebSocket upgrade, so each user's persistent connection is
//! a long-polled mailbox:
//!
//! - **GET /ws?userId={id}&username={name}** - Open a connection
//! - **GET /ws/poll?userId={id}** - Drain pushed messages
//! - **POST /ws/message** - Send `PING`/`PONG` (X-User-Id header required)
//! - **POST /room**, **/room/join**, **/room/join/approve**,
//!   **/room/join/deny**, **/room/sdp**, **/room/ice**, **/room/end** -
//!   Control-plane operations with JSON bodies
//!
//! ## Pushed messages (server → client)
//!
//! Each polled event is a JSON envelope `{"type": <code>, "payload": ...}`:
//! - `3` REQUEST_JOIN_ROOM `{"requestId", "roomId", "userId", "username"}` - to the host
//! - `4` ALLOW_JOIN_ROOM / `5` DENY_JOIN_ROOM `{"requestId", "roomId", "approved"}`
//! - `6` ROOM_READY / `7` ROOM_END `{"roomId"}`
//! - `8` SDP / `9` ICE - the relayed blob as a string
//! - `0` PING / `1` PONG / `2` ERROR - keepalive and connection errors
//!
//! # State between requests
//!
//! `wasmtime serve` runs every request in a fresh component instance, so by
//! default the binary loads a JSON snapshot of all rooms and mailboxes before
//! each request and writes it back afterwards (`GLIMPSE_STATE_FILE`, default
//! `glimpse_state.json` in a preopened directory). Hosts that keep one
//! instance alive can set `GLIMPSE_PERSIST_STATE=false` to keep state in
//! memory only. Concurrent requests in separate instances race on the file;
//! the last writer wins.
//!
//! A connection that neither polls nor sends a frame for
//! `GLIMPSE_IDLE_TIMEOUT_SECS` (default 10) is dropped.
//!
//! # Example
//!
//! ```bash
//! # Start the server with a fresh state file; the long idle timeout leaves
//! # time to type the steps below by hand
//! rm -f state/glimpse_state.json
//! wasmtime serve -S common --dir state::. --env GLIMPSE_IDLE_TIMEOUT_SECS=600 \
//!   --addr 127.0.0.1:8080 glimpse-signaling-wasm.wasm
//!
//! # Host connects and creates a room
//! curl "http://127.0.0.1:8080/ws?userId=h1&username=Host"
//! curl -X POST -d '{"userId":"h1","username":"Host"}' http://127.0.0.1:8080/room
//!
//! # Guest connects and asks to join
//! curl "http://127.0.0.1:8080/ws?userId=g1&username=Guest"
//! curl -X POST -d '{"userId":"g1","username":"Guest","roomId":"<room-id>"}' \
//!   http://127.0.0.1:8080/room/join
//!
//! # Host sees the request and approves it
//! curl "http://127.0.0.1:8080/ws/poll?userId=h1"
//! curl -X POST -d '{"userId":"h1","requestId":"<request-id>"}' \
//!   http://127.0.0.1:8080/room/join/approve
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod mailbox;
pub mod orchestrator;
pub mod registry;
pub mod rooms;
pub mod snapshot;
pub mod state;

pub use config::ServerConfig;
pub use error::{ClientRequestError, ConfigError, SignalingError, SnapshotError, ValidationError};
pub use handler::handle_request;
pub use mailbox::Mailbox;
pub use orchestrator::{Negotiation, RoomManager};
pub use registry::{ConnectionHandle, SessionRegistry};
pub use rooms::{Room, User};
pub use snapshot::{StateFile, StateSnapshot};
pub use state::ServerState;
