//! Socket.IO v0.9-compatible server core.
//!
//! This crate is the transport-agnostic session layer together with the
//! packet codec and the four transport state machines (WebSocket,
//! Flash-socket, XHR long-polling, JSONP long-polling) that a Socket.IO
//! v0.9 server needs. It plays the role `engineioxide` plays for Engine.IO
//! in the workspace this crate is modeled on: an embedding HTTP server
//! (hyper/axum/warp, all via `tower::Service`) drives [`service::EngineService`],
//! and an application-supplied [`handler::Handler`] receives sessions and
//! packets.
//!
//! Out of scope (see `SPEC_FULL.md` §1): namespaces beyond endpoint
//! pass-through, ack-callback correlation, rooms, clustering — the "Socket.IO
//! application" layer a `socketioxide`-equivalent crate would build on top of
//! this one.

pub mod body;
pub mod config;
pub mod errors;
pub mod futures;
pub mod handler;
pub mod heartbeat;
pub mod packet;
pub mod registry;
pub mod service;
pub mod session;
pub mod sid;
pub mod transport;

pub use body::ResponseBody;
pub use config::ServerConfig;
pub use errors::Error;
pub use handler::Handler;
pub use packet::{Packet, PacketType};
pub use registry::SessionRegistry;
pub use service::{Engine, EngineService};
pub use session::{DisconnectReason, Session, SessionState};
pub use sid::Sid;
pub use transport::TransportKind;
