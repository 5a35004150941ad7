//! The real-time notification stream.
//!
//! The gateway pushes the same payment notifications it delivers by webhook over a websocket, usually a few
//! seconds earlier. The stream is an accelerant only: losing it degrades latency, never correctness, because the
//! reconciliation engine treats both channels identically.
//!
//! The module is split so the connection policy is testable without sockets:
//! * [`protocol`] defines the frame shapes on the wire.
//! * [`lifecycle`] is the pure connect/reconnect/keepalive state machine.
//! * [`client`] drives the state machine over a real websocket connection.

pub mod client;
pub mod lifecycle;
pub mod protocol;

pub use client::spawn_stream_client;
pub use lifecycle::{StreamAction, StreamInput, StreamLifecycle, StreamState};
