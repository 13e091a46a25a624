//! `trashbot-gateway` – the remote-control WebSocket gateway.
//!
//! Accepts persistent WebSocket connections (default port `3000`) and turns
//! the JSON control messages they carry into motion and lid commands:
//!
//! | Inbound `event` | Effect |
//! |---|---|
//! | `TEST_CONNECTION` | Replies `TEST_CONNECTION_RESPONSE` |
//! | `MOVE` + `direction` | Updates the [`MotionScheduler`] register |
//! | `OPEN_TRASHCAN` / `CLOSE_TRASHCAN` + `lid` | Runs a timed lid motion |
//!
//! Protocol errors are answered with `{"error": ...}` and never close the
//! connection.  Losing a connection, for whatever reason, forces the robot
//! to `STOP`.
//!
//! [`MotionScheduler`]: trashbot_runtime::MotionScheduler

pub mod liveness;
pub mod protocol;
pub mod server;

pub use liveness::Liveness;
pub use protocol::{ProtocolHandler, Request};
pub use server::{BoundGateway, DEFAULT_PORT, GatewayServer, ServerConfig};
