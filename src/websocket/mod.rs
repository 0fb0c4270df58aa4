//! WebSocket upgrade adapter for actix-web.
//!
//! [`Upgrader`] turns a handler taking a [`PooledConn`] into an actix-web
//! route handler. Each upgraded request gets a pooled [`Conn`] carrying the
//! request's locals, query parameters, path parameters and cookies next to
//! the established [`Socket`].

mod bridge;
mod connection;
mod constants;
mod locals;
mod pool;
pub(crate) mod socket;
mod upgrade;

pub use connection::Conn;
pub use constants::{close_code, MessageType};
pub use locals::{Local, Locals, LocalsExt};
pub use pool::{ConnPool, PoolStats, PooledConn};
pub use socket::{format_close_message, ReadHalf, Socket, SocketOptions, WriteHalf};
pub use upgrade::{handler, is_websocket_upgrade, Config, Filter, Upgrader, DEFAULT_READ_BUFFER_SIZE};

pub use crate::error::WsError;
