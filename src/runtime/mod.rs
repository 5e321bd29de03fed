//! Single-threaded networking runtime.
//!
//! - `Connection`: per-client stream, buffers and handshake state
//! - `ConnectionRegistry`: slab arena of live connections
//! - `Server`: the mio readiness loop driving accept/read/write

mod connection;
mod event_loop;

pub use connection::{ConnId, Connection, ConnectionRegistry, ReadStatus};
pub use event_loop::{service_frames, ConnectionError, Server, ShutdownHandle};

use crate::config::Config;
use crate::users::UserDirectory;

/// Bind and run the server until it is shut down.
pub fn run(config: &Config, users: UserDirectory) -> std::io::Result<()> {
    let mut server = Server::bind(config, users)?;
    server.run()
}
