//! Line-delimited JSON wire protocol.
//!
//! - `message`: typed client requests and server replies
//! - `framer`: newline framing over per-connection byte buffers

pub mod framer;
pub mod message;

pub use framer::{Framer, DELIMITER};
pub use message::{FrameError, Reply, Request};
