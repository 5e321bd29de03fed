//! Interactive terminal client.
//!
//! - `input`: parsing of typed command lines into requests
//! - `session`: the AwaitingInput / AwaitingResponse state machine

pub mod input;
pub mod session;

pub use input::{parse_line, Input};
pub use session::{ClientAction, ClientEvent, ClientSession, ClientState, LoginProgress, ServerMessage};
