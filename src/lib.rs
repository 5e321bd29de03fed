//! authcalc: an authenticated command server over line-delimited JSON.
//!
//! Clients log in with a username and password, then may ask for:
//! - the least common multiple of two integers
//! - whether a string of parentheses is balanced
//! - a Caesar shift of a string of letters and spaces
//!
//! Features:
//! - Single-threaded mio event loop, no per-connection threads
//! - Per-connection handshake state machine
//! - Frame and send-backlog limits per connection
//! - Configuration via CLI arguments or TOML file
//! - Terminal client driven by an explicit input/response state machine

pub mod client;
pub mod commands;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod users;
