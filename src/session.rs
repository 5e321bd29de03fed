//! Per-connection login handshake.
//!
//! A connection starts `Unauthenticated`, names a user, then proves it
//! with that user's password. Until it is `Authenticated`, any frame other
//! than the one the handshake expects ends the connection without a reply.
//! Once authenticated, unknown frames only earn an `error` reply.
//!
//! Malformed JSON is answered with an `error` reply in every state and
//! never changes the state.

use crate::commands;
use crate::protocol::message::{Reply, Request, INVALID_JSON};
use crate::users::UserDirectory;
use tracing::{debug, trace};

/// Handshake position of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// A known username was supplied; its password is expected next.
    UsernamePendingPassword { username: String },
    Authenticated { username: String },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    /// Username bound to this connection so far, if any.
    pub fn username(&self) -> Option<&str> {
        match self {
            AuthState::Unauthenticated => None,
            AuthState::UsernamePendingPassword { username }
            | AuthState::Authenticated { username } => Some(username),
        }
    }
}

/// What the caller must do after a frame has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Queue this reply for the peer.
    Reply(Reply),
    /// Protocol violation before login: drop the connection, send nothing.
    Disconnect,
}

/// Handle one complete frame, advancing `state`.
pub fn handle_frame(state: &mut AuthState, frame: &[u8], users: &UserDirectory) -> Outcome {
    let request = match Request::decode(frame) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed frame");
            return Outcome::Reply(Reply::error(INVALID_JSON));
        }
    };

    trace!(kind = request.kind(), "Handling frame");
    handle_request(state, &request, users)
}

/// Apply a decoded request to the handshake state.
pub fn handle_request(state: &mut AuthState, request: &Request, users: &UserDirectory) -> Outcome {
    match state {
        AuthState::Unauthenticated => {
            let Request::LoginUsername { username } = request else {
                debug!(kind = request.kind(), "Command before login");
                return Outcome::Disconnect;
            };

            match username.as_str().filter(|name| users.contains(name)) {
                Some(name) => {
                    *state = AuthState::UsernamePendingPassword {
                        username: name.to_string(),
                    };
                    Outcome::Reply(Reply::proceed())
                }
                None => {
                    debug!("Unknown username");
                    Outcome::Reply(Reply::login_failure())
                }
            }
        }

        AuthState::UsernamePendingPassword { username } => {
            let Request::LoginPassword { password } = request else {
                debug!(kind = request.kind(), "Expected password");
                return Outcome::Disconnect;
            };

            let matches = match (users.password_for(username), password.as_str()) {
                (Some(stored), Some(given)) => stored == given,
                _ => false,
            };

            if matches {
                let username = std::mem::take(username);
                debug!(user = %username, "Login succeeded");
                let reply = Reply::login_success(&username);
                *state = AuthState::Authenticated { username };
                Outcome::Reply(reply)
            } else {
                debug!(user = %username, "Wrong password");
                *state = AuthState::Unauthenticated;
                Outcome::Reply(Reply::login_failure())
            }
        }

        AuthState::Authenticated { .. } => Outcome::Reply(commands::execute(request)),
    }
}
