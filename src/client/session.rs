//! Client-side conversation state.
//!
//! The client alternates between waiting for a server frame and waiting
//! for a line of user input. Each event is handled once and yields the
//! actions the driver must perform; nothing here does I/O.

use crate::client::input::{parse_line, Input};
use crate::protocol::Request;
use serde::Deserialize;
use serde_json::Value;

/// Server frames as seen by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Greeting {
        #[serde(default)]
        message: String,
    },
    Continue {
        #[serde(default)]
        message: String,
    },
    LoginSuccess {
        #[serde(default)]
        message: String,
    },
    LoginFailure {
        #[serde(default)]
        message: String,
    },
    // Printed as received.
    LcmResult {
        #[serde(default)]
        result: Value,
    },
    ParenthesesResult {
        #[serde(default)]
        result: bool,
    },
    CaesarResult {
        #[serde(default)]
        result: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Which event the client waits for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingResponse,
    AwaitingInput,
}

/// How far the login has progressed, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginProgress {
    Anonymous,
    UsernameSent,
    LoggedIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A complete frame from the server, delimiter stripped.
    Frame(Vec<u8>),
    /// A line typed by the user.
    Line(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    Send(Request),
    Display(String),
    Quit,
}

const INVALID_INPUT: &str = "Invalid input, try again.";
const PASSWORD_EXPECTED: &str = "Expected 'Password: <password>', closing connection.";

#[derive(Debug)]
pub struct ClientSession {
    state: ClientState,
    progress: LoginProgress,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    /// A fresh session waits for the server greeting.
    pub fn new() -> Self {
        Self {
            state: ClientState::AwaitingResponse,
            progress: LoginProgress::Anonymous,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn progress(&self) -> LoginProgress {
        self.progress
    }

    pub fn handle(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match (self.state, event) {
            (ClientState::AwaitingResponse, ClientEvent::Frame(frame)) => self.on_frame(&frame),
            (ClientState::AwaitingInput, ClientEvent::Line(line)) => self.on_line(&line),
            // Out-of-turn events are dropped; the driver never produces
            // them.
            _ => Vec::new(),
        }
    }

    fn on_frame(&mut self, frame: &[u8]) -> Vec<ClientAction> {
        let message = serde_json::from_slice(frame).unwrap_or(ServerMessage::Unknown);
        self.state = ClientState::AwaitingInput;

        let text = match message {
            ServerMessage::Continue { message } => {
                self.progress = LoginProgress::UsernameSent;
                message
            }
            ServerMessage::LoginSuccess { message } => {
                self.progress = LoginProgress::LoggedIn;
                message
            }
            ServerMessage::LoginFailure { message } => {
                self.progress = LoginProgress::Anonymous;
                message
            }
            ServerMessage::Greeting { message } | ServerMessage::Error { message } => message,
            ServerMessage::LcmResult { result } => format!("the lcm is: {result}"),
            ServerMessage::ParenthesesResult { result } => format!(
                "the parentheses are balanced: {}",
                if result { "yes" } else { "no" }
            ),
            ServerMessage::CaesarResult { result } => format!("the ciphertext is: {result}"),
            ServerMessage::Unknown => "Error: Unknown response".to_string(),
        };

        if text.is_empty() {
            Vec::new()
        } else {
            vec![ClientAction::Display(text)]
        }
    }

    fn on_line(&mut self, line: &str) -> Vec<ClientAction> {
        let input = parse_line(line);

        if self.progress == LoginProgress::UsernameSent {
            return match input {
                Some(Input::Send(request @ Request::LoginPassword { .. })) => {
                    self.state = ClientState::AwaitingResponse;
                    vec![ClientAction::Send(request)]
                }
                Some(Input::Quit) => vec![ClientAction::Quit],
                None if line.trim().is_empty() => vec![ClientAction::Display(INVALID_INPUT.into())],
                _ => vec![
                    ClientAction::Display(PASSWORD_EXPECTED.into()),
                    ClientAction::Quit,
                ],
            };
        }

        match input {
            Some(Input::Send(request)) => {
                self.state = ClientState::AwaitingResponse;
                vec![ClientAction::Send(request)]
            }
            Some(Input::Quit) => vec![ClientAction::Quit],
            None => vec![ClientAction::Display(INVALID_INPUT.into())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(json: &str) -> ClientEvent {
        ClientEvent::Frame(json.as_bytes().to_vec())
    }

    fn line(text: &str) -> ClientEvent {
        ClientEvent::Line(text.to_string())
    }

    #[test]
    fn test_full_conversation() {
        let mut session = ClientSession::new();
        assert_eq!(session.state(), ClientState::AwaitingResponse);

        let actions = session.handle(frame(
            r#"{"type":"greeting","message":"Welcome! Please log in."}"#,
        ));
        assert_eq!(
            actions,
            vec![ClientAction::Display("Welcome! Please log in.".into())]
        );
        assert_eq!(session.state(), ClientState::AwaitingInput);

        let actions = session.handle(line("User: Alice"));
        assert_eq!(
            actions,
            vec![ClientAction::Send(Request::LoginUsername {
                username: json!("Alice")
            })]
        );
        assert_eq!(session.state(), ClientState::AwaitingResponse);

        assert!(session
            .handle(frame(r#"{"type":"continue","message":""}"#))
            .is_empty());
        assert_eq!(session.progress(), LoginProgress::UsernameSent);

        session.handle(line("Password: secret"));
        session.handle(frame(
            r#"{"type":"login_success","message":"Hi Alice, good to see you."}"#,
        ));
        assert_eq!(session.progress(), LoginProgress::LoggedIn);

        session.handle(line("lcm: 6 8"));
        let actions = session.handle(frame(r#"{"type":"lcm_result","result":24}"#));
        assert_eq!(actions, vec![ClientAction::Display("the lcm is: 24".into())]);
    }

    #[test]
    fn test_result_rendering() {
        let mut session = ClientSession::new();
        let cases = [
            (
                r#"{"type":"parentheses_result","result":false}"#,
                "the parentheses are balanced: no",
            ),
            (
                r#"{"type":"caesar_result","result":"khoor zruog"}"#,
                "the ciphertext is: khoor zruog",
            ),
            (
                r#"{"type":"lcm_result","result":0}"#,
                "the lcm is: 0",
            ),
            (
                r#"{"type":"error","message":"Invalid JSON format."}"#,
                "Invalid JSON format.",
            ),
            (r#"{"type":"mystery"}"#, "Error: Unknown response"),
            ("not json", "Error: Unknown response"),
        ];

        for (json, expected) in cases {
            session.state = ClientState::AwaitingResponse;
            assert_eq!(
                session.handle(frame(json)),
                vec![ClientAction::Display(expected.into())],
                "rendering {json}"
            );
        }
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let mut session = ClientSession::new();
        session.handle(frame(r#"{"type":"greeting","message":"hi"}"#));

        let actions = session.handle(line("lcm: 1"));
        assert_eq!(actions, vec![ClientAction::Display(INVALID_INPUT.into())]);
        assert_eq!(session.state(), ClientState::AwaitingInput);
    }

    #[test]
    fn test_only_password_accepted_after_username() {
        let mut session = ClientSession::new();
        session.handle(frame(r#"{"type":"greeting","message":"hi"}"#));
        session.handle(line("User: Alice"));
        session.handle(frame(r#"{"type":"continue","message":""}"#));

        let actions = session.handle(line("lcm: 6 8"));
        assert_eq!(actions.last(), Some(&ClientAction::Quit));
    }

    #[test]
    fn test_login_failure_resets_progress() {
        let mut session = ClientSession::new();
        session.handle(frame(r#"{"type":"greeting","message":"hi"}"#));
        session.handle(line("User: Alice"));
        session.handle(frame(r#"{"type":"continue","message":""}"#));
        session.handle(line("Password: wrong"));
        session.handle(frame(r#"{"type":"login_failure","message":"Failed to login."}"#));

        assert_eq!(session.progress(), LoginProgress::Anonymous);
        assert!(matches!(
            session.handle(line("User: Bob")).as_slice(),
            [ClientAction::Send(Request::LoginUsername { .. })]
        ));
    }

    #[test]
    fn test_out_of_turn_events_ignored() {
        let mut session = ClientSession::new();
        assert!(session.handle(line("User: Alice")).is_empty());
        assert_eq!(session.state(), ClientState::AwaitingResponse);
    }

    #[test]
    fn test_quit() {
        let mut session = ClientSession::new();
        session.handle(frame(r#"{"type":"greeting","message":"hi"}"#));
        assert_eq!(session.handle(line("quit")), vec![ClientAction::Quit]);
    }
}
