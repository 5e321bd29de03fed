//! Wire message types.
//!
//! Every frame is a JSON object whose `"type"` field selects the variant.
//! Client frames decode into [`Request`]; server frames are built from
//! [`Reply`].
//!
//! Request payload fields are kept as raw JSON values: field validation
//! belongs to the handler of each message, so a wrong field type is a
//! command error rather than a malformed frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const GREETING: &str = "Welcome! Please log in.";
pub const LOGIN_FAILED: &str = "Failed to login.";
pub const INVALID_JSON: &str = "Invalid JSON format.";
pub const UNKNOWN_COMMAND: &str =
    "Unknown command or incorrect format. Please check and try again.";

/// Client-originated message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    LoginUsername {
        #[serde(default)]
        username: Value,
    },
    LoginPassword {
        #[serde(default)]
        password: Value,
    },
    Lcm {
        #[serde(default)]
        x: Value,
        #[serde(default)]
        y: Value,
    },
    Parentheses {
        #[serde(default)]
        string: Value,
    },
    Caesar {
        #[serde(default)]
        text: Value,
        #[serde(default)]
        shift: Value,
    },
    /// Any object whose type is missing or not recognized.
    #[serde(other)]
    Unknown,
}

/// Server-originated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Greeting { message: String },
    Continue { message: String },
    LoginSuccess { message: String },
    LoginFailure { message: String },
    LcmResult { result: i128 },
    ParenthesesResult { result: bool },
    CaesarResult { result: String },
    Error { message: String },
}

/// Frame-level decode failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },
}

impl Request {
    /// Decode one frame (delimiter already stripped).
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_slice(frame)?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject);
        }
        // Only a missing or non-string tag can fail here: every payload
        // field accepts any JSON value.
        Ok(Request::deserialize(value).unwrap_or(Request::Unknown))
    }

    /// Wire name of this request, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::LoginUsername { .. } => "login_username",
            Request::LoginPassword { .. } => "login_password",
            Request::Lcm { .. } => "lcm",
            Request::Parentheses { .. } => "parentheses",
            Request::Caesar { .. } => "caesar",
            Request::Unknown => "unknown",
        }
    }
}

impl Reply {
    pub fn greeting() -> Self {
        Reply::Greeting {
            message: GREETING.to_string(),
        }
    }

    pub fn proceed() -> Self {
        Reply::Continue {
            message: String::new(),
        }
    }

    pub fn login_success(username: &str) -> Self {
        Reply::LoginSuccess {
            message: format!("Hi {username}, good to see you."),
        }
    }

    pub fn login_failure() -> Self {
        Reply::LoginFailure {
            message: LOGIN_FAILED.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_login_username() {
        let request = Request::decode(br#"{"type":"login_username","username":"Alice"}"#).unwrap();
        assert_eq!(
            request,
            Request::LoginUsername {
                username: json!("Alice")
            }
        );
    }

    #[test]
    fn test_decode_command_fields() {
        match Request::decode(br#"{"type":"lcm","x":"6","y":8}"#).unwrap() {
            Request::Lcm { x, y } => {
                assert_eq!(x, json!("6"));
                assert_eq!(y, json!(8));
            }
            other => panic!("unexpected: {:?}", other),
        }

        match Request::decode(br#"{"type":"caesar","text":"abc","shift":-1,"extra":true}"#).unwrap()
        {
            Request::Caesar { text, shift } => {
                assert_eq!(text, json!("abc"));
                assert_eq!(shift, json!(-1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_default_to_null() {
        match Request::decode(br#"{"type":"login_password"}"#).unwrap() {
            Request::LoginPassword { password } => assert!(password.is_null()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_missing_type() {
        assert_eq!(
            Request::decode(br#"{"type":"shutdown"}"#).unwrap(),
            Request::Unknown
        );
        assert_eq!(Request::decode(br#"{"x":1}"#).unwrap(), Request::Unknown);
        assert_eq!(Request::decode(br#"{"type":7}"#).unwrap(), Request::Unknown);
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            Request::decode(b"{not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            Request::decode(b"\xff\xfe"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            Request::decode(b"[1,2]"),
            Err(FrameError::NotAnObject)
        ));
        assert!(matches!(
            Request::decode(b"\"lcm\""),
            Err(FrameError::NotAnObject)
        ));
    }

    #[test]
    fn test_reply_encoding() {
        let cases = [
            (
                Reply::greeting(),
                r#"{"type":"greeting","message":"Welcome! Please log in."}"#,
            ),
            (Reply::proceed(), r#"{"type":"continue","message":""}"#),
            (
                Reply::login_success("Alice"),
                r#"{"type":"login_success","message":"Hi Alice, good to see you."}"#,
            ),
            (
                Reply::LcmResult { result: 24 },
                r#"{"type":"lcm_result","result":24}"#,
            ),
            (
                Reply::ParenthesesResult { result: false },
                r#"{"type":"parentheses_result","result":false}"#,
            ),
            (
                Reply::CaesarResult {
                    result: "khoor zruog".into(),
                },
                r#"{"type":"caesar_result","result":"khoor zruog"}"#,
            ),
        ];

        for (reply, expected) in cases {
            assert_eq!(serde_json::to_string(&reply).unwrap(), expected);
        }
    }

    #[test]
    fn test_wide_lcm_result_encodes_exactly() {
        let reply = Reply::LcmResult {
            result: i64::MAX as i128 * 2,
        };
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"type":"lcm_result","result":18446744073709551614}"#
        );
    }

    #[test]
    fn test_request_encoding_matches_wire() {
        let request = Request::Lcm {
            x: json!("6"),
            y: json!("8"),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"type":"lcm","x":"6","y":"8"}"#
        );
    }
}
