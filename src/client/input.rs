//! Parsing of interactive client input lines.
//!
//! ```text
//! User: alice
//! Password: secret
//! lcm: 6 8
//! parentheses: (()())
//! caesar: hello world 3
//! quit
//! ```

use crate::protocol::Request;
use serde_json::Value;

/// A recognized input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Send(Request),
    Quit,
}

/// Parse one line typed by the user. `None` means the line is not valid.
pub fn parse_line(line: &str) -> Option<Input> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (&command, args) = tokens.split_first()?;

    let request = match (command, args) {
        ("User:", [username]) => Request::LoginUsername {
            username: Value::from(*username),
        },
        ("Password:", [password]) => Request::LoginPassword {
            password: Value::from(*password),
        },
        ("parentheses:", [string]) => Request::Parentheses {
            string: Value::from(*string),
        },
        ("lcm:", [x, y]) => Request::Lcm {
            x: Value::from(*x),
            y: Value::from(*y),
        },
        ("caesar:" | "ceasar:", [words @ .., shift]) if !words.is_empty() => {
            let shift: i64 = shift.parse().ok()?;
            Request::Caesar {
                text: Value::from(words.join(" ")),
                shift: Value::from(shift),
            }
        }
        ("quit", []) => return Some(Input::Quit),
        _ => return None,
    };

    Some(Input::Send(request))
}
