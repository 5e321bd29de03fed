//! Authenticated command handlers.
//!
//! Three stateless operations are available once a connection has logged
//! in:
//! - `lcm`: least common multiple of two signed integers
//! - `parentheses`: balanced-bracket check over `(` and `)`
//! - `caesar`: lowercase Caesar shift over ASCII letters and spaces
//!
//! Validation failures become `error` replies; the connection and its
//! auth state are never affected by a command.

use crate::protocol::message::{Reply, Request, UNKNOWN_COMMAND};
use serde_json::Value;
use thiserror::Error;

const ALPHABET_LEN: i64 = 26;

/// Command validation errors. The display text is the wire message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid parameters for LCM.")]
    InvalidLcmParameters,
    #[error("Invalid parameters for parentheses check.")]
    InvalidParenthesesParameters,
    #[error("String contains invalid characters.")]
    InvalidParenthesesCharacters,
    #[error("Invalid parameters for Caesar cipher.")]
    InvalidCaesarParameters,
    #[error("error: invalid input")]
    InvalidCaesarInput,
}

/// Execute an authenticated request and build its reply.
pub fn execute(request: &Request) -> Reply {
    let result = match request {
        Request::Lcm { x, y } => handle_lcm(x, y),
        Request::Parentheses { string } => handle_parentheses(string),
        Request::Caesar { text, shift } => handle_caesar(text, shift),
        _ => return Reply::error(UNKNOWN_COMMAND),
    };

    result.unwrap_or_else(|e| Reply::error(e.to_string()))
}

fn handle_lcm(x: &Value, y: &Value) -> Result<Reply, CommandError> {
    let x = integer_param(x).ok_or(CommandError::InvalidLcmParameters)?;
    let y = integer_param(y).ok_or(CommandError::InvalidLcmParameters)?;
    Ok(Reply::LcmResult { result: lcm(x, y) })
}

fn handle_parentheses(string: &Value) -> Result<Reply, CommandError> {
    let s = string
        .as_str()
        .ok_or(CommandError::InvalidParenthesesParameters)?;
    let result = balanced_parentheses(s)?;
    Ok(Reply::ParenthesesResult { result })
}

fn handle_caesar(text: &Value, shift: &Value) -> Result<Reply, CommandError> {
    let shift = integer_param(shift).ok_or(CommandError::InvalidCaesarParameters)?;
    let text = text.as_str().ok_or(CommandError::InvalidCaesarParameters)?;
    let result = caesar(text, shift)?;
    Ok(Reply::CaesarResult { result })
}

/// Coerce a JSON value to an integer.
///
/// Accepts integers, floats (truncated toward zero) and strings holding a
/// signed decimal integer with optional surrounding whitespace.
fn integer_param(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_float)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truncate_float(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple, always non-negative. Zero if either input is.
pub fn lcm(x: i64, y: i64) -> i128 {
    if x == 0 || y == 0 {
        return 0;
    }
    let a = u128::from(x.unsigned_abs());
    let b = u128::from(y.unsigned_abs());
    // Below 2^126 for any i64 pair.
    (a / gcd(a, b) * b) as i128
}

/// Whether `s` is a balanced sequence of `(` and `)`.
pub fn balanced_parentheses(s: &str) -> Result<bool, CommandError> {
    if s.chars().any(|c| c != '(' && c != ')') {
        return Err(CommandError::InvalidParenthesesCharacters);
    }

    let mut depth: usize = 0;
    for c in s.chars() {
        if c == '(' {
            depth += 1;
        } else if depth == 0 {
            return Ok(false);
        } else {
            depth -= 1;
        }
    }
    Ok(depth == 0)
}

/// Caesar-shift `text` by `shift` positions. Output is always lowercase.
pub fn caesar(text: &str, shift: i64) -> Result<String, CommandError> {
    let shift = shift.rem_euclid(ALPHABET_LEN) as u8;

    text.chars()
        .map(|c| match c {
            ' ' => Ok(' '),
            c if c.is_ascii_alphabetic() => {
                let offset = c.to_ascii_lowercase() as u8 - b'a';
                Ok(char::from(b'a' + (offset + shift) % ALPHABET_LEN as u8))
            }
            _ => Err(CommandError::InvalidCaesarInput),
        })
        .collect()
}
