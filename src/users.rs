//! Static username/password directory.
//!
//! Loaded once from a tab-separated text file before the event loop
//! starts and shared read-only by every connection afterwards.
//!
//! ## File Format
//!
//! ```text
//! alice<TAB>secret
//! bob<TAB>hunter2
//! ```
//!
//! Blank lines are ignored, lines without exactly two fields are skipped,
//! and a later record for the same username replaces an earlier one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const FIELD_SEPARATOR: char = '\t';

/// Errors loading the user directory.
#[derive(Debug, Error)]
pub enum UsersError {
    #[error("Users file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read users file '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
}

/// Immutable username → password lookup.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, String>,
}

impl UserDirectory {
    /// Load the directory from a file on disk.
    pub fn load(path: &Path) -> Result<Self, UsersError> {
        if !path.is_file() {
            return Err(UsersError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| UsersError::Read(path.to_path_buf(), e))?;
        Ok(Self::parse(&contents))
    }

    /// Build the directory from the text of a users file.
    pub fn parse(contents: &str) -> Self {
        let mut users = HashMap::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(FIELD_SEPARATOR);
            match (fields.next(), fields.next(), fields.next()) {
                (Some(username), Some(password), None) => {
                    users.insert(username.trim().to_string(), password.trim().to_string());
                }
                _ => debug!(line = line_no + 1, "Skipping malformed users record"),
            }
        }

        Self { users }
    }

    /// Stored password for `username`, if the user exists.
    pub fn password_for(&self, username: &str) -> Option<&str> {
        self.users.get(username).map(String::as_str)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
