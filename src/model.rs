use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Imported,
    Bookmarked,
    Saved,
    Obsolete,
    Archived,
    Deleted,
}

impl CommandStatus {
    pub const ALL: [CommandStatus; 6] = [
        CommandStatus::Imported,
        CommandStatus::Bookmarked,
        CommandStatus::Saved,
        CommandStatus::Obsolete,
        CommandStatus::Archived,
        CommandStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Imported => "IMPORTED",
            CommandStatus::Bookmarked => "BOOKMARKED",
            CommandStatus::Saved => "SAVED",
            CommandStatus::Obsolete => "OBSOLETE",
            CommandStatus::Archived => "ARCHIVED",
            CommandStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown command status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LintStatus {
    Ok,
    Warning,
    Error,
    CheckFailed,
    Unavailable,
}

impl LintStatus {
    pub const ALL: [LintStatus; 5] = [
        LintStatus::Ok,
        LintStatus::Warning,
        LintStatus::Error,
        LintStatus::CheckFailed,
        LintStatus::Unavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LintStatus::Ok => "OK",
            LintStatus::Warning => "WARNING",
            LintStatus::Error => "ERROR",
            LintStatus::CheckFailed => "CHECK_FAILED",
            LintStatus::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for LintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LintStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown lint status: {}", s))
    }
}

/// A command as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCommand {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub script: String,
    pub elapsed_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: CommandStatus,
    pub lint_status: LintStatus,
}

/// Everything needed to insert a command; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCommand {
    pub title: String,
    pub description: String,
    pub script: String,
    pub elapsed_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: CommandStatus,
    pub lint_status: LintStatus,
}

impl NewCommand {
    /// Record for a freshly imported history entry: empty title and
    /// description, status `Imported`, both timestamps set to `timestamp`.
    pub fn imported(script: &str, elapsed_seconds: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            script: script.to_string(),
            elapsed_seconds,
            created_at: timestamp,
            modified_at: timestamp,
            status: CommandStatus::Imported,
            lint_status: LintStatus::Unavailable,
        }
    }

    pub fn into_persisted(self, id: i64) -> PersistedCommand {
        PersistedCommand {
            id,
            title: self.title,
            description: self.description,
            script: self.script,
            elapsed_seconds: self.elapsed_seconds,
            created_at: self.created_at,
            modified_at: self.modified_at,
            status: self.status,
            lint_status: self.lint_status,
        }
    }
}

/// Current time at the microsecond precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Collapse whitespace runs to one space and drop spaces around pipes, so
/// that `ls  -la |grep x` and `ls -la | grep x` compare equal.
pub fn normalize_script(script: &str) -> String {
    let chars = script.trim().chars().collect::<Vec<_>>();
    let mut result = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '|' {
                continue;
            }
            result.push(' ');
        } else if c == '|' {
            if result.ends_with(' ') {
                result.pop();
            }
            result.push('|');
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
        } else {
            result.push(c);
            i += 1;
        }
    }

    result.trim().to_string()
}

/// SHA-256 (hex) of the normalized script; the duplicate-detection key.
pub fn script_hash(script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_script(script).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in CommandStatus::ALL {
            assert_eq!(status.as_str().parse::<CommandStatus>().unwrap(), status);
        }
        for status in LintStatus::ALL {
            assert_eq!(status.as_str().parse::<LintStatus>().unwrap(), status);
        }
        assert_eq!("bookmarked".parse::<CommandStatus>().unwrap(), CommandStatus::Bookmarked);
        assert!("PENDING".parse::<CommandStatus>().is_err());
    }

    #[test]
    fn normalize_collapses_whitespace_and_pipes() {
        assert_eq!(normalize_script("  ls   -la |  grep x  "), "ls -la|grep x");
        assert_eq!(normalize_script("echo a\n  echo b"), "echo a echo b");
        assert_eq!(normalize_script("a | b|c"), "a|b|c");
    }

    #[test]
    fn hash_ignores_cosmetic_whitespace() {
        assert_eq!(script_hash("ls -la | wc -l"), script_hash("ls  -la|wc -l"));
        assert_ne!(script_hash("ls -la"), script_hash("ls -l"));
        assert_eq!(script_hash("pwd").len(), 64);
    }

    #[test]
    fn imported_record_defaults() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let cmd = NewCommand::imported("echo hi", 5, ts);
        assert_eq!(cmd.status, CommandStatus::Imported);
        assert!(cmd.title.is_empty() && cmd.description.is_empty());
        assert_eq!(cmd.created_at, cmd.modified_at);
        let persisted = cmd.into_persisted(3);
        assert_eq!(persisted.id, 3);
        assert_eq!(persisted.elapsed_seconds, 5);
    }
}
