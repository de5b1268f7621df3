use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{script_hash, CommandStatus, LintStatus, NewCommand, PersistedCommand};

pub const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COMMAND_COLUMNS: &str = "id, title, description, script, elapsed, creation_datetime, \
     modification_datetime, status, lint_status";

/// Persistence contract the ingestion pass and the lifecycle operations
/// rely on. Implementations serialize their own reads and writes.
pub trait CommandStore {
    /// Latest `created_at` across all stored commands, `None` when empty.
    fn max_created_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// True when a command with the same normalized script is stored,
    /// whatever its status.
    fn script_exists(&self, script: &str) -> Result<bool>;

    fn insert_command(&self, command: &NewCommand) -> Result<i64>;

    /// Overwrite the stored record with the same id.
    fn update_command(&self, command: &PersistedCommand) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<CommandStatus>,
    pub include_deleted: bool,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let current_version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            )));
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS command (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                script TEXT NOT NULL,
                script_hash TEXT NOT NULL,
                elapsed INTEGER NOT NULL DEFAULT 0,
                creation_datetime TEXT NOT NULL,
                modification_datetime TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'IMPORTED'
                    CHECK (status IN ('IMPORTED', 'BOOKMARKED', 'SAVED', 'OBSOLETE', 'ARCHIVED', 'DELETED')),
                lint_status TEXT NOT NULL DEFAULT 'UNAVAILABLE'
                    CHECK (lint_status IN ('OK', 'WARNING', 'ERROR', 'CHECK_FAILED', 'UNAVAILABLE'))
            );

            CREATE INDEX IF NOT EXISTS idx_command_hash ON command(script_hash);
            CREATE INDEX IF NOT EXISTS idx_command_created ON command(creation_datetime);
            CREATE INDEX IF NOT EXISTS idx_command_status ON command(status);
            "#,
        )?;

        self.conn
            .execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        Ok(())
    }

    pub fn get_command(&self, id: i64) -> Result<Option<PersistedCommand>> {
        let command = self
            .conn
            .query_row(
                &format!("SELECT {} FROM command WHERE id = ?1", COMMAND_COLUMNS),
                [id],
                command_from_row,
            )
            .optional()?;
        Ok(command)
    }

    /// Like [`Self::get_command`] but a missing id is an error.
    pub fn require_command(&self, id: i64) -> Result<PersistedCommand> {
        self.get_command(id)?.ok_or(Error::CommandNotFound(id))
    }

    pub fn list_commands(&self, filter: &ListFilter) -> Result<Vec<PersistedCommand>> {
        let mut sql = format!("SELECT {} FROM command", COMMAND_COLUMNS);
        let mut status_param: Option<&'static str> = None;
        if let Some(status) = filter.status {
            sql.push_str(" WHERE status = ?1");
            status_param = Some(status.as_str());
        } else if !filter.include_deleted {
            sql.push_str(" WHERE status <> 'DELETED'");
        }
        sql.push_str(" ORDER BY modification_datetime DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match status_param {
            Some(status) => stmt.query_map([status], command_from_row)?,
            None => stmt.query_map([], command_from_row)?,
        };
        let commands = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(commands)
    }

    #[cfg(test)]
    pub fn count_commands(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM command", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl CommandStore for Database {
    fn max_created_at(&self) -> Result<Option<DateTime<Utc>>> {
        let max: Option<String> =
            self.conn
                .query_row("SELECT MAX(creation_datetime) FROM command", [], |row| row.get(0))?;
        max.map(|value| parse_datetime(&value, 0)).transpose().map_err(Error::from)
    }

    fn script_exists(&self, script: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM command WHERE script_hash = ?1 LIMIT 1",
                [script_hash(script)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_command(&self, command: &NewCommand) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO command (title, description, script, script_hash, elapsed,
                                 creation_datetime, modification_datetime, status, lint_status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                &command.title,
                &command.description,
                &command.script,
                script_hash(&command.script),
                command.elapsed_seconds as i64,
                format_datetime(&command.created_at),
                format_datetime(&command.modified_at),
                command.status.as_str(),
                command.lint_status.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_command(&self, command: &PersistedCommand) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE command SET
                title = ?2,
                description = ?3,
                script = ?4,
                script_hash = ?5,
                elapsed = ?6,
                modification_datetime = ?7,
                status = ?8,
                lint_status = ?9
            WHERE id = ?1
            "#,
            params![
                command.id,
                &command.title,
                &command.description,
                &command.script,
                script_hash(&command.script),
                command.elapsed_seconds as i64,
                format_datetime(&command.modified_at),
                command.status.as_str(),
                command.lint_status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::CommandNotFound(command.id));
        }
        Ok(())
    }
}

/// Fixed-width RFC 3339 so that `MAX()` over the text column is chronological.
fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str, column: usize) -> rusqlite::Result<T> {
    value
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, e.into()))
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedCommand> {
    let elapsed: i64 = row.get(4)?;
    let created: String = row.get(5)?;
    let modified: String = row.get(6)?;
    let status: String = row.get(7)?;
    let lint_status: String = row.get(8)?;
    Ok(PersistedCommand {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        script: row.get(3)?,
        elapsed_seconds: elapsed.max(0) as u64,
        created_at: parse_datetime(&created, 5)?,
        modified_at: parse_datetime(&modified, 6)?,
        status: parse_enum::<CommandStatus>(&status, 7)?,
        lint_status: parse_enum::<LintStatus>(&lint_status, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn empty_store_has_no_watermark() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.max_created_at().unwrap(), None);
        assert_eq!(db.count_commands().unwrap(), 0);
    }

    #[test]
    fn insert_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_command(&NewCommand::imported("echo hi", 5, at(1_700_000_000)))
            .unwrap();

        let cmd = db.require_command(id).unwrap();
        assert_eq!(cmd.script, "echo hi");
        assert_eq!(cmd.elapsed_seconds, 5);
        assert_eq!(cmd.created_at, at(1_700_000_000));
        assert_eq!(cmd.status, CommandStatus::Imported);
        assert_eq!(cmd.lint_status, LintStatus::Unavailable);
        assert!(cmd.title.is_empty());
    }

    #[test]
    fn max_created_at_tracks_latest() {
        let db = Database::open_in_memory().unwrap();
        db.insert_command(&NewCommand::imported("a", 0, at(2_000))).unwrap();
        db.insert_command(&NewCommand::imported("b", 0, at(10_000))).unwrap();
        db.insert_command(&NewCommand::imported("c", 0, at(3_000))).unwrap();
        assert_eq!(db.max_created_at().unwrap(), Some(at(10_000)));
    }

    #[test]
    fn script_exists_uses_normalized_hash() {
        let db = Database::open_in_memory().unwrap();
        db.insert_command(&NewCommand::imported("ls -la | wc -l", 0, at(1))).unwrap();
        assert!(db.script_exists("ls  -la|wc -l").unwrap());
        assert!(!db.script_exists("ls").unwrap());
    }

    #[test]
    fn update_overwrites_fields() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_command(&NewCommand::imported("ls", 0, at(1))).unwrap();
        let mut cmd = db.require_command(id).unwrap();
        cmd.title = "list".into();
        cmd.script = "ls -la".into();
        cmd.status = CommandStatus::Saved;
        cmd.lint_status = LintStatus::Ok;
        cmd.modified_at = at(50);
        db.update_command(&cmd).unwrap();

        assert_eq!(db.require_command(id).unwrap(), cmd);
        assert!(db.script_exists("ls -la").unwrap());
        assert!(!db.script_exists("ls").unwrap());
    }

    #[test]
    fn update_of_missing_row_fails() {
        let db = Database::open_in_memory().unwrap();
        let cmd = NewCommand::imported("ls", 0, at(1)).into_persisted(42);
        assert!(matches!(db.update_command(&cmd), Err(Error::CommandNotFound(42))));
        assert!(matches!(db.require_command(42), Err(Error::CommandNotFound(42))));
    }

    #[test]
    fn list_hides_deleted_unless_asked() {
        let db = Database::open_in_memory().unwrap();
        let keep = db.insert_command(&NewCommand::imported("ls", 0, at(1))).unwrap();
        let gone = db.insert_command(&NewCommand::imported("pwd", 0, at(2))).unwrap();
        let mut cmd = db.require_command(gone).unwrap();
        cmd.status = CommandStatus::Deleted;
        db.update_command(&cmd).unwrap();

        let visible = db.list_commands(&ListFilter::default()).unwrap();
        assert_eq!(visible.iter().map(|c| c.id).collect::<Vec<_>>(), vec![keep]);

        let all = db
            .list_commands(&ListFilter { status: None, include_deleted: true })
            .unwrap();
        assert_eq!(all.len(), 2);

        let deleted = db
            .list_commands(&ListFilter { status: Some(CommandStatus::Deleted), include_deleted: false })
            .unwrap();
        assert_eq!(deleted.iter().map(|c| c.id).collect::<Vec<_>>(), vec![gone]);
    }

    #[test]
    fn schema_rejects_unknown_status() {
        let db = Database::open_in_memory().unwrap();
        let result = db.conn.execute(
            "INSERT INTO command (script, script_hash, creation_datetime, modification_datetime, status) \
             VALUES ('ls', 'x', 'a', 'b', 'PENDING')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn file_database_is_shared_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("commands.db");
        let writer = Database::open(&path).unwrap();
        let reader = Database::open(&path).unwrap();

        writer.insert_command(&NewCommand::imported("ls", 0, at(7))).unwrap();
        assert_eq!(reader.max_created_at().unwrap(), Some(at(7)));
    }
}
