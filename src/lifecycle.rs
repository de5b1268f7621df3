//! Status transitions of stored commands.
//!
//! ```text
//! Imported ──► Bookmarked ◄──► Saved
//!    │              │            │
//!    └──────────────┴────────────┴──► Deleted
//! any ──► Obsolete | Archived
//! ```
//!
//! Every operation writes through the store and is all-or-nothing: when the
//! write fails the command is restored to exactly what it was before.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::db::CommandStore;
use crate::error::{Error, Result};
use crate::lint::{lint_or_unavailable, ScriptLinter};
use crate::model::{self, CommandStatus, NewCommand, PersistedCommand};

const ELLIPSIS: char = '…';

pub fn can_transition(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;
    match (from, to) {
        (Deleted, Obsolete | Archived) => true,
        (Deleted, _) => false,
        (_, Deleted) => true,
        (from, Obsolete | Archived) => from != to,
        (Imported, Bookmarked | Saved) => true,
        (Bookmarked, Saved) | (Saved, Bookmarked) | (Saved, Saved) => true,
        _ => false,
    }
}

/// User edits; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub script: Option<String>,
}

impl CommandEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.script.is_none()
    }
}

pub struct Lifecycle<'a> {
    store: &'a dyn CommandStore,
    linter: Option<&'a dyn ScriptLinter>,
}

impl<'a> Lifecycle<'a> {
    pub fn new(store: &'a dyn CommandStore, linter: Option<&'a dyn ScriptLinter>) -> Self {
        Self { store, linter }
    }

    /// Soft delete.
    pub fn delete(&self, command: &mut PersistedCommand) -> Result<()> {
        self.transition(command, CommandStatus::Deleted)
    }

    pub fn bookmark(&self, command: &mut PersistedCommand) -> Result<()> {
        self.transition(command, CommandStatus::Bookmarked)
    }

    pub fn archive(&self, command: &mut PersistedCommand) -> Result<()> {
        self.transition(command, CommandStatus::Archived)
    }

    pub fn mark_obsolete(&self, command: &mut PersistedCommand) -> Result<()> {
        self.transition(command, CommandStatus::Obsolete)
    }

    pub fn transition(&self, command: &mut PersistedCommand, to: CommandStatus) -> Result<()> {
        ensure_transition(command, to)?;
        self.write(command, |cmd| cmd.status = to)
    }

    /// Apply user edits and mark the command `Saved`. A changed script is
    /// sanitized and linted again.
    pub fn edit(&self, command: &mut PersistedCommand, edit: CommandEdit) -> Result<()> {
        ensure_transition(command, CommandStatus::Saved)?;

        let script = edit
            .script
            .map(|s| crate::history::sanitize_command(&s))
            .filter(|s| !s.is_empty() && *s != command.script);
        let lint_status = script.as_deref().map(|s| lint_or_unavailable(self.linter, s));

        self.write(command, |cmd| {
            if let Some(title) = edit.title {
                cmd.title = title.trim().to_string();
            }
            if let Some(description) = edit.description {
                cmd.description = description.trim().to_string();
            }
            if let Some(script) = script {
                cmd.script = script;
            }
            if let Some(lint_status) = lint_status {
                cmd.lint_status = lint_status;
            }
            cmd.status = CommandStatus::Saved;
        })
    }

    /// Run the linter again and store the verdict.
    pub fn relint(&self, command: &mut PersistedCommand) -> Result<()> {
        let lint_status = lint_or_unavailable(self.linter, &command.script);
        self.write(command, |cmd| cmd.lint_status = lint_status)
    }

    /// Join the scripts of `commands`, in the given order, into a new
    /// bookmarked command. The inputs are left as they are.
    pub fn compose(&self, commands: &[PersistedCommand]) -> Result<PersistedCommand> {
        if commands.is_empty() {
            return Err(Error::EmptySelection);
        }

        let script = compose_script(commands);
        let now = model::now();
        let record = NewCommand {
            title: String::new(),
            description: String::new(),
            lint_status: lint_or_unavailable(self.linter, &script),
            script,
            elapsed_seconds: 0,
            created_at: now,
            modified_at: now,
            status: CommandStatus::Bookmarked,
        };
        let id = self.store.insert_command(&record)?;
        tracing::debug!(id, sources = commands.len(), "composed command");
        Ok(record.into_persisted(id))
    }

    fn write<F>(&self, command: &mut PersistedCommand, change: F) -> Result<()>
    where
        F: FnOnce(&mut PersistedCommand),
    {
        let before = command.clone();
        change(command);
        command.modified_at = model::now();

        if let Err(err) = self.store.update_command(command) {
            tracing::error!(id = command.id, error = %err, "command update failed, reverting");
            *command = before;
            return Err(err);
        }
        Ok(())
    }
}

fn ensure_transition(command: &PersistedCommand, to: CommandStatus) -> Result<()> {
    if can_transition(command.status, to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            id: command.id,
            from: command.status,
            to,
        })
    }
}

/// Scripts joined by newlines, in selection order.
pub fn compose_script(commands: &[PersistedCommand]) -> String {
    commands
        .iter()
        .map(|c| c.script.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line description of a command for prompts: the title when set,
/// otherwise the script, whitespace collapsed, cut to `max_width` columns.
pub fn render_summary(command: &PersistedCommand, max_width: usize) -> String {
    let source = if command.title.trim().is_empty() {
        &command.script
    } else {
        &command.title
    };
    let single_line = source.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_to_width(&single_line, max_width)
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let room = max_width - 1;
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > room {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::LintStatus;
    use chrono::{DateTime, Utc};
    use std::cell::{Cell, RefCell};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn stored(db: &Database, script: &str) -> PersistedCommand {
        let id = db.insert_command(&NewCommand::imported(script, 0, at(100))).unwrap();
        db.require_command(id).unwrap()
    }

    /// Store that rejects every write and records how many were attempted.
    #[derive(Default)]
    struct RejectingStore {
        writes: Cell<usize>,
    }

    impl CommandStore for RejectingStore {
        fn max_created_at(&self) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }
        fn script_exists(&self, _script: &str) -> Result<bool> {
            Ok(false)
        }
        fn insert_command(&self, _command: &NewCommand) -> Result<i64> {
            self.writes.set(self.writes.get() + 1);
            Err(Error::Persistence(rusqlite::Error::InvalidQuery))
        }
        fn update_command(&self, _command: &PersistedCommand) -> Result<()> {
            self.writes.set(self.writes.get() + 1);
            Err(Error::Persistence(rusqlite::Error::InvalidQuery))
        }
    }

    struct CountingLinter {
        verdict: LintStatus,
        scripts: RefCell<Vec<String>>,
    }

    impl ScriptLinter for CountingLinter {
        fn check(&self, script: &str) -> Result<LintStatus> {
            self.scripts.borrow_mut().push(script.to_string());
            Ok(self.verdict)
        }
    }

    #[test]
    fn transition_table() {
        use CommandStatus::*;
        assert!(can_transition(Imported, Bookmarked));
        assert!(can_transition(Imported, Saved));
        assert!(can_transition(Imported, Deleted));
        assert!(can_transition(Bookmarked, Saved));
        assert!(can_transition(Saved, Bookmarked));
        assert!(can_transition(Archived, Deleted));
        assert!(can_transition(Deleted, Archived));
        for from in CommandStatus::ALL {
            assert!(!can_transition(from, Imported), "{from} -> IMPORTED");
            if from != Obsolete {
                assert!(can_transition(from, Obsolete), "{from} -> OBSOLETE");
            }
        }
        assert!(!can_transition(Deleted, Deleted));
        assert!(!can_transition(Deleted, Bookmarked));
        assert!(!can_transition(Bookmarked, Bookmarked));
        assert!(!can_transition(Archived, Bookmarked));
    }

    #[test]
    fn delete_marks_command_deleted() {
        let db = Database::open_in_memory().unwrap();
        let mut cmd = stored(&db, "rm -rf build");
        let lifecycle = Lifecycle::new(&db, None);

        lifecycle.delete(&mut cmd).unwrap();
        assert_eq!(cmd.status, CommandStatus::Deleted);
        assert_eq!(db.require_command(cmd.id).unwrap().status, CommandStatus::Deleted);
        assert!(cmd.modified_at > at(100));
    }

    #[test]
    fn failed_delete_restores_original() {
        let db = Database::open_in_memory().unwrap();
        let mut cmd = stored(&db, "ls");
        cmd.status = CommandStatus::Bookmarked;
        let original = cmd.clone();

        let store = RejectingStore::default();
        let lifecycle = Lifecycle::new(&store, None);
        let err = lifecycle.delete(&mut cmd).unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(cmd, original);
        assert_eq!(store.writes.get(), 1);
    }

    #[test]
    fn deleting_twice_is_rejected_without_write() {
        let store = RejectingStore::default();
        let mut cmd = NewCommand::imported("ls", 0, at(1)).into_persisted(1);
        cmd.status = CommandStatus::Deleted;
        let err = Lifecycle::new(&store, None).delete(&mut cmd).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(store.writes.get(), 0);
    }

    #[test]
    fn bookmark_and_edit_toggle_status() {
        let db = Database::open_in_memory().unwrap();
        let mut cmd = stored(&db, "cargo test");
        let lifecycle = Lifecycle::new(&db, None);

        lifecycle.bookmark(&mut cmd).unwrap();
        assert_eq!(cmd.status, CommandStatus::Bookmarked);

        lifecycle
            .edit(
                &mut cmd,
                CommandEdit {
                    title: Some("  run tests ".into()),
                    description: Some("whole workspace".into()),
                    script: None,
                },
            )
            .unwrap();
        assert_eq!(cmd.status, CommandStatus::Saved);
        assert_eq!(cmd.title, "run tests");

        lifecycle.bookmark(&mut cmd).unwrap();
        let reloaded = db.require_command(cmd.id).unwrap();
        assert_eq!(reloaded.status, CommandStatus::Bookmarked);
        assert_eq!(reloaded.description, "whole workspace");
    }

    #[test]
    fn edited_script_is_sanitized_and_relinted() {
        let db = Database::open_in_memory().unwrap();
        let mut cmd = stored(&db, "echo $x");
        let linter = CountingLinter {
            verdict: LintStatus::Ok,
            scripts: RefCell::new(Vec::new()),
        };
        let lifecycle = Lifecycle::new(&db, Some(&linter));

        lifecycle
            .edit(
                &mut cmd,
                CommandEdit {
                    script: Some("\n echo \"$x\"\u{7}\n".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cmd.script, "echo \"$x\"");
        assert_eq!(cmd.lint_status, LintStatus::Ok);
        assert_eq!(linter.scripts.borrow().as_slice(), ["echo \"$x\"".to_string()]);
        assert!(db.script_exists("echo \"$x\"").unwrap());

        lifecycle
            .edit(
                &mut cmd,
                CommandEdit {
                    script: Some("echo \"$x\"".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(linter.scripts.borrow().len(), 1);
    }

    #[test]
    fn failed_edit_restores_everything() {
        let mut cmd = NewCommand::imported("ls", 0, at(1)).into_persisted(9);
        let original = cmd.clone();
        let store = RejectingStore::default();
        let result = Lifecycle::new(&store, None).edit(
            &mut cmd,
            CommandEdit {
                title: Some("list".into()),
                script: Some("ls -la".into()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(cmd, original);
    }

    #[test]
    fn compose_joins_scripts_in_selection_order() {
        let db = Database::open_in_memory().unwrap();
        let a = stored(&db, "ls");
        let b = stored(&db, "pwd");
        let lifecycle = Lifecycle::new(&db, None);

        let composed = lifecycle.compose(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(composed.script, "ls\npwd");
        assert_eq!(composed.status, CommandStatus::Bookmarked);
        assert!(composed.title.is_empty() && composed.description.is_empty());
        assert_eq!(db.require_command(composed.id).unwrap(), composed);

        assert_eq!(db.require_command(a.id).unwrap(), a);
        assert_eq!(db.require_command(b.id).unwrap(), b);

        let reversed = lifecycle.compose(&[b, a]).unwrap();
        assert_eq!(reversed.script, "pwd\nls");
    }

    #[test]
    fn compose_nothing_fails_without_write() {
        let store = RejectingStore::default();
        let err = Lifecycle::new(&store, None).compose(&[]).unwrap_err();
        assert!(matches!(err, Error::EmptySelection));
        assert_eq!(store.writes.get(), 0);
    }

    #[test]
    fn summary_prefers_title_and_stays_on_one_line() {
        let mut cmd = NewCommand::imported("docker run \\\n  --rm\talpine", 0, at(1)).into_persisted(1);
        assert_eq!(render_summary(&cmd, 80), "docker run \\ --rm alpine");
        cmd.title = "Run alpine".into();
        assert_eq!(render_summary(&cmd, 80), "Run alpine");
    }

    #[test]
    fn summary_is_bounded() {
        let cmd = NewCommand::imported("echo 0123456789", 0, at(1)).into_persisted(1);
        assert_eq!(render_summary(&cmd, 8), "echo 01…");
        assert_eq!(render_summary(&cmd, 15), "echo 0123456789");
        assert_eq!(render_summary(&cmd, 0), "");
        assert_eq!(render_summary(&cmd, 1), "…");

        let wide = NewCommand::imported("echo 日本語", 0, at(1)).into_persisted(2);
        let summary = render_summary(&wide, 8);
        assert!(summary.width() <= 8);
        assert!(summary.ends_with(ELLIPSIS));
    }
}
