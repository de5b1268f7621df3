//! Interactive command browser.
//!
//! Drawn on stderr in raw mode so that stdout only ever carries the script
//! the user picked with Enter (`eval "$(scb)"`).

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal,
};
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Once;
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

use crate::db::{Database, ListFilter};
use crate::editor;
use crate::error::Error;
use crate::history::ImportStats;
use crate::i18n::I18n;
use crate::lifecycle::{render_summary, CommandEdit, Lifecycle};
use crate::lint::ScriptLinter;
use crate::model::PersistedCommand;
use crate::search::CommandMatcher;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
// title + filter + blank + status + hint
const RESERVED_LINES: usize = 6;

/// Sent by the background import thread when its pass ends.
#[derive(Debug)]
pub enum ImportUpdate {
    Finished(ImportStats),
    Aborted { stats: ImportStats, message: String },
}

/// How the browser was left.
#[derive(Debug, PartialEq, Eq)]
pub enum BrowseExit {
    Quit,
    Print(String),
    /// Raw mode could not be enabled (no terminal).
    NotInteractive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Filter,
    ConfirmDelete(i64),
}

/// What a key press asks the browser to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    Print(String),
    Reload,
    Delete(i64),
    Bookmark(i64),
    Edit(i64),
    Compose,
}

/// Everything the browser shows, independent of the terminal.
struct BrowserState {
    matcher: CommandMatcher,
    commands: Vec<PersistedCommand>,
    visible: Vec<usize>,
    filter: String,
    cursor: usize,
    scroll: usize,
    /// Ids in the order they were selected.
    selected: Vec<i64>,
    mode: Mode,
    status: Option<String>,
}

impl BrowserState {
    fn new(commands: Vec<PersistedCommand>) -> Self {
        let mut state = Self {
            matcher: CommandMatcher::new(),
            commands: Vec::new(),
            visible: Vec::new(),
            filter: String::new(),
            cursor: 0,
            scroll: 0,
            selected: Vec::new(),
            mode: Mode::Normal,
            status: None,
        };
        state.set_commands(commands);
        state
    }

    /// Replace the data set, keeping the filter, the cursor when possible,
    /// and selections whose command is still listed.
    fn set_commands(&mut self, commands: Vec<PersistedCommand>) {
        self.commands = commands;
        let commands = &self.commands;
        self.selected.retain(|id| commands.iter().any(|c| c.id == *id));
        self.refilter();
    }

    fn refilter(&mut self) {
        self.visible = self.matcher.filter(&self.filter, &self.commands);
        if self.cursor >= self.visible.len() {
            self.cursor = self.visible.len().saturating_sub(1);
        }
    }

    fn current(&self) -> Option<&PersistedCommand> {
        self.visible.get(self.cursor).map(|&i| &self.commands[i])
    }

    fn command(&self, id: i64) -> Option<&PersistedCommand> {
        self.commands.iter().find(|c| c.id == id)
    }

    fn selected_commands(&self) -> Vec<PersistedCommand> {
        self.selected
            .iter()
            .filter_map(|id| self.command(*id).cloned())
            .collect()
    }

    fn toggle_current(&mut self) {
        let Some(id) = self.current().map(|c| c.id) else {
            return;
        };
        if let Some(pos) = self.selected.iter().position(|s| *s == id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(id);
        }
    }

    fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_down(&mut self) {
        if self.cursor + 1 < self.visible.len() {
            self.cursor += 1;
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c' | 'C' | 'd' | 'D')) {
            return Action::Quit;
        }
        if matches!(key.code, KeyCode::Char('\u{3}' | '\u{4}')) {
            return Action::Quit;
        }

        match self.mode {
            Mode::ConfirmDelete(id) => {
                self.mode = Mode::Normal;
                match key.code {
                    KeyCode::Char('y' | 'Y') => Action::Delete(id),
                    _ => Action::None,
                }
            }
            Mode::Filter => {
                match key.code {
                    KeyCode::Enter => self.mode = Mode::Normal,
                    KeyCode::Esc => {
                        self.filter.clear();
                        self.mode = Mode::Normal;
                        self.refilter();
                    }
                    KeyCode::Up => self.move_up(),
                    KeyCode::Down => self.move_down(),
                    KeyCode::Backspace => {
                        self.filter.pop();
                        self.cursor = 0;
                        self.refilter();
                    }
                    KeyCode::Char(c) => {
                        self.filter.push(c);
                        self.cursor = 0;
                        self.refilter();
                    }
                    _ => {}
                }
                Action::None
            }
            Mode::Normal => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    self.move_up();
                    Action::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.move_down();
                    Action::None
                }
                KeyCode::Char('/') => {
                    self.mode = Mode::Filter;
                    Action::None
                }
                KeyCode::Char(' ') => {
                    self.toggle_current();
                    Action::None
                }
                KeyCode::Enter => self
                    .current()
                    .map(|c| Action::Print(c.script.clone()))
                    .unwrap_or(Action::None),
                KeyCode::Char('d') => {
                    if let Some(id) = self.current().map(|c| c.id) {
                        self.mode = Mode::ConfirmDelete(id);
                    }
                    Action::None
                }
                KeyCode::Char('b') => self.current().map(|c| Action::Bookmark(c.id)).unwrap_or(Action::None),
                KeyCode::Char('e') => self.current().map(|c| Action::Edit(c.id)).unwrap_or(Action::None),
                KeyCode::Char('c') => Action::Compose,
                KeyCode::Char('r') => Action::Reload,
                KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
                _ => Action::None,
            },
        }
    }

    /// Keep the cursor inside a window of `height` rows.
    fn scroll_into_view(&mut self, height: usize) {
        let height = height.max(1);
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + height {
            self.scroll = self.cursor + 1 - height;
        }
    }
}

/// Restores the terminal when dropped.
struct TerminalGuard {
    alt_screen: bool,
    active: bool,
}

impl TerminalGuard {
    fn enter(alt_screen: bool) -> io::Result<Self> {
        let mut guard = Self {
            alt_screen,
            active: false,
        };
        guard.resume()?;
        Ok(guard)
    }

    fn resume(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut err = io::stderr();
        if self.alt_screen {
            write!(err, "\x1b[?1049h")?;
        }
        // No line wrap, hidden cursor
        write!(err, "\x1b[?7l\x1b[?25l")?;
        err.flush()?;
        self.active = true;
        Ok(())
    }

    fn suspend(&mut self) -> io::Result<()> {
        self.active = false;
        restore_terminal(self.alt_screen)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = restore_terminal(self.alt_screen);
        }
    }
}

fn restore_terminal(alt_screen: bool) -> io::Result<()> {
    let mut err = io::stderr();
    write!(err, "\x1b[2J\x1b[H")?;
    if alt_screen {
        write!(err, "\x1b[?1049l")?;
    }
    write!(err, "\x1b[?7h\x1b[?25h")?;
    err.flush()?;
    terminal::disable_raw_mode()
}

fn install_ctrlc_handler(alt_screen: bool) {
    static INIT_CTRL_C: Once = Once::new();
    INIT_CTRL_C.call_once(|| {
        let result = ctrlc::set_handler(move || {
            let _ = restore_terminal(alt_screen);
            std::process::exit(130);
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "cannot install Ctrl-C handler");
        }
    });
}

pub struct Browser<'a> {
    db: &'a Database,
    linter: Option<&'a dyn ScriptLinter>,
    i18n: &'a I18n,
    summary_length: usize,
    alt_screen: bool,
    imports: Option<Receiver<ImportUpdate>>,
}

impl<'a> Browser<'a> {
    pub fn new(
        db: &'a Database,
        linter: Option<&'a dyn ScriptLinter>,
        i18n: &'a I18n,
        summary_length: usize,
        alt_screen: bool,
    ) -> Self {
        Self {
            db,
            linter,
            i18n,
            summary_length,
            alt_screen,
            imports: None,
        }
    }

    /// Reload automatically when the background import reports back.
    pub fn with_import_updates(mut self, updates: Receiver<ImportUpdate>) -> Self {
        self.imports = Some(updates);
        self
    }

    pub fn run(mut self) -> Result<BrowseExit> {
        let mut state = BrowserState::new(self.load()?);
        if self.imports.is_some() {
            state.status = Some(self.i18n.t("import_running"));
        }

        install_ctrlc_handler(self.alt_screen);
        let mut terminal = match TerminalGuard::enter(self.alt_screen) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::warn!(error = %err, "raw mode unavailable");
                eprintln!("{}", self.i18n.t_format("warning_interactive_failed", &[&err.to_string()]));
                return Ok(BrowseExit::NotInteractive);
            }
        };

        let mut dirty = true;
        loop {
            if self.poll_import(&mut state)? {
                dirty = true;
            }
            if dirty {
                self.render(&mut state).context("cannot draw browser")?;
                dirty = false;
            }

            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                dirty = true;
                continue;
            };
            dirty = true;
            state.status = None;

            match state.handle_key(key) {
                Action::None => {}
                Action::Quit => return Ok(BrowseExit::Quit),
                Action::Print(script) => return Ok(BrowseExit::Print(script)),
                Action::Reload => state.set_commands(self.load()?),
                Action::Delete(id) => {
                    self.apply(&mut state, id, "deleted_command", |lc, cmd| lc.delete(cmd))?
                }
                Action::Bookmark(id) => {
                    self.apply(&mut state, id, "bookmarked_command", |lc, cmd| lc.bookmark(cmd))?
                }
                Action::Edit(id) => self.edit(&mut state, &mut terminal, id)?,
                Action::Compose => self.compose(&mut state)?,
            }
        }
    }

    fn load(&self) -> Result<Vec<PersistedCommand>> {
        self.db
            .list_commands(&ListFilter::default())
            .context("cannot load commands")
    }

    /// Returns true when the screen needs a redraw.
    fn poll_import(&mut self, state: &mut BrowserState) -> Result<bool> {
        let Some(updates) = &self.imports else {
            return Ok(false);
        };
        let update = match updates.try_recv() {
            Ok(update) => update,
            Err(TryRecvError::Empty) => return Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.imports = None;
                return Ok(false);
            }
        };

        match update {
            ImportUpdate::Finished(stats) => {
                state.status = Some(self.i18n.t_format("import_finished", &[&stats.imported.to_string()]));
            }
            ImportUpdate::Aborted { stats, message } => {
                tracing::warn!(parsed = stats.parsed, error = %message, "background import aborted");
                state.status = Some(self.i18n.t("import_failed"));
            }
        }
        state.set_commands(self.load()?);
        Ok(true)
    }

    fn apply<F>(&self, state: &mut BrowserState, id: i64, done_key: &str, operation: F) -> Result<()>
    where
        F: FnOnce(&Lifecycle<'_>, &mut PersistedCommand) -> crate::error::Result<()>,
    {
        let Some(mut command) = state.command(id).cloned() else {
            return Ok(());
        };
        let lifecycle = Lifecycle::new(self.db, self.linter);
        match operation(&lifecycle, &mut command) {
            Ok(()) => {
                state.status = Some(self.i18n.t_format(done_key, &[&id.to_string()]));
                state.set_commands(self.load()?);
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "browser operation failed");
                state.status = Some(err.to_string());
            }
        }
        Ok(())
    }

    fn compose(&self, state: &mut BrowserState) -> Result<()> {
        let sources = state.selected_commands();
        let lifecycle = Lifecycle::new(self.db, self.linter);
        match lifecycle.compose(&sources) {
            Ok(composed) => {
                state.selected.clear();
                state.status = Some(self.i18n.t_format(
                    "composed_command",
                    &[&composed.id.to_string(), &sources.len().to_string()],
                ));
                state.set_commands(self.load()?);
            }
            Err(Error::EmptySelection) => state.status = Some(self.i18n.t("tui_selection_hint")),
            Err(err) => state.status = Some(err.to_string()),
        }
        Ok(())
    }

    fn edit(&self, state: &mut BrowserState, terminal: &mut TerminalGuard, id: i64) -> Result<()> {
        let Some(script) = state.command(id).map(|c| c.script.clone()) else {
            return Ok(());
        };

        terminal.suspend()?;
        let edited = editor::edit_script(&editor::editor_command(), &script);
        terminal.resume()?;

        match edited {
            Ok(Some(script)) => {
                let edit = CommandEdit {
                    script: Some(script),
                    ..Default::default()
                };
                self.apply(state, id, "edited_command", |lc, cmd| lc.edit(cmd, edit))
            }
            Ok(None) => {
                state.status = Some(self.i18n.t_format("edit_unchanged", &[&id.to_string()]));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "editor failed");
                state.status = Some(format!("{:#}", err));
                Ok(())
            }
        }
    }

    fn render(&self, state: &mut BrowserState) -> io::Result<()> {
        let (cols, rows) = terminal::size().unwrap_or((80, 24));
        let cols = cols as usize;
        let viewport = (rows as usize).saturating_sub(RESERVED_LINES).max(3);
        state.scroll_into_view(viewport);

        let mut out = io::stderr().lock();
        write!(out, "\x1b[2J\x1b[H")?;
        write!(
            out,
            "\x1b[1m{}\x1b[0m\r\n",
            self.i18n.t_format(
                "tui_title",
                &[&state.commands.len().to_string(), &state.selected.len().to_string()]
            )
        )?;
        let cursor_mark = if state.mode == Mode::Filter { "_" } else { "" };
        write!(out, "{}: {}{}\r\n\r\n", self.i18n.t("tui_filter"), state.filter, cursor_mark)?;

        if state.visible.is_empty() {
            write!(out, "\x1b[31m{}\x1b[0m\r\n", self.i18n.t("tui_no_matches"))?;
        } else {
            let end = (state.scroll + viewport).min(state.visible.len());
            for row in state.scroll..end {
                let command = &state.commands[state.visible[row]];
                let mark = if state.selected.contains(&command.id) { "✓" } else { " " };
                let prefix = format!(
                    "{} #{:<5} {:<10} {:<12} ",
                    mark,
                    command.id,
                    command.status.as_str(),
                    command.lint_status.as_str()
                );
                let summary = render_summary(command, cols.saturating_sub(prefix.width() + 1));
                if row == state.cursor {
                    write!(out, "\x1b[44;37m{}{}\x1b[0m\x1b[K\r\n", prefix, summary)?;
                } else {
                    write!(out, "{}{}\x1b[K\r\n", prefix, summary)?;
                }
            }
        }

        write!(out, "\r\n")?;
        match state.mode {
            Mode::ConfirmDelete(id) => {
                let summary = state
                    .command(id)
                    .map(|c| render_summary(c, self.summary_length))
                    .unwrap_or_default();
                write!(
                    out,
                    "\x1b[33m{}\x1b[0m\r\n",
                    self.i18n.t_format("tui_confirm_delete", &[&summary])
                )?;
            }
            _ => {
                if let Some(status) = &state.status {
                    write!(out, "\x1b[32m{}\x1b[0m\r\n", status)?;
                } else {
                    write!(out, "\r\n")?;
                }
            }
        }
        let hint = if state.mode == Mode::Filter {
            self.i18n.t("tui_filter_hint")
        } else {
            self.i18n.t("tui_hint")
        };
        write!(out, "\x1b[90m{}\x1b[0m", hint)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewCommand;
    use chrono::DateTime;

    fn commands(scripts: &[&str]) -> Vec<PersistedCommand> {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        scripts
            .iter()
            .enumerate()
            .map(|(i, s)| NewCommand::imported(s, 0, ts).into_persisted(i as i64 + 1))
            .collect()
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(state: &mut BrowserState, text: &str) {
        for c in text.chars() {
            state.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut state = BrowserState::new(commands(&["ls", "pwd", "whoami"]));
        state.handle_key(key(KeyCode::Char('k')));
        assert_eq!(state.cursor, 0);
        for _ in 0..5 {
            state.handle_key(key(KeyCode::Char('j')));
        }
        assert_eq!(state.cursor, 2);
        assert_eq!(
            state.handle_key(key(KeyCode::Enter)),
            Action::Print("whoami".to_string())
        );
    }

    #[test]
    fn filter_mode_captures_letters() {
        let mut state = BrowserState::new(commands(&["ls -la", "git status", "git diff"]));
        state.handle_key(key(KeyCode::Char('/')));
        type_text(&mut state, "diff");
        assert_eq!(state.filter, "diff");
        assert_eq!(state.visible, vec![2]);
        assert_eq!(state.current().map(|c| c.id), Some(3));

        state.handle_key(key(KeyCode::Enter));
        assert_eq!(state.mode, Mode::Normal);
        assert_eq!(state.filter, "diff");

        state.handle_key(key(KeyCode::Char('/')));
        state.handle_key(key(KeyCode::Esc));
        assert!(state.filter.is_empty());
        assert_eq!(state.visible.len(), 3);
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut state = BrowserState::new(commands(&["rm -rf target"]));
        assert_eq!(state.handle_key(key(KeyCode::Char('d'))), Action::None);
        assert_eq!(state.mode, Mode::ConfirmDelete(1));
        assert_eq!(state.handle_key(key(KeyCode::Char('n'))), Action::None);
        assert_eq!(state.mode, Mode::Normal);

        state.handle_key(key(KeyCode::Char('d')));
        assert_eq!(state.handle_key(key(KeyCode::Char('y'))), Action::Delete(1));
    }

    #[test]
    fn selection_keeps_order_and_survives_reload() {
        let mut state = BrowserState::new(commands(&["ls", "pwd", "whoami"]));
        state.handle_key(key(KeyCode::Char('j')));
        state.handle_key(key(KeyCode::Char('j')));
        state.handle_key(key(KeyCode::Char(' ')));
        state.handle_key(key(KeyCode::Char('k')));
        state.handle_key(key(KeyCode::Char('k')));
        state.handle_key(key(KeyCode::Char(' ')));
        let picked: Vec<_> = state.selected_commands().into_iter().map(|c| c.script).collect();
        assert_eq!(picked, vec!["whoami", "ls"]);

        let mut reloaded = commands(&["ls", "pwd", "whoami"]);
        reloaded.retain(|c| c.id != 3);
        state.set_commands(reloaded);
        assert_eq!(state.selected, vec![1]);

        state.handle_key(key(KeyCode::Char(' ')));
        assert!(state.selected.is_empty());
    }

    #[test]
    fn quit_keys() {
        let mut state = BrowserState::new(commands(&["ls"]));
        assert_eq!(state.handle_key(key(KeyCode::Esc)), Action::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        state.handle_key(key(KeyCode::Char('/')));
        assert_eq!(state.handle_key(ctrl_c), Action::Quit);
    }

    #[test]
    fn empty_list_has_no_current_command() {
        let mut state = BrowserState::new(Vec::new());
        assert_eq!(state.handle_key(key(KeyCode::Enter)), Action::None);
        assert_eq!(state.handle_key(key(KeyCode::Char('b'))), Action::None);
        assert_eq!(state.handle_key(key(KeyCode::Char('c'))), Action::Compose);
    }

    #[test]
    fn scrolling_follows_cursor() {
        let mut state = BrowserState::new(commands(&["a", "b", "c", "d", "e"]));
        state.cursor = 4;
        state.scroll_into_view(2);
        assert_eq!(state.scroll, 3);
        state.cursor = 1;
        state.scroll_into_view(2);
        assert_eq!(state.scroll, 1);
    }
}
