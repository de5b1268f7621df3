use anyhow::{bail, Context, Result};
use colored::*;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::Write;
use std::process::Command;

use crate::history::sanitize_command;

const FALLBACK_EDITOR: &str = "vi";

/// `$VISUAL`, then `$EDITOR`, then `vi`.
pub fn editor_command() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// Open `text` in `editor` and return what was saved. The editor string may
/// carry arguments (`code --wait`), so it goes through `sh -c`.
pub fn edit_text(editor: &str, text: &str) -> Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix("scb-")
        .suffix(".sh")
        .tempfile()
        .context("cannot create temporary file for editing")?;
    file.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.flush()?;

    tracing::debug!(editor, path = %file.path().display(), "launching editor");
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{} \"$1\"", editor))
        .arg("sh")
        .arg(file.path())
        .status()
        .with_context(|| format!("cannot start editor {:?}", editor))?;
    if !status.success() {
        bail!("editor {:?} exited with {}", editor, status);
    }

    fs::read_to_string(file.path()).context("cannot read edited file")
}

/// Edit `script` interactively. `None` when the result is empty or the same
/// script once sanitized.
pub fn edit_script(editor: &str, script: &str) -> Result<Option<String>> {
    let edited = sanitize_command(&edit_text(editor, script)?);
    if edited.is_empty() || edited == script {
        Ok(None)
    } else {
        Ok(Some(edited))
    }
}

/// Line diff with `-`/`+` markers, colored for the terminal.
pub fn diff_text(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);

    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let line = change.to_string_lossy();
        let line = line.trim_end_matches('\n');
        match change.tag() {
            ChangeTag::Delete => result.push_str(&format!("{}{}\n", "-".red(), line.red())),
            ChangeTag::Insert => result.push_str(&format!("{}{}\n", "+".green(), line.green())),
            ChangeTag::Equal => result.push_str(&format!(" {}\n", line)),
        }
    }
    result
}
