use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use crate::error::{Error, Result};
use crate::model::LintStatus;

const SHELLCHECK: &str = "shellcheck";

/// Checks a script and reports a verdict. `Err` means the checker itself
/// could not produce one.
pub trait ScriptLinter {
    fn check(&self, script: &str) -> Result<LintStatus>;
}

/// Lint status for `script`: `Unavailable` without a linter, `CheckFailed`
/// when the linter errors out.
pub fn lint_or_unavailable(linter: Option<&dyn ScriptLinter>, script: &str) -> LintStatus {
    let Some(linter) = linter else {
        return LintStatus::Unavailable;
    };
    match linter.check(script) {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(error = %err, "lint check failed");
            LintStatus::CheckFailed
        }
    }
}

/// `shellcheck` found on the `PATH`.
#[derive(Debug, Clone)]
pub struct ShellCheck {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Json1Report {
    #[serde(default)]
    comments: Vec<Json1Comment>,
}

#[derive(Debug, Deserialize)]
struct Json1Comment {
    level: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

impl ShellCheck {
    /// Locate `shellcheck`; `None` disables linting.
    pub fn detect() -> Option<Self> {
        match which::which(SHELLCHECK) {
            Ok(program) => {
                tracing::debug!(program = %program.display(), "shellcheck found");
                Some(Self { program })
            }
            Err(err) => {
                tracing::warn!(error = %err, "shellcheck command not found in PATH, linting disabled");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ScriptLinter for ShellCheck {
    fn check(&self, script: &str) -> Result<LintStatus> {
        let mut child = Command::new(&self.program)
            .args(["--shell=bash", "--format=json1", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Lint(format!("cannot run {}: {}", self.program.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Lint("cannot write to shellcheck stdin".to_string()))?;
        let input = script.to_string();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| Error::Lint("shellcheck stdin writer panicked".to_string()))??;

        // 0: clean, 1: comments reported, anything else: shellcheck failed.
        match output.status.code() {
            Some(0) | Some(1) => parse_json1(&String::from_utf8_lossy(&output.stdout)),
            code => Err(Error::Lint(format!(
                "shellcheck exited with {:?}: {}",
                code,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

fn parse_json1(stdout: &str) -> Result<LintStatus> {
    let report: Json1Report = serde_json::from_str(stdout)
        .map_err(|e| Error::Lint(format!("unreadable shellcheck output: {}", e)))?;

    for comment in &report.comments {
        tracing::debug!(level = %comment.level, code = comment.code, message = %comment.message, "shellcheck");
    }
    Ok(verdict(report.comments.iter().map(|c| c.level.as_str())))
}

fn verdict<'a>(levels: impl Iterator<Item = &'a str>) -> LintStatus {
    let mut status = LintStatus::Ok;
    for level in levels {
        match level {
            "error" => return LintStatus::Error,
            "warning" => status = LintStatus::Warning,
            _ => {}
        }
    }
    status
}
