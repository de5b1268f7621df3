use chrono::{DateTime, Utc};
use regex::Regex;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

use super::classifier::{Classifier, CommandSink, ImportOutcome, ImportStats};
use super::parser::{HistoryParser, RawCommand};
use super::scanner::LineScanner;
use crate::db::CommandStore;
use crate::error::{Error, Result};
use crate::lint::{lint_or_unavailable, ScriptLinter};
use crate::model::{LintStatus, NewCommand};

/// A pass stopped early. Commands written before the failure stay stored.
#[derive(Error, Debug)]
#[error("history import aborted: {error}")]
pub struct IngestAborted {
    pub stats: ImportStats,
    #[source]
    pub error: Error,
}

/// The decision function used by real passes: ignore patterns, duplicate
/// check by normalized script hash, optional lint, then insert.
pub struct StoreSink<'a> {
    store: &'a dyn CommandStore,
    linter: Option<&'a dyn ScriptLinter>,
    ignore_patterns: &'a [Regex],
}

impl<'a> StoreSink<'a> {
    pub fn new(
        store: &'a dyn CommandStore,
        linter: Option<&'a dyn ScriptLinter>,
        ignore_patterns: &'a [Regex],
    ) -> Self {
        Self {
            store,
            linter,
            ignore_patterns,
        }
    }
}

impl CommandSink for StoreSink<'_> {
    fn classify_or_store(&mut self, command: &RawCommand) -> Result<ImportOutcome> {
        if let Some(pattern) = self.ignore_patterns.iter().find(|re| re.is_match(&command.text)) {
            tracing::debug!(pattern = %pattern, "command filtered out");
            return Ok(ImportOutcome::FilteredOut);
        }
        if self.store.script_exists(&command.text)? {
            return Ok(ImportOutcome::AlreadyExists);
        }

        let mut record = NewCommand::imported(&command.text, command.elapsed_seconds, command.timestamp);
        record.lint_status = lint_or_unavailable(self.linter, &command.text);
        self.store.insert_command(&record)?;

        if record.lint_status == LintStatus::Error {
            Ok(ImportOutcome::Error)
        } else {
            Ok(ImportOutcome::New)
        }
    }
}

/// Scan → parse → classify over one source. Commands are classified and
/// written in source order; the first error ends the pass.
pub fn ingest_lines<R, S>(
    mut lines: LineScanner<R>,
    watermark: Option<DateTime<Utc>>,
    sink: &mut S,
) -> std::result::Result<ImportStats, IngestAborted>
where
    R: BufRead,
    S: CommandSink + ?Sized,
{
    let mut parser = HistoryParser::new();
    let mut classifier = Classifier::new(watermark);

    while let Some(line) = lines.next() {
        let line = line.map_err(|e| IngestAborted {
            stats: classifier.stats(),
            error: Error::Io(e),
        })?;
        if let Some(command) = parser.feed(&line) {
            classifier.classify(command, sink).map_err(|error| {
                tracing::debug!(line = lines.line_number(), error = %error, "command rejected by store");
                IngestAborted {
                    stats: classifier.stats(),
                    error,
                }
            })?;
        }
    }

    if let Some(command) = parser.finish() {
        classifier.classify(command, sink).map_err(|error| IngestAborted {
            stats: classifier.stats(),
            error,
        })?;
    }

    Ok(classifier.stats())
}

/// One full import pass of `history_path` into `store`, with the watermark
/// read once from the store before the first line is scanned.
pub fn run_import_pass(
    store: &dyn CommandStore,
    linter: Option<&dyn ScriptLinter>,
    ignore_patterns: &[Regex],
    history_path: &Path,
) -> std::result::Result<ImportStats, IngestAborted> {
    let aborted = |error| IngestAborted {
        stats: ImportStats::default(),
        error,
    };

    let watermark = store.max_created_at().map_err(aborted)?;
    let lines = LineScanner::open(history_path).map_err(aborted)?;

    tracing::debug!(
        history_file = %history_path.display(),
        watermark = ?watermark,
        "history import started"
    );

    let mut sink = StoreSink::new(store, linter, ignore_patterns);
    let result = ingest_lines(lines, watermark, &mut sink);

    match &result {
        Ok(stats) => tracing::info!(
            history_file = %history_path.display(),
            parsed = stats.parsed,
            imported = stats.imported,
            skipped = stats.skipped,
            filtered_out = stats.filtered_out,
            already_exists = stats.already_exists,
            error = stats.error,
            below_watermark = stats.below_watermark,
            "history import finished"
        ),
        Err(aborted) => tracing::error!(
            history_file = %history_path.display(),
            parsed = aborted.stats.parsed,
            imported = aborted.stats.imported,
            error = %aborted.error,
            "history import aborted"
        ),
    }
    result
}
