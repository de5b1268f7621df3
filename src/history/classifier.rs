use chrono::{DateTime, Utc};

use super::parser::RawCommand;
use crate::error::Result;

/// What happened to one completed history command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    New,
    Skipped,
    FilteredOut,
    AlreadyExists,
    Error,
}

/// Result of handing one command to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Still waiting for continuation lines.
    InProgress,
    /// At or before the watermark; never reached the sink.
    BelowWatermark,
    Outcome(ImportOutcome),
}

/// Store-side decision: detect duplicates, lint, and write.
pub trait CommandSink {
    fn classify_or_store(&mut self, command: &RawCommand) -> Result<ImportOutcome>;
}

impl<F> CommandSink for F
where
    F: FnMut(&RawCommand) -> Result<ImportOutcome>,
{
    fn classify_or_store(&mut self, command: &RawCommand) -> Result<ImportOutcome> {
        self(command)
    }
}

/// Per-pass counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub parsed: usize,
    pub imported: usize,
    pub skipped: usize,
    pub filtered_out: usize,
    pub already_exists: usize,
    pub error: usize,
    /// Commands excluded by the watermark; not part of `parsed`.
    pub below_watermark: usize,
}

impl ImportStats {
    fn record(&mut self, outcome: ImportOutcome) {
        self.parsed += 1;
        match outcome {
            ImportOutcome::New => self.imported += 1,
            ImportOutcome::Skipped => self.skipped += 1,
            ImportOutcome::FilteredOut => self.filtered_out += 1,
            ImportOutcome::AlreadyExists => self.already_exists += 1,
            ImportOutcome::Error => self.error += 1,
        }
    }
}

/// Applies the empty-text and watermark gates and tallies what the sink
/// decides for everything else. Without a watermark (empty store) every
/// timestamp is eligible.
#[derive(Debug)]
pub struct Classifier {
    watermark: Option<DateTime<Utc>>,
    stats: ImportStats,
}

impl Classifier {
    pub fn new(watermark: Option<DateTime<Utc>>) -> Self {
        Self {
            watermark,
            stats: ImportStats::default(),
        }
    }

    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Classify one command. A sink error is counted under `error` and
    /// returned; counters gathered so far stay available via [`Self::stats`].
    pub fn classify<S>(&mut self, command: RawCommand, sink: &mut S) -> Result<Classification>
    where
        S: CommandSink + ?Sized,
    {
        if !command.complete {
            return Ok(Classification::InProgress);
        }
        if command.text.trim().is_empty() {
            self.stats.record(ImportOutcome::Skipped);
            return Ok(Classification::Outcome(ImportOutcome::Skipped));
        }
        if let Some(watermark) = self.watermark {
            if !command.has_unknown_timestamp() && command.timestamp <= watermark {
                tracing::debug!(
                    timestamp = %command.timestamp,
                    watermark = %watermark,
                    "skipping command at or before watermark"
                );
                self.stats.below_watermark += 1;
                return Ok(Classification::BelowWatermark);
            }
        }

        match sink.classify_or_store(&command) {
            Ok(outcome) => {
                self.stats.record(outcome);
                Ok(Classification::Outcome(outcome))
            }
            Err(err) => {
                self.stats.record(ImportOutcome::Error);
                Err(err)
            }
        }
    }
}
