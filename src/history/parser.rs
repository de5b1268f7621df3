use chrono::{DateTime, Datelike, Utc};

const EXTENDED_PREFIX: &str = ": ";
// Years the store can keep as fixed-width RFC 3339 text.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// One command assembled from the history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub elapsed_seconds: u64,
    pub complete: bool,
}

impl RawCommand {
    /// Unix time zero: the source carried no usable timestamp.
    pub fn has_unknown_timestamp(&self) -> bool {
        self.timestamp == DateTime::<Utc>::UNIX_EPOCH
    }
}

#[derive(Debug)]
struct PendingCommand {
    timestamp: DateTime<Utc>,
    elapsed_seconds: u64,
    buffer: String,
}

impl PendingCommand {
    fn finish(self) -> RawCommand {
        RawCommand {
            timestamp: self.timestamp,
            text: sanitize_command(&self.buffer),
            elapsed_seconds: self.elapsed_seconds,
            complete: true,
        }
    }
}

#[derive(Debug, Default)]
enum ParserState {
    #[default]
    Idle,
    Building(PendingCommand),
}

/// Turns history lines into commands.
///
/// Feed lines in file order with [`HistoryParser::feed`]; a command is
/// returned once its last line has been seen. Call [`HistoryParser::finish`]
/// at end of input to flush a command still waiting for continuation lines.
#[derive(Debug, Default)]
pub struct HistoryParser {
    state: ParserState,
}

impl HistoryParser {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ParserState::Idle)
    }

    pub fn feed(&mut self, line: &str) -> Option<RawCommand> {
        let (mut pending, part) = match std::mem::take(&mut self.state) {
            ParserState::Building(pending) => (pending, line),
            ParserState::Idle => {
                if line.is_empty() {
                    return None;
                }
                let header = parse_header(line);
                let pending = PendingCommand {
                    timestamp: header.timestamp,
                    elapsed_seconds: header.elapsed_seconds,
                    buffer: String::new(),
                };
                (pending, header.command)
            }
        };

        match strip_continuation(part) {
            Some(head) => {
                pending.buffer.push_str(head);
                pending.buffer.push('\n');
                self.state = ParserState::Building(pending);
                None
            }
            None => {
                pending.buffer.push_str(part);
                Some(pending.finish())
            }
        }
    }

    /// End of input: a command still in progress is completed as is.
    pub fn finish(&mut self) -> Option<RawCommand> {
        match std::mem::take(&mut self.state) {
            ParserState::Building(pending) => Some(pending.finish()),
            ParserState::Idle => None,
        }
    }
}

struct Header<'a> {
    timestamp: DateTime<Utc>,
    elapsed_seconds: u64,
    command: &'a str,
}

/// Parse the first line of a command. `: <start>:<elapsed>;<command>` yields
/// the embedded timestamp; anything else, including a malformed extended
/// header, is a plain command stamped with the current time.
fn parse_header(line: &str) -> Header<'_> {
    if let Some(header) = parse_extended_header(line) {
        return header;
    }
    if line.starts_with(EXTENDED_PREFIX) {
        tracing::debug!(line, "extended history header not recognised, using plain format");
    }
    Header {
        timestamp: Utc::now(),
        elapsed_seconds: 0,
        command: line,
    }
}

fn parse_extended_header(line: &str) -> Option<Header<'_>> {
    let rest = line.strip_prefix(EXTENDED_PREFIX)?;
    let (fields, command) = rest.split_once(';')?;
    let (start, elapsed) = fields.split_once(':')?;
    if elapsed.contains(':') {
        return None;
    }
    let start: i64 = start.parse().ok()?;
    let elapsed_seconds: u64 = elapsed.parse().ok()?;
    let timestamp = DateTime::from_timestamp(start, 0)?;
    if !STORABLE_YEARS.contains(&timestamp.year()) {
        return None;
    }
    Some(Header {
        timestamp,
        elapsed_seconds,
        command,
    })
}

/// Returns the line without its continuation marker when it ends with an
/// unescaped backslash. An even run of trailing backslashes is literal.
fn strip_continuation(part: &str) -> Option<&str> {
    let trailing = part.bytes().rev().take_while(|b| *b == b'\\').count();
    if trailing % 2 == 0 {
        return None;
    }
    Some(part[..part.len() - 1].trim_end_matches([' ', '\t']))
}

/// Drop control characters (newlines and tabs excepted), blank leading and
/// trailing lines, and surrounding whitespace.
pub fn sanitize_command(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    cleaned.trim_matches('\n').trim().to_string()
}
