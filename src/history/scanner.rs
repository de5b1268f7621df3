use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_HISTORY_FILE: &str = ".bash_history";

/// Pick the history file: the explicit path when given, otherwise
/// `~/.bash_history`.
pub fn resolve_history_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let home = dirs::home_dir().ok_or(Error::NoHomeDir)?;
    Ok(home.join(DEFAULT_HISTORY_FILE))
}

/// Lazy line reader over a history source.
///
/// Lines are split on `\n` and a trailing `\r` is dropped. Bytes that are
/// not valid UTF-8 (raw C1 controls, Latin-1 leftovers) are dropped, never
/// rejected.
pub struct LineScanner<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
}

impl LineScanner<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
        }
    }

    /// Number of lines produced so far (1-based number of the last line).
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> Iterator for LineScanner<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                self.line_number += 1;
                Some(Ok(self.buf.utf8_chunks().map(|chunk| chunk.valid()).collect()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
