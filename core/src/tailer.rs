//! Byte-offset tracking of append-only log files.
//!
//! Each watched path keeps the number of bytes already consumed plus every
//! line read so far. A change notification reads only the bytes past that
//! offset. An unterminated last line is consumed only once it already holds a
//! full punch record; anything shorter waits on disk for more bytes. A consumed
//! fragment is completed in place when the rest of it arrives, so it is never
//! reported twice.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use memchr::{memchr, memchr_iter, memrchr};
use thiserror::Error;

use crate::punch::parse_line;
use crate::text;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Consumption state of one watched file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailState {
    pub byte_offset: u64,
    pub lines: Vec<String>,
    /// Raw bytes of the last line when it was consumed without its newline.
    pending: Option<Vec<u8>>,
}

/// Result of one tail read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRead {
    /// Indices into the file's line history that were added by this read.
    pub new_lines: Range<usize>,
    /// Bytes consumed by this read.
    pub bytes: u64,
    /// The file was shorter than the tracked offset. Its history was dropped
    /// and re-read from the start.
    pub rotated: bool,
}

impl TailRead {
    pub fn is_empty(&self) -> bool {
        self.new_lines.is_empty() && !self.rotated
    }
}

#[derive(Debug)]
struct TrackedFile {
    path: PathBuf,
    state: TailState,
}

/// Tail state for every path seen so far, in first-seen order.
#[derive(Debug, Default)]
pub struct LogTailer {
    files: Vec<TrackedFile>,
}

impl LogTailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read whatever was appended to `path` since the last call.
    ///
    /// The first call for a path reads the whole file. On error the offset is
    /// left untouched so the next notification catches up.
    pub fn on_changed(&mut self, path: &Path) -> Result<TailRead, TailError> {
        let idx = match self.files.iter().position(|f| f.path == path) {
            Some(idx) => idx,
            None => {
                tracing::debug!(path = %path.display(), "Tracking new log file");
                self.files.push(TrackedFile {
                    path: path.to_path_buf(),
                    state: TailState::default(),
                });
                self.files.len() - 1
            }
        };

        let state = &mut self.files[idx].state;
        let err = |source| TailError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(err)?;
        let len = file.metadata().map_err(err)?.len();

        let mut rotated = false;
        let mut start = state.byte_offset;
        if len < start {
            tracing::warn!(
                path = %path.display(),
                offset = start,
                len,
                "Log file shrank, re-reading from the start"
            );
            rotated = true;
            start = 0;
        }

        let mut buf = Vec::with_capacity((len - start) as usize);
        if len > start {
            file.seek(SeekFrom::Start(start)).map_err(err)?;
            file.take(len - start).read_to_end(&mut buf).map_err(err)?;
        }

        if rotated {
            state.byte_offset = 0;
            state.lines.clear();
            state.pending = None;
        }

        let first_new = state.lines.len();
        let mut consumed = 0usize;
        let mut rest: &[u8] = &buf;

        // Finish a line whose first part was consumed by an earlier read.
        if !rest.is_empty()
            && let Some(mut fragment) = state.pending.take()
        {
            let (tail, terminated) = match memchr(b'\n', rest) {
                Some(end) => (&rest[..end], Some(end + 1)),
                None => (rest, None),
            };
            fragment.extend_from_slice(tail);
            if let Some(last) = state.lines.last_mut() {
                *last = decode_line(&fragment);
            }
            match terminated {
                Some(n) => {
                    consumed += n;
                    rest = &rest[n..];
                }
                None => {
                    consumed += rest.len();
                    rest = &[];
                    state.pending = Some(fragment);
                }
            }
        }

        let complete_len = match memrchr(b'\n', rest) {
            Some(last) => last + 1,
            None => 0,
        };

        let (complete, trailing) = rest.split_at(complete_len);
        let mut line_start = 0;
        for end in memchr_iter(b'\n', complete) {
            let raw = &complete[line_start..end];
            line_start = end + 1;
            let line = decode_line(raw);
            if line.is_empty() {
                continue;
            }
            state.lines.push(line);
        }
        consumed += complete_len;

        if !trailing.is_empty() {
            let line = decode_line(trailing);
            if parse_line(&line).is_some() {
                state.lines.push(line);
                state.pending = Some(trailing.to_vec());
                consumed += trailing.len();
            }
        }

        state.byte_offset += consumed as u64;

        tracing::debug!(
            path = %path.display(),
            bytes = consumed,
            lines = state.lines.len() - first_new,
            offset = state.byte_offset,
            "Tailed log file"
        );

        Ok(TailRead {
            new_lines: first_new..state.lines.len(),
            bytes: consumed as u64,
            rotated,
        })
    }

    pub fn state(&self, path: &Path) -> Option<&TailState> {
        self.files.iter().find(|f| f.path == path).map(|f| &f.state)
    }

    /// Lines of one file, by index range from a `TailRead`.
    pub fn lines(&self, path: &Path, range: Range<usize>) -> &[String] {
        match self.state(path) {
            Some(state) => state.lines.get(range).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Every accumulated line of every tracked file, file by file.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .flat_map(|f| f.state.lines.iter().map(String::as_str))
    }

    /// Tracked paths with their current byte offsets.
    pub fn offsets(&self) -> impl Iterator<Item = (&Path, u64)> {
        self.files
            .iter()
            .map(|f| (f.path.as_path(), f.state.byte_offset))
    }

    /// Forget every tracked file.
    pub fn clear(&mut self) {
        self.files.clear();
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    text::decode(raw).into_owned()
}
