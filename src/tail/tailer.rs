//! Rotation-aware incremental file reader
//!
//! Tracks a byte offset and a file-identity token between polls so that each
//! call surfaces only bytes appended since the previous one. A changed
//! identity (log rotated to a fresh file) or a shrunken file (truncation)
//! resets the offset so no stale bytes ever mix with post-rotation content.

use crate::error::{Result, TermpulseError};
use crate::tail::LineBuffer;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Incrementally reads complete lines appended to a log file.
pub struct FileTailer {
    path: PathBuf,
    offset: u64,
    identity: Option<u64>,
    buffer: LineBuffer,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            identity: None,
            buffer: LineBuffer::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position the tailer at the current end of the file without emitting
    /// content. Called on pipeline start so historical lines are not replayed.
    /// A missing file is fine; the next read starts from byte zero.
    pub fn seek_to_end(&mut self) -> Result<()> {
        self.buffer.clear();
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                self.offset = meta.len();
                self.identity = Some(file_identity(&self.path, &meta));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.offset = 0;
                self.identity = None;
            }
            Err(e) => {
                return Err(TermpulseError::Io {
                    source: e,
                    context: format!("Failed to stat log file: {}", self.path.display()),
                });
            }
        }
        Ok(())
    }

    /// Read every complete line appended since the last call.
    ///
    /// Returns an empty batch when the file does not exist yet. Rotation and
    /// truncation reset the offset to zero and drop any buffered partial line
    /// before reading, so a batch never mixes old and new file content.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TermpulseError::Io {
                    source: e,
                    context: format!("Failed to stat log file: {}", self.path.display()),
                });
            }
        };

        let current_identity = file_identity(&self.path, &meta);
        match self.identity {
            Some(known) if known != current_identity => {
                tracing::info!(
                    path = %self.path.display(),
                    "Log file rotated, resetting read offset"
                );
                self.offset = 0;
                self.buffer.clear();
            }
            None => {}
            Some(_) if meta.len() < self.offset => {
                tracing::info!(
                    path = %self.path.display(),
                    old_offset = self.offset,
                    new_size = meta.len(),
                    "Log file truncated, resetting read offset"
                );
                self.offset = 0;
                self.buffer.clear();
            }
            Some(_) => {}
        }
        self.identity = Some(current_identity);

        if meta.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).map_err(|e| TermpulseError::Io {
            source: e,
            context: format!("Failed to open log file: {}", self.path.display()),
        })?;
        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| TermpulseError::Io {
                source: e,
                context: format!("Failed to seek log file: {}", self.path.display()),
            })?;

        let mut new_bytes = Vec::new();
        file.read_to_end(&mut new_bytes)
            .map_err(|e| TermpulseError::Io {
                source: e,
                context: format!("Failed to read log file: {}", self.path.display()),
            })?;

        // Offset advances by the bytes consumed whether or not they formed
        // complete lines; the remainder lives in the buffer.
        self.offset += new_bytes.len() as u64;

        Ok(self.buffer.push_bytes(&new_bytes))
    }

    /// Current read offset in bytes, for status reporting.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Stable identity token for the file at `path`.
///
/// On Unix this is the inode number, which survives appends and truncation
/// but changes when a rotation replaces the file.
#[cfg(unix)]
fn file_identity(_path: &Path, meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_identity(_path: &Path, meta: &std::fs::Metadata) -> u64 {
    use std::time::UNIX_EPOCH;
    meta.created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_missing_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let mut tailer = FileTailer::new(dir.path().join("absent.log"));
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn test_incremental_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let mut tailer = FileTailer::new(&path);

        append(&path, "one\ntwo\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["one", "two"]);

        // Nothing new
        assert!(tailer.read_new_lines().unwrap().is_empty());

        append(&path, "three\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["three"]);
    }

    #[test]
    fn test_partial_write_carried_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let mut tailer = FileTailer::new(&path);

        append(&path, "complete\nhalf");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["complete"]);

        append(&path, " done\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["half done"]);
    }

    #[test]
    fn test_seek_to_end_skips_backlog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        append(&path, "historic line\n");

        let mut tailer = FileTailer::new(&path);
        tailer.seek_to_end().unwrap();
        assert!(tailer.read_new_lines().unwrap().is_empty());

        append(&path, "fresh line\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["fresh line"]);
    }

    #[test]
    fn test_truncation_resets_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let mut tailer = FileTailer::new(&path);

        append(&path, "a long first generation line\n");
        tailer.read_new_lines().unwrap();

        // Truncate and rewrite with shorter content
        std::fs::write(&path, "reborn\n").unwrap();
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["reborn"]);
    }

    #[test]
    fn test_rotation_never_mixes_generations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let mut tailer = FileTailer::new(&path);

        append(&path, "old generation\npartial old");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["old generation"]);

        // Rotate: remove and recreate (new inode), smaller than old offset
        std::fs::remove_file(&path).unwrap();
        append(&path, "new\n");

        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines, vec!["new"]);
        // The buffered partial from the old generation must not leak
        assert!(lines.iter().all(|l| !l.contains("partial old")));
    }
}
