//! Partial-line buffering for incremental reads
//!
//! Raw bytes arrive in arbitrary chunks; only newline-terminated lines may be
//! released downstream. Whatever follows the final newline is an in-progress
//! line carried to the next read.

/// Accumulates raw bytes and yields only complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes (decoded as lossy UTF-8) and drain every
    /// complete line. Lines are returned without their trailing newline.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let decoded = String::from_utf8_lossy(bytes);
        self.pending.push_str(&decoded);
        self.drain_complete_lines()
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(newline_pos) = self.pending.find('\n') {
            let mut line = self.pending[..newline_pos].to_string();
            // Tolerate CRLF producers
            if line.ends_with('\r') {
                line.pop();
            }
            self.pending = self.pending[newline_pos + 1..].to_string();
            lines.push(line);
        }
        lines
    }

    /// Discard any buffered partial line (rotation, truncation, restart).
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Bytes currently held back as an in-progress line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
