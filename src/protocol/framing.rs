//! Line framing for the inbound byte stream
//!
//! TCP chunks do not line up with protocol lines, so text is accumulated and
//! only complete lines are handed to the parser. Lines end with LF; a CR right
//! before it is stripped, CRs elsewhere are kept (the revised GPU reply uses
//! them as list separators).

use tracing::warn;

/// Longest partial line kept while waiting for its terminator
pub const MAX_PARTIAL_LINE: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        if self.pending.len() > MAX_PARTIAL_LINE {
            warn!(
                len = self.pending.len(),
                "Discarding oversized partial line from DSP"
            );
            self.pending.clear();
        }

        lines
    }

    /// Text received after the last terminator
    #[cfg(test)]
    pub fn partial(&self) -> &str {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
