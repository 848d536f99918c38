/// Longest unterminated tail kept while waiting for `\n`.
pub const MAX_PARTIAL: usize = 4096;

/// Accumulates raw bytes from a link and yields complete text lines.
///
/// Lines end at `\n`; a trailing `\r` is dropped and invalid UTF-8 is replaced
/// lossily. Blank lines are skipped. An unterminated tail longer than
/// [`MAX_PARTIAL`] is discarded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let tail = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(self.pending.len(), |pos| self.pending.len() - pos - 1);
        if tail > MAX_PARTIAL {
            tracing::warn!(bytes = tail, "discarding unterminated input from device");
            let keep = self.pending.len() - tail;
            self.pending.truncate(keep);
        }
    }

    /// Pop the next complete, non-blank line.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.trim_end_matches('\r').trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Bytes received after the last terminator.
    pub fn partial_len(&self) -> usize {
        self.pending.len()
    }
}
