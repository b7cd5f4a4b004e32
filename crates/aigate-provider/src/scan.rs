//! Incremental line splitting for upstream SSE bodies. The buffer caps at
//! 50 MiB: a single line larger than that aborts the stream instead of
//! growing without bound.

pub const MAX_LINE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("stream line exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,
}

#[derive(Debug, Default)]
pub struct LineScanner {
    buffer: Vec<u8>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk and returns every completed line, CR/LF stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ScanError> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            return Err(ScanError::LineTooLong);
        }
        Ok(lines)
    }

    /// Flushes a trailing line that never saw its newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
