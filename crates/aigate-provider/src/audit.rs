//! Per-request dispatch audit. Request/response metadata goes to the log;
//! body chunks land in a byte-bounded ring so a runaway stream cannot hold
//! the whole response in memory.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;

const DEFAULT_RING_BYTES: usize = 256 * 1024;

#[derive(Debug)]
pub struct RequestAudit {
    provider: &'static str,
    trace_id: String,
    ring: VecDeque<Bytes>,
    ring_bytes: usize,
    capacity: usize,
}

impl RequestAudit {
    pub fn new(provider: &'static str, trace_id: String) -> Self {
        Self {
            provider,
            trace_id,
            ring: VecDeque::new(),
            ring_bytes: 0,
            capacity: DEFAULT_RING_BYTES,
        }
    }

    pub fn record_request(
        &self,
        url: &str,
        method: &str,
        headers: &http::HeaderMap,
        body_len: usize,
        auth_label: &str,
    ) {
        debug!(
            event = "upstream.request",
            provider = self.provider,
            trace_id = %self.trace_id,
            url,
            method,
            header_count = headers.len(),
            body_len,
            auth_label,
        );
    }

    pub fn record_response(&self, status: u16, headers: &http::HeaderMap) {
        debug!(
            event = "upstream.response",
            provider = self.provider,
            trace_id = %self.trace_id,
            status,
            header_count = headers.len(),
        );
    }

    pub fn record_error(&self, error: &dyn std::fmt::Display) {
        debug!(
            event = "upstream.error",
            provider = self.provider,
            trace_id = %self.trace_id,
            error = %error,
        );
    }

    pub fn append_chunk(&mut self, chunk: &[u8]) {
        self.ring_bytes += chunk.len();
        self.ring.push_back(Bytes::copy_from_slice(chunk));
        while self.ring_bytes > self.capacity {
            match self.ring.pop_front() {
                Some(dropped) => self.ring_bytes -= dropped.len(),
                None => break,
            }
        }
    }

    pub fn captured_bytes(&self) -> usize {
        self.ring_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_stays_within_capacity() {
        let mut audit = RequestAudit::new("copilot", "trace".to_string());
        for _ in 0..600 {
            audit.append_chunk(&[0u8; 1024]);
        }
        assert!(audit.captured_bytes() <= DEFAULT_RING_BYTES + 1024);
    }
}
