//! Buffer management for send and receive queues
//!
//! Sockets are non-blocking, so neither direction can assume a whole line moves
//! at once. The send queue holds bytes the socket has not accepted yet; the
//! receive queue holds the unterminated tail of the last read until the rest of
//! the line arrives.

use std::collections::VecDeque;

/// Send queue - outgoing bytes with a size limit
#[derive(Debug)]
pub struct SendQueue {
    /// Bytes waiting for the socket
    buffer: VecDeque<u8>,
    /// Maximum size in bytes
    max_size: usize,
    /// Number of lines dropped due to buffer overflow
    dropped_messages: u64,
}

impl SendQueue {
    /// Create a new send queue with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            max_size,
            dropped_messages: 0,
        }
    }

    /// Queue one protocol line, terminated with CRLF.
    /// Returns false if the line was dropped because the queue is full.
    pub fn push(&mut self, line: &str) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);

        if self.buffer.len() + line.len() + 2 > self.max_size {
            self.dropped_messages += 1;
            tracing::warn!(
                "SendQueue full ({}/{}), dropping message",
                self.buffer.len(),
                self.max_size
            );
            return false;
        }

        self.buffer.extend(line.as_bytes());
        self.buffer.extend(b"\r\n");
        true
    }

    /// Bytes not yet written, front first
    pub fn pending(&mut self) -> &[u8] {
        self.buffer.make_contiguous()
    }

    /// Discard `n` bytes the socket has accepted
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n);
    }

    /// Take every pending byte, leaving the queue empty
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.drain(..).collect()
    }

    /// Take every queued line as text, without line terminators
    pub fn drain_lines(&mut self) -> Vec<String> {
        let bytes = self.take();
        String::from_utf8_lossy(&bytes)
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Get current buffer size in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get number of dropped lines
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }
}

/// Receive queue - incoming bytes not yet terminated by a line feed
#[derive(Debug)]
pub struct RecvQueue {
    buffer: Vec<u8>,
    /// Maximum size of an unterminated line in bytes
    max_size: usize,
}

impl RecvQueue {
    /// Create a new receive queue with specified maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_size,
        }
    }

    /// Append a chunk read from the socket
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract complete records split on line feed, with a trailing carriage
    /// return stripped. Empty records are skipped; incomplete data is retained.
    pub fn extract_lines(&mut self) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }

        lines
    }

    /// True once the unterminated tail left after [`RecvQueue::extract_lines`]
    /// exceeds the limit; the caller should drop the client.
    pub fn overflowed(&self) -> bool {
        self.buffer.len() > self.max_size
    }

    /// Discard buffered data
    pub fn clear(&mut self) {
        if !self.buffer.is_empty() {
            tracing::warn!(
                "RecvQueue overflow ({}/{}), discarding buffered data",
                self.buffer.len(),
                self.max_size
            );
        }
        self.buffer.clear();
    }

    /// Get current buffer size in bytes
    pub fn current_size(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer contains any incomplete data
    pub fn has_incomplete_data(&self) -> bool {
        !self.buffer.is_empty()
    }
}
