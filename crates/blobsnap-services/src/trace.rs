//! Human-readable progress output.
//!
//! A trace sink receives text in pieces: `write` appends to the current line
//! and `write_line` appends and terminates it. The decision engine writes
//! "Checking for existing latest content... " and then finishes the line with
//! the outcome once it is known.

use std::sync::Mutex;

pub trait TraceSink: Send + Sync {
    fn write(&self, text: &str);
    fn write_line(&self, text: &str);
}

/// Emits each completed line as a `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink {
    pending: Mutex<String>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceSink for TracingSink {
    fn write(&self, text: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_str(text);
    }

    fn write_line(&self, text: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push_str(text);
        let line = std::mem::take(&mut *pending);
        tracing::info!(target: "blobsnap::trace", "{}", line);
    }
}

/// Keeps everything written, for inspection.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TraceSink for BufferSink {
    fn write(&self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_str(text);
    }

    fn write_line(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(text);
        buffer.push('\n');
    }
}

/// Discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn write(&self, _text: &str) {}
    fn write_line(&self, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_joins_partial_lines() {
        let sink = BufferSink::new();
        sink.write("Checking... ");
        sink.write_line("done.");
        sink.write_line("next");
        assert_eq!(sink.contents(), "Checking... done.\nnext\n");
    }

    #[test]
    fn tracing_sink_clears_pending_line() {
        let sink = TracingSink::new();
        sink.write("partial ");
        sink.write_line("line");
        assert!(sink.pending.lock().unwrap().is_empty());
    }
}
