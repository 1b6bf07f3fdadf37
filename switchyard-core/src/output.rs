// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Operator output of function processes.
//!
//! Each line a function writes to stdout or stderr is handed to an
//! [`OutputSink`] together with the function's name. This is kept apart from
//! the coordinator's own structured logs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Destination for function output lines.
pub trait OutputSink: Send + Sync {
    fn line(&self, label: &str, stream: OutputStream, line: &str);
}

/// Writes `[label]: line` to the coordinator's own stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn line(&self, label: &str, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => println!("[{}]: {}", label, line),
            OutputStream::Stderr => eprintln!("[{}]: {}", label, line),
        }
    }
}

/// Keeps every line in memory. Useful when output must be inspected.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines so far, formatted as `[label]: line`.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn lines_on(&self, stream: OutputStream) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.clone())
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, label: &str, stream: OutputStream, line: &str) {
        self.lines
            .lock()
            .push((stream, format!("[{}]: {}", label, line)));
    }
}

/// Copy `reader` line by line into `sink` until end-of-stream.
///
/// Lines are split on `\n` and decoded lossily, so non-UTF-8 output is
/// forwarded instead of ending the copy. The pipe is drained even after a
/// read error, since a closed read end would kill the writer with SIGPIPE.
pub(crate) async fn forward_lines<R>(
    label: String,
    stream: OutputStream,
    reader: R,
    sink: Arc<dyn OutputSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                sink.line(&label, stream, &String::from_utf8_lossy(line));
            }
            Err(e) => {
                tracing::debug!(function = %label, stream = %stream, error = %e, "Output read failed, draining");
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    tracing::debug!(function = %label, error = %e, "Output stream ended");
                }
                break;
            }
        }
    }
}
