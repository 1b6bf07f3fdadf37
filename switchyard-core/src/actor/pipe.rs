// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Blocking single-consumer byte pipe.
//!
//! Writes never block and always succeed while the pipe is open. Reads wait
//! until at least one byte is available and may return fewer bytes than
//! requested. After [`Pipe::close`], readers drain what is buffered and then
//! see end-of-stream.
//!
//! Chunks travel over an unbounded channel, so the "became non-empty" signal
//! and the reader's emptiness check are ordered by the channel itself and a
//! wakeup cannot be lost between them.

use std::io;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::ReadBuf;
use tokio::sync::mpsc;

pub struct Pipe {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    reader: Mutex<PipeReader>,
}

struct PipeReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
    /// Remainder of a chunk a previous short read did not consume.
    pending: Bytes,
}

impl Pipe {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            reader: Mutex::new(PipeReader {
                rx,
                pending: Bytes::new(),
            }),
        }
    }

    /// Append bytes. Returns false if the pipe was already closed.
    pub fn write(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return !self.is_closed();
        }
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(Bytes::copy_from_slice(bytes)).is_ok(),
            None => false,
        }
    }

    /// Stop accepting writes and wake a blocked reader.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Poll-style read used by both [`Pipe::read`] and `AsyncRead` adapters.
    pub fn poll_read(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut reader = self.reader.lock();
        loop {
            if !reader.pending.is_empty() {
                let n = buf.remaining().min(reader.pending.len());
                buf.put_slice(&reader.pending[..n]);
                reader.pending.advance(n);
                return Poll::Ready(Ok(()));
            }
            match reader.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => reader.pending = chunk,
                // Closed and drained.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Wait for data and copy up to `buf.len()` bytes. Returns 0 only at
    /// end-of-stream (or for an empty `buf`).
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        let mut read_buf = ReadBuf::new(buf);
        std::future::poll_fn(|cx| match self.poll_read(cx, &mut read_buf) {
            Poll::Ready(_) => Poll::Ready(read_buf.filled().len()),
            Poll::Pending => Poll::Pending,
        })
        .await
    }

    /// Take everything buffered right now without waiting.
    pub fn drain(&self) -> Vec<u8> {
        let mut reader = self.reader.lock();
        let mut out = BytesMut::from(&reader.pending[..]);
        reader.pending = Bytes::new();
        while let Ok(chunk) = reader.rx.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out.to_vec()
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}
