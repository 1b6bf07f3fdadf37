// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Length-prefixed framing of protobuf messages over a byte stream.
//!
//! Frame format:
//! - 4 bytes: payload length N (little-endian)
//! - N bytes: protobuf payload
//!
//! The same framing carries [`Message`](crate::proto::Message) on the IPC
//! socket and [`Http`](crate::proto::Http) inside a gateway's byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;
use crate::types::Address;

/// Maximum frame payload (64 MB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a message into a complete frame.
pub fn encode_frame<M: prost::Message>(msg: &M) -> Result<Vec<u8>, CodecError> {
    let len = msg.encoded_len();
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + len);
    buf.extend_from_slice(&(len as u32).to_le_bytes());
    msg.encode(&mut buf)?;
    Ok(buf)
}

/// Write one frame with a single logical write.
pub async fn write_frame<W, M>(writer: &mut W, msg: &M) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    M: prost::Message,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, looping over short reads until the payload is complete.
pub async fn read_frame<R, M>(reader: &mut R) -> Result<M, CodecError>
where
    R: AsyncRead + Unpin,
    M: prost::Message + Default,
{
    let payload = read_raw_frame(reader).await?;
    if payload.is_empty() {
        return Ok(M::default());
    }
    Ok(M::decode(payload.as_slice())?)
}

/// Read one frame and return its payload without decoding it.
pub async fn read_raw_frame<R>(reader: &mut R) -> Result<Vec<u8>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_le_bytes(prefix) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write an opaque payload as one frame.
pub async fn write_raw_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Client side of the handshake: the connecting process's own address.
pub async fn write_address<W: AsyncWrite + Unpin>(
    writer: &mut W,
    addr: Address,
) -> Result<(), CodecError> {
    writer.write_all(&addr.to_le_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Server side of the handshake: exactly 8 little-endian bytes.
pub async fn read_address<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Address, CodecError> {
    let mut bytes = [0u8; 8];
    match reader.read_exact(&mut bytes).await {
        Ok(_) => Ok(Address::from_le_bytes(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CodecError::ConnectionClosed)
        }
        Err(e) => Err(e.into()),
    }
}

/// Incremental frame decoder for byte streams that arrive in arbitrary
/// pieces, such as the `data` of successive routed messages.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Decode the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame<M: prost::Message + Default>(&mut self) -> Result<Option<M>, CodecError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let size = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;
        if size > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        if self.buf.len() < LENGTH_PREFIX_SIZE + size {
            return Ok(None);
        }
        self.buf.advance(LENGTH_PREFIX_SIZE);
        let payload = self.buf.split_to(size);
        Ok(Some(M::decode(payload.freeze())?))
    }
}
