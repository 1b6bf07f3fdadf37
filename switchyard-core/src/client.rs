// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Function-side end of the IPC protocol.
//!
//! A spawned function finds its address, the coordinator socket and its
//! artifact in the environment, connects, identifies itself with its 8-byte
//! address and receives the handshake reply. After that it exchanges framed
//! [`Message`]s with the coordinator.

use std::path::{Path, PathBuf};

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::codec::{read_frame, write_address, write_frame};
use crate::error::{CodecError, HardValidationError, SwitchyardError, SwitchyardResult};
use crate::proto::{Message, MessageKind, Startup};
use crate::types::Address;

/// The function's own address, in decimal.
pub const ENV_ADDR: &str = "SWITCHYARD_ADDR";

/// Path of the coordinator's IPC socket.
pub const ENV_SOCKET: &str = "SWITCHYARD_SOCKET";

/// Artifact the wrapper should execute.
pub const ENV_MODULE: &str = "SWITCHYARD_MODULE";

pub struct FunctionClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    addr: Address,
    parent: Address,
    startup: Startup,
}

impl FunctionClient {
    /// Connect to `socket` as the function registered at `addr`.
    pub async fn connect(socket: impl AsRef<Path>, addr: Address) -> SwitchyardResult<Self> {
        let stream = UnixStream::connect(socket.as_ref())
            .await
            .map_err(|e| SwitchyardError::Io {
                context: "connecting to coordinator socket",
                source: e,
            })?;
        let (mut reader, mut writer) = stream.into_split();

        write_address(&mut writer, addr).await?;
        let handshake: Message = read_frame(&mut reader).await?;
        if handshake.kind() != MessageKind::Handshake {
            return Err(CodecError::ConnectionClosed.into());
        }
        if handshake.your_address != addr.value() {
            tracing::warn!(
                expected = %addr,
                got = %Address::new(handshake.your_address),
                "Handshake reply names a different address"
            );
        }

        Ok(Self {
            reader,
            writer,
            addr,
            parent: Address::new(handshake.parent_address),
            startup: handshake.startup.unwrap_or_default(),
        })
    }

    /// Connect using the environment the coordinator sets for a function.
    pub async fn connect_from_env() -> SwitchyardResult<Self> {
        let socket = PathBuf::from(env_var(ENV_SOCKET)?);
        let raw_addr = env_var(ENV_ADDR)?;
        let addr = raw_addr
            .parse::<u64>()
            .map(Address::new)
            .map_err(|e| HardValidationError::InvalidFieldValue {
                field: "SWITCHYARD_ADDR",
                value: raw_addr.clone(),
                reason: e.to_string(),
            })?;
        Self::connect(socket, addr).await
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn parent(&self) -> Address {
        self.parent
    }

    pub fn startup(&self) -> &Startup {
        &self.startup
    }

    /// Send `data` to the actor at `to`.
    pub async fn send(&mut self, to: Address, data: Vec<u8>) -> Result<(), CodecError> {
        let msg = Message::routed(to, self.addr, data);
        self.send_message(&msg).await
    }

    pub async fn send_message(&mut self, msg: &Message) -> Result<(), CodecError> {
        write_frame(&mut self.writer, msg).await
    }

    pub async fn recv(&mut self) -> Result<Message, CodecError> {
        read_frame(&mut self.reader).await
    }

    /// Ask the coordinator to create `name` parented to this function.
    /// Returns the address the new actor will live at.
    pub async fn spawn(&mut self, name: &str) -> Result<Address, CodecError> {
        let addr = Address::random();
        self.send_message(&Message::spawn_request(self.addr, name, addr))
            .await?;
        Ok(addr)
    }

    /// Announce this function's exit to its parent.
    pub async fn exit(&mut self, code: i32) -> Result<(), CodecError> {
        let msg = Message::exit_notice(self.parent, self.addr, code);
        self.send_message(&msg).await
    }
}

/// Complete the handshake and hand back the bare stream, for peers that
/// write their own bytes afterwards.
pub async fn connect_raw(socket: impl AsRef<Path>, addr: Address) -> SwitchyardResult<UnixStream> {
    let mut stream = UnixStream::connect(socket.as_ref())
        .await
        .map_err(|e| SwitchyardError::Io {
            context: "connecting to coordinator socket",
            source: e,
        })?;
    write_address(&mut stream, addr).await?;
    let _: Message = read_frame(&mut stream).await?;
    Ok(stream)
}

fn env_var(name: &'static str) -> SwitchyardResult<String> {
    std::env::var(name).map_err(|_| {
        SwitchyardError::from(HardValidationError::MissingRequiredField {
            field: name,
            context: "function environment".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_address;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_client_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("client.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let addr = read_address(&mut reader).await.unwrap();
            let startup = Startup {
                module: "/artifacts/echo".to_string(),
                addr: addr.value(),
                parent: 77,
                dbs: vec![],
            };
            write_frame(&mut writer, &Message::handshake(addr, Address::new(77), startup))
                .await
                .unwrap();
            let msg: Message = read_frame(&mut reader).await.unwrap();
            msg
        });

        let mut client = FunctionClient::connect(&socket, Address::new(1234))
            .await
            .unwrap();
        assert_eq!(client.parent(), Address::new(77));
        assert_eq!(client.startup().module, "/artifacts/echo");

        client.send(Address::new(77), b"hi".to_vec()).await.unwrap();
        let received = server.await.unwrap();
        assert_eq!(received.from, 1234);
        assert_eq!(received.to, 77);
        assert_eq!(received.data, b"hi");
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let result = FunctionClient::connect("/nonexistent/switchyard.sock", Address::new(1)).await;
        assert!(matches!(result, Err(SwitchyardError::Io { .. })));
    }
}
