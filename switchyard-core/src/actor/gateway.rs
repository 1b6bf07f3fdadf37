// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Gateway actor: the entry and exit point of one unit of external work.
//!
//! Bytes written to a gateway are wrapped in messages to its child function.
//! Messages from the child land in a [`Pipe`] that the owner reads back.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use super::{Actor, Function, Pipe};
use crate::error::{SwitchyardError, SwitchyardResult};
use crate::proto::{Message, MessageKind};
use crate::registry::AddressRegistry;
use crate::types::Address;

pub struct Gateway {
    addr: Address,
    child: Mutex<Option<Address>>,
    outbound: mpsc::UnboundedSender<Message>,
    pipe: Pipe,
    child_exit: Mutex<Option<i32>>,
}

impl Gateway {
    /// Create a gateway and its forwarding task. Must be called inside a
    /// Tokio runtime.
    ///
    /// Outbound messages are routed one at a time in write order by the
    /// forwarding task, so [`Gateway::write`] never waits on the child.
    pub fn new(addr: Address, registry: Weak<AddressRegistry>) -> Arc<Self> {
        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if let Err(e) = registry.route(msg).await {
                    tracing::warn!(gateway = %addr, error = %e, "Gateway message dropped");
                    crate::metrics::MESSAGES_DROPPED.inc();
                }
            }
        });

        Arc::new(Self {
            addr,
            child: Mutex::new(None),
            outbound,
            pipe: Pipe::new(),
            child_exit: Mutex::new(None),
        })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Record the function that writes are forwarded to.
    pub fn attach_fn(&self, function: &Function) {
        *self.child.lock() = Some(function.address());
    }

    pub fn child(&self) -> Option<Address> {
        *self.child.lock()
    }

    /// Exit code reported by the child, if it has exited.
    pub fn child_exit(&self) -> Option<i32> {
        *self.child_exit.lock()
    }

    /// Forward `bytes` to the child as one message. Returns immediately.
    pub fn write(&self, bytes: &[u8]) -> SwitchyardResult<usize> {
        let child = self
            .child()
            .ok_or(SwitchyardError::GatewayDetached(self.addr))?;
        let msg = Message::routed(child, self.addr, bytes.to_vec());
        if self.outbound.send(msg).is_err() {
            tracing::warn!(gateway = %self.addr, "Gateway forwarder stopped, write dropped");
        }
        Ok(bytes.len())
    }

    /// Wait for data from the child; may return fewer bytes than `buf` holds.
    /// Returns 0 once the child has exited and everything was read.
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        self.pipe.read(buf).await
    }

    /// Everything the child has sent that has not been read yet.
    pub fn bytes(&self) -> Vec<u8> {
        self.pipe.drain()
    }

    /// Stop accepting child data; blocked readers see end-of-stream.
    pub fn close(&self) {
        self.pipe.close();
    }
}

#[async_trait]
impl Actor for Gateway {
    fn address(&self) -> Address {
        self.addr
    }

    async fn deliver(&self, msg: Message) {
        match msg.kind() {
            MessageKind::Spawn => {
                // Gateways never spawn on behalf of a function.
                tracing::error!(
                    gateway = %self.addr,
                    from = %msg.from_addr(),
                    spawn = %msg.spawn,
                    "Unsupported spawn request sent to gateway, dropped"
                );
            }
            MessageKind::Exit => {
                tracing::debug!(gateway = %self.addr, exit = msg.exit, "Child exited");
                // The child's own notice precedes the connection-loss one.
                self.child_exit.lock().get_or_insert(msg.exit);
                self.pipe.close();
            }
            kind => {
                if kind == MessageKind::Error {
                    tracing::warn!(
                        gateway = %self.addr,
                        from = %msg.from_addr(),
                        code = msg.error,
                        "Error-bearing message delivered to gateway"
                    );
                }
                if !self.pipe.write(&msg.data) {
                    tracing::debug!(gateway = %self.addr, "Data after child exit ignored");
                }
            }
        }
    }
}

/// `AsyncRead + AsyncWrite` view of a gateway, so the frame codec can run
/// over it like over a socket.
#[derive(Clone)]
pub struct GatewayStream {
    gateway: Arc<Gateway>,
}

impl GatewayStream {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

impl AsyncRead for GatewayStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.gateway.pipe.poll_read(cx, buf)
    }
}

impl AsyncWrite for GatewayStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.gateway.write(buf).map_err(io::Error::other))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
