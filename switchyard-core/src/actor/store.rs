// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Structured-store proxy actor.
//!
//! The coordinator does not interpret store queries. A proxy bound to
//! `connect` hands out the store's access token; a proxy bound to `request`
//! passes the payload to a [`StoreEngine`] and replies from its own task once
//! the engine answers, so a slow store never holds up dispatch.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::Actor;
use crate::codec::{read_raw_frame, write_raw_frame};
use crate::error::{StoreError, ERROR_STORE};
use crate::proto::{Db, Message};
use crate::registry::AddressRegistry;
use crate::types::Address;

/// Request/response passthrough to an externally managed data engine.
#[async_trait]
pub trait StoreEngine: Send + Sync {
    /// Short description of a request for operator logs.
    fn describe(&self, request: &[u8]) -> String {
        format!("{} byte request", request.len())
    }

    async fn send_request(&self, request: Vec<u8>) -> Result<Vec<u8>, StoreError>;
}

/// Sends each request as one length-prefixed frame over a fresh TCP
/// connection and reads one frame back.
#[derive(Debug, Clone)]
pub struct TcpFrameEngine {
    endpoint: String,
    connect_timeout: Duration,
}

impl TcpFrameEngine {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// `connection` is `host:port`, optionally prefixed with `tcp://`.
    pub fn new(connection: &str) -> Self {
        let endpoint = connection
            .strip_prefix("tcp://")
            .unwrap_or(connection)
            .trim_end_matches('/')
            .to_string();
        Self {
            endpoint,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StoreEngine for TcpFrameEngine {
    async fn send_request(&self, request: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        let mut stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.endpoint))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(StoreError::Unavailable(format!("{}: {}", self.endpoint, e)))
                }
                Err(_) => {
                    return Err(StoreError::Unavailable(format!(
                        "{}: connect timed out",
                        self.endpoint
                    )))
                }
            };

        write_raw_frame(&mut stream, &request)
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        read_raw_frame(&mut stream)
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))
    }
}

/// Answers every request with the request itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackEngine;

#[async_trait]
impl StoreEngine for LoopbackEngine {
    async fn send_request(&self, request: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        Ok(request)
    }
}

/// A configured store: its descriptor plus the engine serving it.
#[derive(Clone)]
pub struct StoreHandle {
    descriptor: Db,
    engine: Arc<dyn StoreEngine>,
}

impl StoreHandle {
    pub fn new(descriptor: Db, engine: Arc<dyn StoreEngine>) -> Self {
        Self { descriptor, engine }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn token(&self) -> &str {
        &self.descriptor.token
    }

    pub fn descriptor(&self) -> &Db {
        &self.descriptor
    }

    pub fn engine(&self) -> &Arc<dyn StoreEngine> {
        &self.engine
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Connect,
    Request,
}

impl FromStr for StoreOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "request" => Ok(Self::Request),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Request => write!(f, "request"),
        }
    }
}

pub struct StoreProxy {
    addr: Address,
    op: StoreOp,
    store: StoreHandle,
    registry: Weak<AddressRegistry>,
}

impl StoreProxy {
    pub fn new(
        addr: Address,
        op: StoreOp,
        store: StoreHandle,
        registry: Weak<AddressRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            addr,
            op,
            store,
            registry,
        })
    }

    pub fn op(&self) -> StoreOp {
        self.op
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }
}

async fn send_reply(registry: &Weak<AddressRegistry>, from: Address, reply: Message) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    if let Err(e) = registry.route(reply).await {
        tracing::warn!(address = %from, error = %e, "Store reply dropped");
        crate::metrics::MESSAGES_DROPPED.inc();
    }
}

#[async_trait]
impl Actor for StoreProxy {
    fn address(&self) -> Address {
        self.addr
    }

    async fn deliver(&self, msg: Message) {
        match self.op {
            StoreOp::Connect => {
                let reply = msg.reply(self.store.token().as_bytes().to_vec());
                send_reply(&self.registry, self.addr, reply).await;
            }
            StoreOp::Request => {
                let addr = self.addr;
                let store = self.store.clone();
                let registry = self.registry.clone();

                tokio::spawn(async move {
                    let description = store.engine().describe(&msg.data);
                    let started = Instant::now();
                    let result = store.engine().send_request(msg.data.clone()).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;

                    let reply = match result {
                        Ok(body) => {
                            tracing::info!(
                                store = %store.name(),
                                request = %description,
                                elapsed_ms,
                                "Store request"
                            );
                            msg.reply(body)
                        }
                        Err(e) => {
                            tracing::warn!(
                                store = %store.name(),
                                request = %description,
                                elapsed_ms,
                                error = %e,
                                "Store request failed"
                            );
                            Message::error_reply(
                                msg.from_addr(),
                                addr,
                                ERROR_STORE,
                                e.to_string().into_bytes(),
                            )
                        }
                    };
                    send_reply(&registry, addr, reply).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Gateway;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    fn handle(engine: Arc<dyn StoreEngine>) -> StoreHandle {
        StoreHandle::new(
            Db {
                kind: "test".to_string(),
                name: "users".to_string(),
                connection: String::new(),
                token: "s3cret".to_string(),
            },
            engine,
        )
    }

    /// Holds every request until released.
    struct GatedEngine {
        release: Notify,
    }

    #[async_trait]
    impl StoreEngine for GatedEngine {
        async fn send_request(&self, request: Vec<u8>) -> Result<Vec<u8>, StoreError> {
            self.release.notified().await;
            let mut out = b"done:".to_vec();
            out.extend_from_slice(&request);
            Ok(out)
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl StoreEngine for FailingEngine {
        async fn send_request(&self, _request: Vec<u8>) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::Unavailable("engine is down".to_string()))
        }
    }

    #[test]
    fn test_op_parsing() {
        assert_eq!("connect".parse::<StoreOp>(), Ok(StoreOp::Connect));
        assert_eq!("request".parse::<StoreOp>(), Ok(StoreOp::Request));
        assert!("query".parse::<StoreOp>().is_err());
    }

    #[test]
    fn test_tcp_endpoint_parsing() {
        assert_eq!(TcpFrameEngine::new("tcp://127.0.0.1:7000/").endpoint(), "127.0.0.1:7000");
        assert_eq!(TcpFrameEngine::new("db:9000").endpoint(), "db:9000");
    }

    #[tokio::test]
    async fn test_connect_replies_with_token() {
        let registry = AddressRegistry::new_shared();
        let weak = Arc::downgrade(&registry);
        let caller = registry.insert_fresh(|addr| Gateway::new(addr, weak.clone()));
        let proxy = registry.insert_fresh(|addr| {
            StoreProxy::new(addr, StoreOp::Connect, handle(Arc::new(LoopbackEngine)), weak.clone())
        });

        proxy
            .deliver(Message::routed(proxy.address(), caller.address(), vec![]))
            .await;
        assert_eq!(caller.bytes(), b"s3cret");
    }

    #[tokio::test]
    async fn test_slow_request_does_not_block_deliver() {
        let registry = AddressRegistry::new_shared();
        let weak = Arc::downgrade(&registry);
        let engine = Arc::new(GatedEngine {
            release: Notify::new(),
        });
        let caller = registry.insert_fresh(|addr| Gateway::new(addr, weak.clone()));
        let proxy = registry.insert_fresh(|addr| {
            StoreProxy::new(addr, StoreOp::Request, handle(engine.clone()), weak.clone())
        });

        // Returns while the engine is still holding the request.
        tokio::time::timeout(
            Duration::from_secs(1),
            proxy.deliver(Message::routed(proxy.address(), caller.address(), b"q".to_vec())),
        )
        .await
        .unwrap();
        assert!(caller.bytes().is_empty());

        engine.release.notify_one();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), caller.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"done:q");
    }

    #[tokio::test]
    async fn test_engine_failure_is_replied_in_band() {
        let registry = AddressRegistry::new_shared();
        let weak = Arc::downgrade(&registry);
        let caller = registry.insert_fresh(|addr| Gateway::new(addr, weak.clone()));
        let proxy = registry.insert_fresh(|addr| {
            StoreProxy::new(addr, StoreOp::Request, handle(Arc::new(FailingEngine)), weak.clone())
        });

        proxy
            .deliver(Message::routed(proxy.address(), caller.address(), b"q".to_vec()))
            .await;
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), caller.read(&mut buf))
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("engine is down"));
    }

    #[tokio::test]
    async fn test_tcp_engine_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_raw_frame(&mut socket).await.unwrap();
            let mut response = request.clone();
            response.reverse();
            write_raw_frame(&mut socket, &response).await.unwrap();
        });

        let engine = TcpFrameEngine::new(&format!("tcp://{}", endpoint));
        let response = engine.send_request(b"abc".to_vec()).await.unwrap();
        assert_eq!(response, b"cba");
    }

    #[tokio::test]
    async fn test_tcp_engine_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let endpoint = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let engine = TcpFrameEngine::new(&endpoint);
        assert!(matches!(
            engine.send_request(vec![1]).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
