// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Key-value service actor, bound to one operation at spawn time.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use super::Actor;
use crate::error::{KvError, ERROR_KV};
use crate::kv::{extract_key_and_value, MemoryStore};
use crate::proto::Message;
use crate::registry::AddressRegistry;
use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOp {
    Get,
    Set,
}

impl FromStr for KvOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "set" => Ok(Self::Set),
            _ => Err(()),
        }
    }
}

impl fmt::Display for KvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Set => write!(f, "set"),
        }
    }
}

pub struct KvProxy {
    addr: Address,
    op: KvOp,
    store: MemoryStore,
    registry: Weak<AddressRegistry>,
}

impl KvProxy {
    pub fn new(
        addr: Address,
        op: KvOp,
        store: MemoryStore,
        registry: Weak<AddressRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            addr,
            op,
            store,
            registry,
        })
    }

    pub fn op(&self) -> KvOp {
        self.op
    }

    /// Build the reply to `msg`: the value or an empty body on success,
    /// the error text with [`ERROR_KV`] otherwise.
    pub fn respond(&self, msg: &Message) -> Message {
        match self.apply(&msg.data) {
            Ok(body) => msg.reply(body),
            Err(e) => {
                tracing::debug!(address = %self.addr, op = %self.op, error = %e, "KV request failed");
                Message::error_reply(
                    msg.from_addr(),
                    self.addr,
                    ERROR_KV,
                    e.to_string().into_bytes(),
                )
            }
        }
    }

    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, KvError> {
        match self.op {
            KvOp::Get => self.store.get(data),
            KvOp::Set => {
                let (key, value) = extract_key_and_value(data)?;
                self.store.set(key, value)?;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Actor for KvProxy {
    fn address(&self) -> Address {
        self.addr
    }

    async fn deliver(&self, msg: Message) {
        let reply = self.respond(&msg);
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Err(e) = registry.route(reply).await {
            tracing::warn!(address = %self.addr, error = %e, "KV reply dropped");
            crate::metrics::MESSAGES_DROPPED.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Gateway;
    use crate::kv::write_key_and_value;

    fn proxy(op: KvOp, store: &MemoryStore) -> Arc<KvProxy> {
        KvProxy::new(Address::new(5), op, store.clone(), Weak::new())
    }

    fn request(data: &[u8]) -> Message {
        Message::routed(Address::new(5), Address::new(9), data.to_vec())
    }

    #[test]
    fn test_op_parsing() {
        assert_eq!("get".parse::<KvOp>(), Ok(KvOp::Get));
        assert_eq!("set".parse::<KvOp>(), Ok(KvOp::Set));
        assert!("delete".parse::<KvOp>().is_err());
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        let set = proxy(KvOp::Set, &store);
        let get = proxy(KvOp::Get, &store);

        let encoded = write_key_and_value(b"greeting", b"hello world").unwrap();
        let reply = set.respond(&request(&encoded));
        assert_eq!(reply.error, 0);
        assert!(reply.data.is_empty());
        assert_eq!(reply.to, 9);
        assert_eq!(reply.from, 5);

        let reply = get.respond(&request(b"greeting"));
        assert_eq!(reply.error, 0);
        assert_eq!(reply.data, b"hello world");
    }

    #[test]
    fn test_get_missing_replies_not_found() {
        let store = MemoryStore::new();
        let reply = proxy(KvOp::Get, &store).respond(&request(b"absent"));
        assert_eq!(reply.error, ERROR_KV);
        assert_eq!(reply.data, b"not found");
    }

    #[test]
    fn test_malformed_set_replies_error_text() {
        let store = MemoryStore::new();
        let set = proxy(KvOp::Set, &store);

        let reply = set.respond(&request(&[9]));
        assert_eq!(reply.error, ERROR_KV);
        assert!(String::from_utf8_lossy(&reply.data).contains("no space for length"));

        let reply = set.respond(&request(&[200, 0, 1]));
        assert!(String::from_utf8_lossy(&reply.data).contains("invalid size"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reply_is_routed_to_caller() {
        let registry = AddressRegistry::new_shared();
        let store = MemoryStore::new();
        store.set(b"k", b"v").unwrap();
        let weak = Arc::downgrade(&registry);

        let caller = registry.insert_fresh(|addr| Gateway::new(addr, weak.clone()));
        let get = registry.insert_fresh(|addr| KvProxy::new(addr, KvOp::Get, store.clone(), weak.clone()));

        registry
            .route(Message::routed(get.address(), caller.address(), b"k".to_vec()))
            .await
            .unwrap();
        assert_eq!(caller.bytes(), b"v");
    }
}
