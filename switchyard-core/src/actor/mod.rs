// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Addressable actors.
//!
//! Every actor exposes one capability, receiving a [`Message`]. The registry
//! stores [`ActorRef`], a tagged handle over the concrete variants, and the
//! dispatch loop only ever calls [`Actor::deliver`] on it.

mod function;
mod gateway;
mod kv;
mod pipe;
mod store;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::proto::Message;
use crate::types::Address;

pub use function::{Function, FunctionPhase, FunctionSpec};
pub use gateway::{Gateway, GatewayStream};
pub use kv::{KvOp, KvProxy};
pub use pipe::Pipe;
pub use store::{
    LoopbackEngine, StoreEngine, StoreHandle, StoreOp, StoreProxy, TcpFrameEngine,
};

/// Anything reachable by address.
#[async_trait]
pub trait Actor: Send + Sync {
    fn address(&self) -> Address;

    /// Receive one message. Failures are handled inside the actor, never
    /// surfaced to the router.
    async fn deliver(&self, msg: Message);
}

/// Registry entry: one of the concrete actor variants.
#[derive(Clone)]
pub enum ActorRef {
    Function(Arc<Function>),
    Gateway(Arc<Gateway>),
    Kv(Arc<KvProxy>),
    Store(Arc<StoreProxy>),
}

impl ActorRef {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Gateway(_) => "gateway",
            Self::Kv(_) => "kv",
            Self::Store(_) => "store",
        }
    }

    pub fn as_function(&self) -> Option<&Arc<Function>> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[async_trait]
impl Actor for ActorRef {
    fn address(&self) -> Address {
        match self {
            Self::Function(a) => a.address(),
            Self::Gateway(a) => a.address(),
            Self::Kv(a) => a.address(),
            Self::Store(a) => a.address(),
        }
    }

    async fn deliver(&self, msg: Message) {
        match self {
            Self::Function(a) => a.deliver(msg).await,
            Self::Gateway(a) => a.deliver(msg).await,
            Self::Kv(a) => a.deliver(msg).await,
            Self::Store(a) => a.deliver(msg).await,
        }
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind_name(), self.address())
    }
}

impl From<Arc<Function>> for ActorRef {
    fn from(actor: Arc<Function>) -> Self {
        Self::Function(actor)
    }
}

impl From<Arc<Gateway>> for ActorRef {
    fn from(actor: Arc<Gateway>) -> Self {
        Self::Gateway(actor)
    }
}

impl From<Arc<KvProxy>> for ActorRef {
    fn from(actor: Arc<KvProxy>) -> Self {
        Self::Kv(actor)
    }
}

impl From<Arc<StoreProxy>> for ActorRef {
    fn from(actor: Arc<StoreProxy>) -> Self {
        Self::Store(actor)
    }
}
