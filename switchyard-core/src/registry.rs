// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread-safe address registry using DashMap.
//!
//! Maps a random 64-bit [`Address`] to the actor living there. Addresses act
//! as capability tokens: an actor can only reach addresses it was told about.
//! Nothing restricts which live address a message may target once known.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::actor::{Actor, ActorRef};
use crate::error::{SwitchyardError, SwitchyardResult};
use crate::metrics;
use crate::proto::Message;
use crate::types::Address;

/// Concurrent map from address to actor.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    actors: DashMap<Address, ActorRef>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register an actor at an explicit address.
    ///
    /// A previous occupant is replaced silently; callers that need a unique
    /// address use [`AddressRegistry::insert_fresh`].
    pub fn register(&self, addr: Address, actor: ActorRef) {
        if let Some(previous) = self.actors.insert(addr, actor) {
            tracing::debug!(
                address = %addr,
                previous = previous.kind_name(),
                "Address reused, previous actor replaced"
            );
        }
    }

    /// Draw random addresses until an unused one is found, then build and
    /// register the actor there. `make` must not touch the registry.
    pub fn insert_fresh<A>(&self, make: impl FnOnce(Address) -> Arc<A>) -> Arc<A>
    where
        Arc<A>: Into<ActorRef>,
    {
        loop {
            let addr = Address::random();
            if let Entry::Vacant(slot) = self.actors.entry(addr) {
                let actor = make(addr);
                slot.insert(Arc::clone(&actor).into());
                return actor;
            }
            tracing::warn!(address = %addr, "Random address collision, drawing again");
        }
    }

    pub fn lookup(&self, addr: Address) -> Option<ActorRef> {
        self.actors.get(&addr).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, addr: Address) -> Option<ActorRef> {
        self.actors.remove(&addr).map(|(_, actor)| actor)
    }

    /// Remove the entry at `addr` only if `accept` approves its actor.
    pub fn remove_if(
        &self,
        addr: Address,
        accept: impl FnOnce(&ActorRef) -> bool,
    ) -> Option<ActorRef> {
        self.actors
            .remove_if(&addr, |_, actor| accept(actor))
            .map(|(_, actor)| actor)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.actors.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Deliver a message to the actor at `msg.to`.
    pub async fn route(&self, msg: Message) -> SwitchyardResult<()> {
        let to = msg.to_addr();
        // Clone out of the map so no shard lock is held across the await.
        let actor = self
            .lookup(to)
            .ok_or(SwitchyardError::AddressNotFound(to))?;
        actor.deliver(msg).await;
        metrics::MESSAGES_ROUTED.inc();
        Ok(())
    }
}
