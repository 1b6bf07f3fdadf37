// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The coordinator: IPC listener, per-connection dispatch and the spawn
//! protocol.
//!
//! Every function process connects to one unix socket, identifies itself
//! with its address and from then on sends framed messages. Each message is
//! either a spawn request (a new function, or a built-in service actor in
//! the `switchyard/` namespace) or data routed to another address.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::actor::{
    ActorRef, Function, FunctionSpec, Gateway, KvOp, KvProxy, LoopbackEngine, StoreEngine,
    StoreHandle, StoreOp, StoreProxy, TcpFrameEngine,
};
use crate::client::{ENV_ADDR, ENV_MODULE, ENV_SOCKET};
use crate::codec::{read_address, read_frame};
use crate::config::{Config, CoordinatorSettings, FunctionConfig, StoreConfig};
use crate::error::{
    CodecError, HardValidationError, SpawnError, SwitchyardError, SwitchyardResult,
    ERROR_SPAWN_FAILED,
};
use crate::kv::MemoryStore;
use crate::metrics;
use crate::output::{ConsoleSink, OutputSink};
use crate::proto::{Db, Message, Startup};
use crate::registry::AddressRegistry;
use crate::types::Address;

/// Catalog prefix added to names spawned by functions.
pub const FUNCTION_PREFIX: &str = "function.";

/// Spawn names under this prefix create built-in service actors.
pub const SERVICE_PREFIX: &str = "switchyard/";

#[derive(Debug, Clone)]
struct CatalogEntry {
    artifact: PathBuf,
    environment: HashMap<String, String>,
}

pub struct Coordinator {
    registry: Arc<AddressRegistry>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    stores: RwLock<HashMap<String, StoreHandle>>,
    kv: MemoryStore,
    settings: CoordinatorSettings,
    output: Arc<dyn OutputSink>,
}

impl Coordinator {
    pub fn new(settings: CoordinatorSettings) -> Arc<Self> {
        Self::with_output(settings, Arc::new(ConsoleSink))
    }

    pub fn with_output(settings: CoordinatorSettings, output: Arc<dyn OutputSink>) -> Arc<Self> {
        Arc::new(Self {
            registry: AddressRegistry::new_shared(),
            catalog: RwLock::new(HashMap::new()),
            stores: RwLock::new(HashMap::new()),
            kv: MemoryStore::new(),
            settings,
            output,
        })
    }

    /// Build a coordinator with the catalog and stores of `config`.
    pub fn from_config(config: &Config) -> SwitchyardResult<Arc<Self>> {
        let coordinator = Self::new(config.coordinator.clone());
        for function in &config.functions {
            coordinator.register_function(function);
        }
        for store in &config.stores {
            coordinator.register_store(store)?;
        }
        Ok(coordinator)
    }

    pub fn registry(&self) -> &Arc<AddressRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn kv(&self) -> &MemoryStore {
        &self.kv
    }

    /// Add `name` to the artifact catalog. A later registration of the same
    /// name wins.
    pub fn register_function_name(&self, name: impl Into<String>, artifact: impl Into<PathBuf>) {
        self.catalog.write().insert(
            name.into(),
            CatalogEntry {
                artifact: artifact.into(),
                environment: HashMap::new(),
            },
        );
    }

    pub fn register_function(&self, config: &FunctionConfig) {
        self.catalog.write().insert(
            config.name.to_string(),
            CatalogEntry {
                artifact: config.artifact.clone(),
                environment: config.environment.clone(),
            },
        );
    }

    pub fn artifact(&self, name: &str) -> Option<PathBuf> {
        self.catalog.read().get(name).map(|entry| entry.artifact.clone())
    }

    /// Build the engine for a configured store and make it spawnable.
    pub fn register_store(&self, config: &StoreConfig) -> SwitchyardResult<()> {
        let engine: Arc<dyn StoreEngine> = match config.kind.as_str() {
            "tcp" => Arc::new(TcpFrameEngine::new(&config.connection)),
            "loopback" => Arc::new(LoopbackEngine),
            other => {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "kind",
                    value: other.to_string(),
                    reason: format!("No engine for store '{}'", config.name),
                }
                .into())
            }
        };
        self.register_store_handle(StoreHandle::new(config.descriptor(), engine));
        Ok(())
    }

    pub fn register_store_handle(&self, handle: StoreHandle) {
        self.stores.write().insert(handle.name().to_string(), handle);
    }

    /// Descriptors of every configured store, ordered by name.
    pub fn store_descriptors(&self) -> Vec<Db> {
        let mut dbs: Vec<Db> = self
            .stores
            .read()
            .values()
            .map(|handle| handle.descriptor().clone())
            .collect();
        dbs.sort_by(|a, b| a.name.cmp(&b.name));
        dbs
    }

    /// Register an unstarted function for catalog entry `name`.
    ///
    /// The function is reachable immediately, so its handshake can be
    /// resolved as soon as the process connects. An explicit `addr` replaces
    /// whatever lived there; without one a fresh address is drawn.
    pub fn new_function(
        &self,
        name: &str,
        parent: Address,
        addr: Option<Address>,
        dbs: Vec<Db>,
    ) -> Result<Arc<Function>, SpawnError> {
        let entry = self
            .catalog
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SpawnError::FunctionNotFound(name.to_string()))?;

        let build = |addr: Address| {
            let mut command = Command::new(&self.settings.wrapper_executable);
            command
                .envs(&self.settings.environment)
                .envs(&entry.environment)
                .env(ENV_ADDR, addr.value().to_string())
                .env(ENV_SOCKET, &self.settings.socket_path)
                .env(ENV_MODULE, &entry.artifact)
                .env("RUST_BACKTRACE", "1");

            Function::new(
                addr,
                parent,
                FunctionSpec {
                    name: name.to_string(),
                    command,
                    startup: Startup {
                        module: entry.artifact.to_string_lossy().into_owned(),
                        addr: addr.value(),
                        parent: parent.value(),
                        dbs,
                    },
                    handshake_timeout: self.settings.handshake_timeout,
                    output: Arc::clone(&self.output),
                },
            )
        };

        let function = match addr.filter(|a| !a.is_none()) {
            Some(addr) => {
                let function = build(addr);
                self.registry
                    .register(addr, ActorRef::Function(Arc::clone(&function)));
                function
            }
            None => self.registry.insert_fresh(build),
        };

        tracing::debug!(
            address = %function.address(),
            parent = %parent,
            function = %name,
            "Function registered"
        );
        Ok(function)
    }

    /// Register and launch a function. A launch failure leaves nothing
    /// registered.
    pub fn spawn_function(
        &self,
        name: &str,
        parent: Address,
        addr: Option<Address>,
        dbs: Vec<Db>,
    ) -> Result<Arc<Function>, SpawnError> {
        let function = self.new_function(name, parent, addr, dbs)?;
        if let Err(e) = function.start() {
            self.registry.remove(function.address());
            return Err(e);
        }
        Ok(function)
    }

    /// Stop the function at `addr` and forget its address.
    pub fn stop_function(&self, addr: Address) -> SwitchyardResult<()> {
        match self.registry.lookup(addr) {
            Some(ActorRef::Function(function)) => {
                self.registry.remove(addr);
                function.stop();
                Ok(())
            }
            Some(_) => Err(SwitchyardError::NotAFunction(addr)),
            None => Err(SwitchyardError::AddressNotFound(addr)),
        }
    }

    /// Allocate and register a gateway. Must be called inside a Tokio
    /// runtime.
    pub fn new_gateway(&self) -> Arc<Gateway> {
        let registry = Arc::downgrade(&self.registry);
        self.registry
            .insert_fresh(|addr| Gateway::new(addr, registry))
    }

    pub fn remove_gateway(&self, addr: Address) {
        if let Some(ActorRef::Gateway(gateway)) = self.registry.remove(addr) {
            gateway.close();
        }
    }

    /// Bind the IPC socket, replacing a stale socket file.
    pub fn bind(&self) -> SwitchyardResult<UnixListener> {
        let path = &self.settings.socket_path;
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(socket = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SwitchyardError::Io {
                    context: "removing stale socket",
                    source: e,
                })
            }
        }

        UnixListener::bind(path).map_err(|e| SwitchyardError::Io {
            context: "binding coordinator socket",
            source: e,
        })
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) {
        tracing::info!(
            socket = %self.settings.socket_path.display(),
            "Coordinator listening"
        );
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let coordinator = Arc::clone(&self);
                    tokio::spawn(async move {
                        coordinator.handle_connection(stream).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept IPC connection");
                }
            }
        }
    }

    /// Bind the socket and serve it in the background.
    pub fn start(self: &Arc<Self>) -> SwitchyardResult<JoinHandle<()>> {
        metrics::init();
        let listener = self.bind()?;
        Ok(tokio::spawn(Arc::clone(self).serve(listener)))
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let (mut reader, writer) = stream.into_split();

        let addr = match read_address(&mut reader).await {
            Ok(addr) => addr,
            Err(e) => {
                tracing::debug!(error = %e, "Connection closed before handshake");
                return;
            }
        };

        let function = match self.registry.lookup(addr) {
            Some(ActorRef::Function(function)) => function,
            Some(other) => {
                tracing::warn!(address = %addr, actor = ?other, "Handshake from an address that is not a function");
                return;
            }
            None => {
                tracing::warn!(address = %addr, "Handshake from an unknown address");
                return;
            }
        };

        if let Err(e) = function.connect(writer).await {
            tracing::warn!(address = %addr, error = %e, "Handshake failed");
            return;
        }

        loop {
            match read_frame::<_, Message>(&mut reader).await {
                Ok(msg) => self.dispatch(msg).await,
                Err(CodecError::ConnectionClosed) => break,
                Err(e) => {
                    tracing::warn!(
                        address = %addr,
                        function = %function.name(),
                        error = %e,
                        "Malformed frame, closing connection"
                    );
                    metrics::FRAME_ERRORS.inc();
                    break;
                }
            }
        }

        tracing::debug!(address = %addr, function = %function.name(), "Function disconnected");

        let code = function.exit_code().unwrap_or(-1);

        // The address may already have been reused by a newer actor.
        let removed = self.registry.remove_if(addr, |actor| {
            matches!(actor, ActorRef::Function(current) if Arc::ptr_eq(current, &function))
        });
        if removed.is_some() {
            tracing::debug!(address = %addr, "Disconnected function unregistered");
        }
        function.stop();

        // A reader blocked on this function would otherwise wait forever.
        let parent = function.parent();
        if self.registry.contains(parent) {
            if let Err(e) = self
                .registry
                .route(Message::exit_notice(parent, addr, code))
                .await
            {
                tracing::debug!(address = %addr, error = %e, "Exit notice not delivered");
            }
        }
    }

    /// Handle one message read from a function connection.
    pub async fn dispatch(&self, msg: Message) {
        if !msg.spawn.is_empty() {
            self.spawn(msg).await;
            return;
        }

        let to = msg.to_addr();
        let from = msg.from_addr();
        if let Err(e) = self.registry.route(msg).await {
            tracing::warn!(to = %to, from = %from, error = %e, "Unroutable message dropped");
            metrics::MESSAGES_DROPPED.inc();
        }
    }

    async fn spawn(&self, msg: Message) {
        let from = msg.from_addr();
        let spawn_addr = msg.spawn_addr();

        let (kind, result) = match msg.spawn.strip_prefix(SERVICE_PREFIX) {
            Some(path) => self.spawn_service(path, spawn_addr),
            None => {
                let name = format!("{}{}", FUNCTION_PREFIX, msg.spawn);
                let result = self
                    .spawn_function(&name, from, Some(spawn_addr), self.store_descriptors())
                    .map(|_| ());
                ("function", result)
            }
        };

        match result {
            Ok(()) => {
                metrics::SPAWNS.with_label_values(&[kind, "ok"]).inc();
                tracing::debug!(spawn = %msg.spawn, address = %spawn_addr, parent = %from, "Spawned");
            }
            Err(e) => {
                metrics::SPAWNS.with_label_values(&[kind, "failed"]).inc();
                tracing::warn!(spawn = %msg.spawn, parent = %from, error = %e, "Spawn failed");
                if self.registry.contains(from) {
                    let reply = Message::error_reply(
                        from,
                        spawn_addr,
                        ERROR_SPAWN_FAILED,
                        e.to_string().into_bytes(),
                    );
                    if let Err(e) = self.registry.route(reply).await {
                        tracing::debug!(parent = %from, error = %e, "Spawn failure not reported");
                    }
                }
            }
        }
    }

    /// Create a service actor for `path` (the spawn name without the
    /// service prefix): `kv/<op>` or `store/<name>/<op>`.
    fn spawn_service(&self, path: &str, addr: Address) -> (&'static str, Result<(), SpawnError>) {
        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            ["kv", op] => ("kv", self.spawn_kv(path, op, addr)),
            ["store", name, op] => ("store", self.spawn_store(path, name, op, addr)),
            _ => ("service", Err(malformed(path, "unknown service"))),
        }
    }

    fn spawn_kv(&self, path: &str, op: &str, addr: Address) -> Result<(), SpawnError> {
        let op = op
            .parse::<KvOp>()
            .map_err(|_| malformed(path, "unknown kv operation"))?;
        let kv = self.kv.clone();
        let registry = Arc::downgrade(&self.registry);
        self.place(addr, |addr| KvProxy::new(addr, op, kv, registry));
        Ok(())
    }

    fn spawn_store(&self, path: &str, name: &str, op: &str, addr: Address) -> Result<(), SpawnError> {
        let op = op
            .parse::<StoreOp>()
            .map_err(|_| malformed(path, "unknown store operation"))?;
        let handle = self
            .stores
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SpawnError::UnknownStore(name.to_string()))?;
        let registry = Arc::downgrade(&self.registry);
        self.place(addr, |addr| StoreProxy::new(addr, op, handle, registry));
        Ok(())
    }

    /// Register an actor at `addr`, or at a fresh address when none was
    /// requested.
    fn place<A>(&self, addr: Address, make: impl FnOnce(Address) -> Arc<A>)
    where
        Arc<A>: Into<ActorRef>,
    {
        if addr.is_none() {
            self.registry.insert_fresh(make);
        } else {
            self.registry.register(addr, make(addr).into());
        }
    }
}

fn malformed(path: &str, reason: &'static str) -> SpawnError {
    SpawnError::MalformedServicePath {
        path: format!("{}{}", SERVICE_PREFIX, path),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::FunctionPhase;
    use crate::client::{connect_raw, FunctionClient};
    use crate::error::ERROR_KV;
    use crate::kv::write_key_and_value;
    use crate::output::MemorySink;
    use crate::proto::MessageKind;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    struct Harness {
        coordinator: Arc<Coordinator>,
        _dir: tempfile::TempDir,
        serve: JoinHandle<()>,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.serve.abort();
        }
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = CoordinatorSettings {
            socket_path: dir.path().join("switchyard.sock"),
            wrapper_executable: PathBuf::from("/nonexistent/switchyard-wrapper"),
            ..Default::default()
        };
        let coordinator = Coordinator::with_output(settings, Arc::new(MemorySink::new()));
        coordinator.register_function_name("function.fake", "/artifacts/fake");
        let serve = coordinator.start().unwrap();
        Harness {
            coordinator,
            _dir: dir,
            serve,
        }
    }

    /// A function registered without a process, driven by a client that
    /// plays the process.
    async fn fake_function(h: &Harness, parent: Address) -> FunctionClient {
        let function = h
            .coordinator
            .new_function("function.fake", parent, None, vec![])
            .unwrap();
        FunctionClient::connect(&h.coordinator.settings().socket_path, function.address())
            .await
            .unwrap()
    }

    async fn recv(client: &mut FunctionClient) -> Message {
        tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_carries_startup() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let client = fake_function(&h, gateway.address()).await;

        assert_eq!(client.parent(), gateway.address());
        assert_eq!(client.startup().module, "/artifacts/fake");
        assert_eq!(client.startup().addr, client.address().value());
    }

    #[tokio::test]
    async fn test_function_and_gateway_exchange_data() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;
        let function = h
            .coordinator
            .registry()
            .lookup(client.address())
            .and_then(|actor| actor.as_function().cloned())
            .unwrap();
        gateway.attach_fn(&function);

        gateway.write(b"ping").unwrap();
        let msg = recv(&mut client).await;
        assert_eq!(msg.data, b"ping");
        assert_eq!(msg.from_addr(), gateway.address());

        client.send(gateway.address(), b"pong".to_vec()).await.unwrap();
        let mut buf = [0u8; 4];
        let n = tokio::time::timeout(Duration::from_secs(2), gateway.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn test_spawn_unknown_function_replies_error() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        let spawned = client.spawn("does-not-exist").await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.kind(), MessageKind::Error);
        assert_eq!(reply.error, ERROR_SPAWN_FAILED);
        assert_eq!(reply.from_addr(), spawned);
        assert!(String::from_utf8_lossy(&reply.data).contains("function.does-not-exist"));
        assert!(!h.coordinator.registry().contains(spawned));

        // Still serving.
        let other = fake_function(&h, gateway.address()).await;
        assert!(h.coordinator.registry().contains(other.address()));
    }

    #[tokio::test]
    async fn test_spawn_launch_failure_unregisters() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        // Catalogued, but the wrapper executable does not exist.
        let spawned = client.spawn("fake").await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.error, ERROR_SPAWN_FAILED);
        assert!(!h.coordinator.registry().contains(spawned));
    }

    #[tokio::test]
    async fn test_malformed_service_spawn_replies_error() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        for name in ["switchyard/kv/delete", "switchyard/kv", "switchyard/store/nope/connect"] {
            client.spawn(name).await.unwrap();
            let reply = recv(&mut client).await;
            assert_eq!(reply.error, ERROR_SPAWN_FAILED, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_kv_service_via_spawn() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        let set = client.spawn("switchyard/kv/set").await.unwrap();
        let get = client.spawn("switchyard/kv/get").await.unwrap();

        let body = write_key_and_value(b"color", b"teal").unwrap();
        client.send(set, body).await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.error, 0);
        assert_eq!(reply.from_addr(), set);
        assert!(reply.data.is_empty());

        client.send(get, b"color".to_vec()).await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.data, b"teal");

        client.send(get, b"shape".to_vec()).await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.error, ERROR_KV);
        assert_eq!(reply.data, b"not found");

        assert_eq!(h.coordinator.kv().get(b"color").unwrap(), b"teal");
    }

    #[tokio::test]
    async fn test_store_service_via_spawn() {
        let h = harness();
        h.coordinator.register_store_handle(StoreHandle::new(
            Db {
                kind: "loopback".to_string(),
                name: "users".to_string(),
                connection: String::new(),
                token: "tok".to_string(),
            },
            Arc::new(LoopbackEngine),
        ));
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        let connect = client.spawn("switchyard/store/users/connect").await.unwrap();
        let request = client.spawn("switchyard/store/users/request").await.unwrap();

        client.send(connect, vec![]).await.unwrap();
        assert_eq!(recv(&mut client).await.data, b"tok");

        client.send(request, b"select".to_vec()).await.unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply.data, b"select");
        assert_eq!(reply.from_addr(), request);
    }

    #[tokio::test]
    async fn test_malformed_frame_only_ends_that_connection() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut healthy = fake_function(&h, gateway.address()).await;

        let broken = h
            .coordinator
            .new_function("function.fake", gateway.address(), None, vec![])
            .unwrap();
        let mut raw = connect_raw(&h.coordinator.settings().socket_path, broken.address())
            .await
            .unwrap();
        let mut garbage = 3u32.to_le_bytes().to_vec();
        garbage.extend_from_slice(&[0xff, 0xff, 0xff]);
        raw.write_all(&garbage).await.unwrap();

        // The broken connection's end is reported to its parent.
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), gateway.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(gateway.child_exit(), Some(-1));

        // The other connection still works.
        let other_gateway = h.coordinator.new_gateway();
        healthy
            .send(other_gateway.address(), b"still here".to_vec())
            .await
            .unwrap();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), other_gateway.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"still here");
    }

    #[tokio::test]
    async fn test_unroutable_message_is_dropped() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let mut client = fake_function(&h, gateway.address()).await;

        client.send(Address::new(0x5eed), b"lost".to_vec()).await.unwrap();
        client.send(gateway.address(), b"found".to_vec()).await.unwrap();

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), gateway.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"found");
    }

    #[tokio::test]
    async fn test_teardown_removes_addresses() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let function = h
            .coordinator
            .new_function("function.fake", gateway.address(), None, vec![])
            .unwrap();

        h.coordinator.stop_function(function.address()).unwrap();
        assert!(h.coordinator.registry().lookup(function.address()).is_none());
        assert!(matches!(
            h.coordinator.stop_function(function.address()),
            Err(SwitchyardError::AddressNotFound(_))
        ));

        h.coordinator.remove_gateway(gateway.address());
        assert!(h.coordinator.registry().lookup(gateway.address()).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_function() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let parent = fake_function(&h, gateway.address()).await;
        let child = fake_function(&h, parent.address()).await;
        let child_addr = child.address();
        let function = h
            .coordinator
            .registry()
            .lookup(child_addr)
            .and_then(|actor| actor.as_function().cloned())
            .unwrap();

        drop(child);

        let registry = Arc::clone(h.coordinator.registry());
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.contains(child_addr) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(registry.lookup(child_addr).is_none());
        assert_eq!(function.phase(), FunctionPhase::Stopped);
        assert!(registry.contains(parent.address()));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_reused_address() {
        let h = harness();
        let gateway = h.coordinator.new_gateway();
        let client = fake_function(&h, gateway.address()).await;
        let addr = client.address();

        // A newer function takes over the address before the old one leaves.
        let replacement = h
            .coordinator
            .new_function("function.fake", gateway.address(), Some(addr), vec![])
            .unwrap();
        drop(client);

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), gateway.read(&mut buf))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(matches!(
            h.coordinator.registry().lookup(addr),
            Some(ActorRef::Function(current)) if Arc::ptr_eq(&current, &replacement)
        ));
    }

    #[tokio::test]
    async fn test_handshake_from_unknown_address_is_ignored() {
        let h = harness();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            FunctionClient::connect(&h.coordinator.settings().socket_path, Address::new(0x1)),
        )
        .await
        .unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_last_write_wins() {
        let coordinator = Coordinator::new(CoordinatorSettings::default());
        coordinator.register_function_name("function.hello", "/a.out");
        coordinator.register_function_name("function.hello", "/b.out");
        assert_eq!(
            coordinator.artifact("function.hello"),
            Some(PathBuf::from("/b.out"))
        );
        assert!(matches!(
            coordinator.new_function("function.nope", Address::NONE, None, vec![]),
            Err(SpawnError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_store_descriptors_sorted() {
        let coordinator = Coordinator::new(CoordinatorSettings::default());
        for name in ["zeta", "alpha"] {
            coordinator
                .register_store(&StoreConfig {
                    name: name.to_string(),
                    kind: "loopback".to_string(),
                    connection: String::new(),
                    token: String::new(),
                })
                .unwrap();
        }
        let names: Vec<String> = coordinator
            .store_descriptors()
            .into_iter()
            .map(|db| db.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
