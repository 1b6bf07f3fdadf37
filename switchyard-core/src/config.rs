// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Validates the coordinator, the function catalog, configured stores and
//! HTTP gateways at boot-up time. Any invalid field results in a
//! HardValidationError that prevents startup.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HardValidationError, SwitchyardError, SwitchyardResult};
use crate::proto::Db;
use crate::types::{FunctionName, Port};

/// IPC socket used when none is configured.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/switchyard.sock";

/// Executable launched for every function when none is configured.
pub const DEFAULT_WRAPPER_EXECUTABLE: &str = "switchyard-wrapper";

/// HTTP port of a gateway that does not name one.
pub const DEFAULT_GATEWAY_PORT: u16 = 9276;

/// Store engines the coordinator can build from configuration.
pub const STORE_KINDS: &[&str] = &["tcp", "loopback"];

/// Raw coordinator settings as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawCoordinatorConfig {
    #[serde(default = "default_socket_path")]
    socket_path: String,
    #[serde(default = "default_wrapper_executable")]
    wrapper_executable: String,
    handshake_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    metrics_port: Option<u16>,
    #[serde(default)]
    environment: HashMap<String, String>,
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_wrapper_executable() -> String {
    DEFAULT_WRAPPER_EXECUTABLE.to_string()
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

impl Default for RawCoordinatorConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            wrapper_executable: default_wrapper_executable(),
            handshake_timeout_ms: None,
            response_timeout_ms: None,
            metrics_port: None,
            environment: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFunctionConfig {
    name: String,
    artifact: String,
    #[serde(default)]
    environment: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawStoreConfig {
    name: String,
    kind: String,
    #[serde(default)]
    connection: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct RawRouteConfig {
    path: String,
    function: Option<String>,
    files: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawGatewayConfig {
    #[serde(default = "default_gateway_port")]
    port: u16,
    function: Option<String>,
    #[serde(default)]
    routes: Vec<RawRouteConfig>,
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    coordinator: RawCoordinatorConfig,
    functions: Vec<RawFunctionConfig>,
    #[serde(default)]
    stores: Vec<RawStoreConfig>,
    #[serde(default)]
    gateways: Vec<RawGatewayConfig>,
}

/// Explicit coordinator settings, constructed once and handed to
/// [`Coordinator::new`](crate::Coordinator::new).
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub socket_path: PathBuf,
    pub wrapper_executable: PathBuf,
    /// Bound on how long a delivery waits for a function's handshake.
    pub handshake_timeout: Option<Duration>,
    /// Bound on how long the HTTP adapter waits for response frames.
    pub response_timeout: Option<Duration>,
    pub metrics_port: Option<Port>,
    /// Extra environment for every spawned function.
    pub environment: HashMap<String, String>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            wrapper_executable: PathBuf::from(DEFAULT_WRAPPER_EXECUTABLE),
            handshake_timeout: None,
            response_timeout: None,
            metrics_port: None,
            environment: HashMap::new(),
        }
    }
}

/// One entry of the artifact catalog.
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub name: FunctionName,
    pub artifact: PathBuf,
    pub environment: HashMap<String, String>,
}

/// A structured store reachable through `switchyard/store/<name>/...`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub kind: String,
    pub connection: String,
    pub token: String,
}

impl StoreConfig {
    /// Descriptor handed to functions in their startup payload.
    pub fn descriptor(&self) -> Db {
        Db {
            kind: self.kind.clone(),
            name: self.name.clone(),
            connection: self.connection.clone(),
            token: self.token.clone(),
        }
    }
}

/// What a route serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Function(FunctionName),
    /// Static files from a directory, with the route path stripped.
    Files(PathBuf),
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(name) => write!(f, "{}", name),
            Self::Files(dir) => write!(f, "files {}", dir.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub path: String,
    pub target: RouteTarget,
}

/// Outcome of [`GatewayConfig::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Function(&'a FunctionName),
    Files { prefix: &'a str, dir: &'a Path },
}

impl<'a> Resolved<'a> {
    pub fn function(&self) -> Option<&'a FunctionName> {
        match self {
            Self::Function(name) => Some(name),
            Self::Files { .. } => None,
        }
    }
}

/// One HTTP listener and the functions its requests are sent to.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: Port,
    /// Catch-all target for requests no route matches.
    pub function: Option<FunctionName>,
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Target for a request path: the longest matching route, then the
    /// catch-all. A route ending in `/` matches its whole subtree, any other
    /// route only its exact path.
    pub fn resolve(&self, path: &str) -> Option<Resolved<'_>> {
        let route = self
            .routes
            .iter()
            .filter(|route| {
                path == route.path
                    || (route.path.ends_with('/') && path.starts_with(route.path.as_str()))
            })
            .max_by_key(|route| route.path.len());

        match route {
            Some(route) => Some(match &route.target {
                RouteTarget::Function(name) => Resolved::Function(name),
                RouteTarget::Files(dir) => Resolved::Files {
                    prefix: &route.path,
                    dir,
                },
            }),
            None => self.function.as_ref().map(Resolved::Function),
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub coordinator: CoordinatorSettings,
    pub functions: Vec<FunctionConfig>,
    pub stores: Vec<StoreConfig>,
    pub gateways: Vec<GatewayConfig>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> SwitchyardResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SwitchyardError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SwitchyardError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> SwitchyardResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| SwitchyardError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> SwitchyardResult<Config> {
        let coordinator = Self::validate_coordinator(raw.coordinator)?;

        let mut functions = Vec::with_capacity(raw.functions.len());
        let mut seen_functions = HashSet::new();
        for (index, raw_func) in raw.functions.into_iter().enumerate() {
            let func = Self::validate_function(raw_func, index)?;
            if !seen_functions.insert(func.name.clone()) {
                return Err(HardValidationError::DuplicateName {
                    kind: "function",
                    name: func.name.to_string(),
                }
                .into());
            }
            functions.push(func);
        }

        if functions.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one function must be defined".to_string(),
            }
            .into());
        }

        let mut stores = Vec::with_capacity(raw.stores.len());
        let mut seen_stores = HashSet::new();
        for (index, raw_store) in raw.stores.into_iter().enumerate() {
            let store = Self::validate_store(raw_store, index)?;
            if !seen_stores.insert(store.name.clone()) {
                return Err(HardValidationError::DuplicateName {
                    kind: "store",
                    name: store.name,
                }
                .into());
            }
            stores.push(store);
        }

        let mut gateways = Vec::with_capacity(raw.gateways.len());
        let mut seen_ports = HashSet::new();
        if let Some(port) = coordinator.metrics_port {
            seen_ports.insert(port.value());
        }
        for (index, raw_gateway) in raw.gateways.into_iter().enumerate() {
            let gateway = Self::validate_gateway(raw_gateway, index, &seen_functions)?;
            if !seen_ports.insert(gateway.port.value()) {
                return Err(HardValidationError::InvalidPort {
                    port: gateway.port.value(),
                    reason: format!("Port {} is already in use by another listener", gateway.port),
                }
                .into());
            }
            gateways.push(gateway);
        }

        Ok(Config {
            coordinator,
            functions,
            stores,
            gateways,
        })
    }

    fn validate_coordinator(raw: RawCoordinatorConfig) -> SwitchyardResult<CoordinatorSettings> {
        if raw.socket_path.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "socket_path",
                context: "coordinator".to_string(),
            }
            .into());
        }
        if raw.wrapper_executable.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "wrapper_executable",
                context: "coordinator".to_string(),
            }
            .into());
        }

        let handshake_timeout = Self::validate_timeout("handshake_timeout_ms", raw.handshake_timeout_ms)?;
        let response_timeout = Self::validate_timeout("response_timeout_ms", raw.response_timeout_ms)?;
        let metrics_port = raw.metrics_port.map(Port::new).transpose()?;
        Self::validate_environment(&raw.environment, "coordinator")?;

        Ok(CoordinatorSettings {
            socket_path: PathBuf::from(raw.socket_path),
            wrapper_executable: PathBuf::from(raw.wrapper_executable),
            handshake_timeout,
            response_timeout,
            metrics_port,
            environment: raw.environment,
        })
    }

    fn validate_timeout(field: &'static str, value: Option<u64>) -> SwitchyardResult<Option<Duration>> {
        match value {
            Some(0) => Err(HardValidationError::InvalidFieldValue {
                field,
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            }
            .into()),
            Some(ms) => Ok(Some(Duration::from_millis(ms))),
            None => Ok(None),
        }
    }

    fn validate_function(raw: RawFunctionConfig, index: usize) -> SwitchyardResult<FunctionConfig> {
        let context = format!("function at index {}", index);

        let name = FunctionName::new(raw.name)?;

        if raw.artifact.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "artifact",
                context: format!("function '{}'", name),
            }
            .into());
        }

        Self::validate_environment(&raw.environment, &context)?;

        Ok(FunctionConfig {
            name,
            artifact: PathBuf::from(raw.artifact),
            environment: raw.environment,
        })
    }

    fn validate_store(raw: RawStoreConfig, index: usize) -> SwitchyardResult<StoreConfig> {
        if raw.name.is_empty() || raw.name.contains('/') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "name",
                value: raw.name,
                reason: format!(
                    "Store name in store at index {} must be non-empty and contain no '/'",
                    index
                ),
            }
            .into());
        }
        if raw.kind.is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "kind",
                context: format!("store '{}'", raw.name),
            }
            .into());
        }
        if !STORE_KINDS.contains(&raw.kind.as_str()) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "kind",
                value: raw.kind,
                reason: format!("Supported store kinds: {}", STORE_KINDS.join(", ")),
            }
            .into());
        }

        Ok(StoreConfig {
            name: raw.name,
            kind: raw.kind,
            connection: raw.connection,
            token: raw.token,
        })
    }

    fn validate_gateway(
        raw: RawGatewayConfig,
        index: usize,
        known: &HashSet<FunctionName>,
    ) -> SwitchyardResult<GatewayConfig> {
        let context = format!("gateway at index {}", index);
        let port = Port::new(raw.port)?;

        let lookup = |name: String| -> SwitchyardResult<FunctionName> {
            let name = FunctionName::new(name)?;
            if !known.contains(&name) {
                return Err(HardValidationError::UnknownFunction {
                    name: name.to_string(),
                    context: context.clone(),
                }
                .into());
            }
            Ok(name)
        };

        let function = raw.function.map(&lookup).transpose()?;

        let mut routes = Vec::with_capacity(raw.routes.len());
        for route in raw.routes {
            if !route.path.starts_with('/') {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "path",
                    value: route.path,
                    reason: format!("Route paths in {} must start with '/'", context),
                }
                .into());
            }
            let target = match (route.function, route.files) {
                (Some(function), None) => RouteTarget::Function(lookup(function)?),
                (None, Some(dir)) if !dir.as_os_str().is_empty() => RouteTarget::Files(dir),
                (None, Some(_)) => {
                    return Err(HardValidationError::InvalidFieldValue {
                        field: "files",
                        value: String::new(),
                        reason: format!("Route '{}' in {} has an empty directory", route.path, context),
                    }
                    .into())
                }
                _ => {
                    return Err(HardValidationError::SchemaValidation {
                        message: format!(
                            "Route '{}' in {} needs exactly one of 'function' or 'files'",
                            route.path, context
                        ),
                    }
                    .into())
                }
            };
            routes.push(RouteConfig {
                path: route.path,
                target,
            });
        }

        if function.is_none() && routes.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: format!("{} needs a function or at least one route", context),
            }
            .into());
        }

        Ok(GatewayConfig {
            port,
            function,
            routes,
        })
    }

    fn validate_environment(env: &HashMap<String, String>, context: &str) -> SwitchyardResult<()> {
        for key in env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "environment",
                    value: format!("'{}' in {}", key, context),
                    reason: "Environment variable names must be non-empty and contain no '='"
                        .to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
