// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Switchyard Core Library
//!
//! Coordinator for short-lived function processes. Every participant is an
//! actor living at a 64-bit address; the coordinator routes framed protobuf
//! messages between them, spawns functions and built-in services on request,
//! and adapts HTTP requests into function invocations.

pub mod actor;
pub mod client;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod kv;
pub mod metrics;
pub mod output;
pub mod proto;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use actor::{ActorRef, Function, Gateway, GatewayStream};
pub use client::FunctionClient;
pub use config::{Config, ConfigLoader, CoordinatorSettings, GatewayConfig};
pub use coordinator::Coordinator;
pub use error::{HardValidationError, SwitchyardError, SwitchyardResult};
pub use proto::{Http, Message, Startup};
pub use registry::AddressRegistry;
pub use types::{Address, FunctionName, Port};
