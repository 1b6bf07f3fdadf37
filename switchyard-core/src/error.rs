// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for switchyard.
//!
//! Explicit enum error types per area, no `Box<dyn Error>` and no
//! `anyhow::Result` in the library.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Address;

/// In-band error code sent to a spawner whose spawn request failed.
pub const ERROR_SPAWN_FAILED: u32 = 21;

/// In-band error code sent back by the KV service on any failure.
pub const ERROR_KV: u32 = 28;

/// In-band error code sent back by a structured-store proxy.
pub const ERROR_STORE: u32 = 29;

/// Top-level error type for the coordinator.
#[derive(Debug, Error)]
pub enum SwitchyardError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Wire Errors
    // =========================================================================
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    // =========================================================================
    // Actor Errors
    // =========================================================================
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("KV error: {0}")]
    Kv(#[from] KvError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No actor registered at address {0}")]
    AddressNotFound(Address),

    #[error("Address {0} is not a function")]
    NotAFunction(Address),

    #[error("Function {0} already completed its handshake")]
    AlreadyConnected(Address),

    #[error("Function {0} was stopped")]
    FunctionStopped(Address),

    #[error("Gateway {0} has no attached function")]
    GatewayDetached(Address),

    #[error("Actor {from} answered with error {code}: {message}")]
    ErrorReply {
        from: Address,
        code: u32,
        message: String,
    },

    #[error("Timed out after {elapsed_ms}ms waiting for {what}")]
    Timeout { what: &'static str, elapsed_ms: u64 },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors prevent the coordinator from starting.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Unknown function referenced by {context}: {name}")]
    UnknownFunction { name: String, context: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Framing and schema errors on a byte stream.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protobuf encode error: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// KV wire encoding and store errors. Display text is sent back in-band.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("no space for length: input must hold a 2 byte key length")]
    NoSpaceForLength,

    #[error("invalid size: key length {declared} is longer than remaining input {remaining}")]
    InvalidSize { declared: usize, remaining: usize },

    #[error("key can't be greater than {max} bytes, got {size}")]
    KeyTooLarge { size: usize, max: usize },

    #[error("value can't be greater than {max} bytes, got {size}")]
    ValueTooLarge { size: usize, max: usize },

    #[error("not found")]
    NotFound,
}

/// Failures creating a function or a service actor.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("function with name \"{0}\" doesn't exist")]
    FunctionNotFound(String),

    #[error("failed to launch {executable} for {name}: {source}")]
    LaunchFailed {
        name: String,
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("function {0} was already started")]
    AlreadyStarted(Address),

    #[error("malformed service path \"{path}\": {reason}")]
    MalformedServicePath { path: String, reason: &'static str },

    #[error("no store named \"{0}\" is configured")]
    UnknownStore(String),
}

/// Errors reported by an external store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    RequestFailed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias using SwitchyardError.
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;
