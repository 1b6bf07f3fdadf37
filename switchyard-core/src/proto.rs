// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Protobuf schemas carried inside frames.
//!
//! [`Message`] is the envelope exchanged between the coordinator and function
//! processes. [`Http`] is the nested request/response schema carried inside
//! `Message.data` between the HTTP adapter and a function.

use std::collections::HashMap;

use crate::types::Address;

/// Envelope for every post-handshake frame on the IPC socket.
///
/// Several logical kinds share this envelope; see [`MessageKind`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(uint64, tag = "1")]
    pub to: u64,
    #[prost(uint64, tag = "2")]
    pub from: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    #[prost(string, tag = "4")]
    pub spawn: String,
    #[prost(uint64, tag = "5")]
    pub spawn_address: u64,
    #[prost(bool, tag = "6")]
    pub exiting: bool,
    #[prost(int32, tag = "7")]
    pub exit: i32,
    #[prost(uint64, tag = "8")]
    pub your_address: u64,
    #[prost(uint64, tag = "9")]
    pub parent_address: u64,
    #[prost(message, optional, tag = "10")]
    pub startup: Option<Startup>,
    #[prost(uint32, tag = "11")]
    pub error: u32,
}

/// Bootstrap payload sent to a function in its handshake reply.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Startup {
    /// Artifact path the wrapper should execute.
    #[prost(string, tag = "1")]
    pub module: String,
    #[prost(uint64, tag = "2")]
    pub addr: u64,
    #[prost(uint64, tag = "3")]
    pub parent: u64,
    #[prost(message, repeated, tag = "4")]
    pub dbs: Vec<Db>,
}

/// Descriptor of one configured structured store.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Db {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub connection: String,
    #[prost(string, tag = "4")]
    pub token: String,
}

/// Which logical message an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Handshake,
    Spawn,
    Exit,
    Error,
    Data,
}

impl Message {
    /// Routed data from one actor to another.
    pub fn routed(to: Address, from: Address, data: Vec<u8>) -> Self {
        Self {
            to: to.value(),
            from: from.value(),
            data,
            ..Default::default()
        }
    }

    /// Handshake reply for a freshly connected function.
    pub fn handshake(addr: Address, parent: Address, startup: Startup) -> Self {
        Self {
            your_address: addr.value(),
            parent_address: parent.value(),
            startup: Some(startup),
            ..Default::default()
        }
    }

    /// Request to create `name` at `spawn_address`, parented to `from`.
    pub fn spawn_request(from: Address, name: impl Into<String>, spawn_address: Address) -> Self {
        Self {
            from: from.value(),
            spawn: name.into(),
            spawn_address: spawn_address.value(),
            ..Default::default()
        }
    }

    /// Error-bearing reply with optional explanatory text.
    pub fn error_reply(to: Address, from: Address, code: u32, text: Vec<u8>) -> Self {
        Self {
            to: to.value(),
            from: from.value(),
            data: text,
            error: code,
            ..Default::default()
        }
    }

    /// Exit notice from `from` to `to`.
    pub fn exit_notice(to: Address, from: Address, code: i32) -> Self {
        Self {
            to: to.value(),
            from: from.value(),
            exiting: true,
            exit: code,
            ..Default::default()
        }
    }

    pub fn to_addr(&self) -> Address {
        Address::new(self.to)
    }

    pub fn from_addr(&self) -> Address {
        Address::new(self.from)
    }

    pub fn spawn_addr(&self) -> Address {
        Address::new(self.spawn_address)
    }

    /// Classify the envelope. Spawn wins over everything else, matching the
    /// dispatch order of the coordinator.
    pub fn kind(&self) -> MessageKind {
        if !self.spawn.is_empty() {
            MessageKind::Spawn
        } else if self.startup.is_some() || self.your_address != 0 {
            MessageKind::Handshake
        } else if self.exiting {
            MessageKind::Exit
        } else if self.error != 0 {
            MessageKind::Error
        } else {
            MessageKind::Data
        }
    }

    /// Same envelope with `to` and `from` exchanged, body replaced.
    pub fn reply(&self, data: Vec<u8>) -> Self {
        Self {
            to: self.from,
            from: self.to,
            data,
            ..Default::default()
        }
    }
}

/// One submessage of the HTTP sub-protocol.
///
/// The first request submessage carries method, uri, version and headers;
/// later ones carry body chunks. The first response submessage carries
/// status and headers; the one with `eof` set ends the stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Http {
    #[prost(int32, tag = "1")]
    pub proto_major: i32,
    #[prost(int32, tag = "2")]
    pub proto_minor: i32,
    #[prost(string, tag = "3")]
    pub uri: String,
    #[prost(map = "string, message", tag = "4")]
    pub headers: HashMap<String, HeaderList>,
    #[prost(enumeration = "Method", tag = "5")]
    pub method: i32,
    #[prost(bytes = "vec", tag = "6")]
    pub body: Vec<u8>,
    #[prost(int32, tag = "7")]
    pub status: i32,
    #[prost(bool, tag = "8")]
    pub eof: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeaderList {
    #[prost(string, repeated, tag = "1")]
    pub header: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Method {
    Get = 0,
    Put = 1,
    Post = 2,
    Delete = 3,
    Patch = 4,
    Options = 5,
    Trace = 6,
    Connect = 7,
    Head = 8,
}

impl Method {
    /// Map an HTTP method name; `None` for methods the schema lacks.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(Self::Get),
            "PUT" => Some(Self::Put),
            "POST" => Some(Self::Post),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "OPTIONS" => Some(Self::Options),
            "TRACE" => Some(Self::Trace),
            "CONNECT" => Some(Self::Connect),
            "HEAD" => Some(Self::Head),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Head => "HEAD",
        }
    }
}

impl Http {
    /// A bare body chunk.
    pub fn chunk(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// The end-of-stream marker.
    pub fn end() -> Self {
        Self {
            eof: true,
            ..Default::default()
        }
    }
}
