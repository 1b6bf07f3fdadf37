// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Minimal function wrapper used by the integration tests.
//!
//! The behavior is picked from the artifact's file name:
//! - `echo` sends every message's data back to its sender,
//! - `http-echo` answers the HTTP sub-protocol with the request body,
//! - `http-truncate` promises a longer body than it sends, then exits,
//! - `http-silent` reads requests and never answers,
//! - `http-crash` exits with status 3 as soon as a request arrives,
//! - `kv` stores a value through the KV service, reads it back and hands it
//!   to its parent.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use switchyard_core::codec::{encode_frame, FrameBuffer};
use switchyard_core::error::CodecError;
use switchyard_core::kv::write_key_and_value;
use switchyard_core::proto::{HeaderList, Http, Message, Method};
use switchyard_core::{Address, FunctionClient, SwitchyardError, SwitchyardResult};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();

    let mut client = match FunctionClient::connect_from_env().await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Handshake failed");
            return ExitCode::FAILURE;
        }
    };

    let module = Path::new(&client.startup().module)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(address = %client.address(), module = %module, "Function started");

    let result = match module.as_str() {
        "echo" => echo(&mut client).await,
        "http-echo" => http_echo(&mut client).await,
        "http-truncate" => http_truncate(&mut client).await,
        "http-silent" => drain(&mut client).await,
        "http-crash" => {
            if let Err(e) = client.recv().await {
                tracing::warn!(error = %e, "No request before exiting");
            }
            return ExitCode::from(3);
        }
        "kv" => kv_round_trip(&mut client).await,
        other => {
            tracing::error!(module = %other, "Unknown module");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Function failed");
            ExitCode::FAILURE
        }
    }
}

/// Runs until the coordinator closes the connection.
async fn echo(client: &mut FunctionClient) -> SwitchyardResult<()> {
    loop {
        let msg = match client.recv().await {
            Ok(msg) => msg,
            Err(CodecError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if msg.exiting || msg.error != 0 {
            continue;
        }
        client.send(msg.from_addr(), msg.data).await?;
    }
}

/// Runs until the coordinator closes the connection, ignoring everything.
async fn drain(client: &mut FunctionClient) -> SwitchyardResult<()> {
    loop {
        match client.recv().await {
            Ok(_) => continue,
            Err(CodecError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

type PendingRequests = HashMap<Address, (FrameBuffer, Option<Http>, Vec<u8>)>;

/// Next complete request: its sender, head and body. `None` once the
/// coordinator closes the connection.
async fn next_request(
    client: &mut FunctionClient,
    pending: &mut PendingRequests,
) -> SwitchyardResult<Option<(Address, Http, Vec<u8>)>> {
    loop {
        let msg = match client.recv().await {
            Ok(msg) => msg,
            Err(CodecError::ConnectionClosed) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if msg.exiting || msg.error != 0 {
            continue;
        }

        let sender = msg.from_addr();
        let entry = pending.entry(sender).or_default();
        entry.0.extend(&msg.data);

        let mut finished = false;
        while let Some(frame) = entry.0.next_frame::<Http>()? {
            if entry.1.is_none() {
                entry.1 = Some(frame);
                continue;
            }
            entry.2.extend_from_slice(&frame.body);
            if frame.eof {
                finished = true;
                break;
            }
        }
        if !finished {
            continue;
        }

        if let Some((_, Some(head), body)) = pending.remove(&sender) {
            return Ok(Some((sender, head, body)));
        }
    }
}

/// Answer every request with status 200, the body echoed back and a few
/// headers describing the request.
async fn http_echo(client: &mut FunctionClient) -> SwitchyardResult<()> {
    let mut pending = PendingRequests::new();
    while let Some((sender, head, body)) = next_request(client, &mut pending).await? {
        for frame in http_response(&head, body) {
            client.send(sender, encode_frame(&frame)?).await?;
        }
    }
    Ok(())
}

/// Announce 1024 bytes, send seven and exit without the end marker.
async fn http_truncate(client: &mut FunctionClient) -> SwitchyardResult<()> {
    let mut pending = PendingRequests::new();
    let Some((sender, _, _)) = next_request(client, &mut pending).await? else {
        return Ok(());
    };

    let mut headers = HashMap::new();
    headers.insert(
        "Content-Length".to_string(),
        HeaderList {
            header: vec!["1024".to_string()],
        },
    );
    let head = Http {
        status: 200,
        headers,
        ..Default::default()
    };
    client.send(sender, encode_frame(&head)?).await?;
    client
        .send(sender, encode_frame(&Http::chunk(b"partial".to_vec()))?)
        .await?;

    // Let the adapter flush what it has before the stream breaks.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.exit(1).await?;
    Ok(())
}

fn http_response(head: &Http, body: Vec<u8>) -> [Http; 3] {
    let method = Method::try_from(head.method)
        .map(|m| m.name())
        .unwrap_or("UNKNOWN");
    let mut headers = HashMap::new();
    for (name, value) in [
        ("Content-Type", "text/plain".to_string()),
        ("Content-Length", body.len().to_string()),
        ("X-Echo-Method", method.to_string()),
        ("X-Echo-Uri", head.uri.clone()),
    ] {
        headers.insert(name.to_string(), HeaderList { header: vec![value] });
    }

    [
        Http {
            status: 200,
            headers,
            ..Default::default()
        },
        Http::chunk(body),
        Http::end(),
    ]
}

/// Set `greeting` through one KV actor, read it through another and send
/// the value to the parent.
async fn kv_round_trip(client: &mut FunctionClient) -> SwitchyardResult<()> {
    let setter = client.spawn("switchyard/kv/set").await?;
    let request = write_key_and_value(b"greeting", b"hello from kv")?;
    client.send(setter, request).await?;
    reply_from(client, setter).await?;

    let getter = client.spawn("switchyard/kv/get").await?;
    client.send(getter, b"greeting".to_vec()).await?;
    let value = reply_from(client, getter).await?;

    let parent = client.parent();
    client.send(parent, value).await?;
    client.exit(0).await?;
    Ok(())
}

async fn reply_from(client: &mut FunctionClient, from: Address) -> SwitchyardResult<Vec<u8>> {
    loop {
        let msg: Message = client.recv().await?;
        if msg.from_addr() != from {
            continue;
        }
        if msg.error != 0 {
            return Err(SwitchyardError::ErrorReply {
                from,
                code: msg.error,
                message: String::from_utf8_lossy(&msg.data).into_owned(),
            });
        }
        return Ok(msg.data);
    }
}
