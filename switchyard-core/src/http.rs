// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! HTTP adapter.
//!
//! Every request gets a fresh gateway and a freshly spawned function. The
//! request is serialized into [`Http`] frames written through the gateway,
//! and the function's response frames are streamed back to the client until
//! the end-of-stream marker. When the exchange ends, one way or another, the
//! function is stopped and the gateway removed.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    Router,
};
use futures::StreamExt;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::actor::GatewayStream;
use crate::codec::{read_frame, write_frame};
use crate::config::{GatewayConfig, Resolved};
use crate::coordinator::Coordinator;
use crate::error::{SwitchyardError, SwitchyardResult};
use crate::metrics::HTTP_EXCHANGES;
use crate::proto::{HeaderList, Http, Method};
use crate::types::Address;

#[derive(Clone)]
struct AdapterState {
    coordinator: Arc<Coordinator>,
    gateway: Arc<GatewayConfig>,
}

/// Router serving every path of one gateway.
pub fn router(coordinator: Arc<Coordinator>, gateway: GatewayConfig) -> Router {
    let state = AdapterState {
        coordinator,
        gateway: Arc::new(gateway),
    };

    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Listen on the gateway's port on all interfaces.
pub async fn serve_gateway(
    coordinator: Arc<Coordinator>,
    gateway: GatewayConfig,
) -> SwitchyardResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], gateway.port.value()));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SwitchyardError::Io {
            context: "binding gateway listener",
            source: e,
        })?;
    serve_on(listener, coordinator, gateway).await
}

/// Serve one gateway on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    gateway: GatewayConfig,
) -> SwitchyardResult<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Gateway listening on http://{}", addr);
    }
    axum::serve(listener, router(coordinator, gateway))
        .await
        .map_err(|e| SwitchyardError::Io {
            context: "serving gateway",
            source: e,
        })
}

async fn handle_request(State(state): State<AdapterState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let function = match state.gateway.resolve(&path) {
        Some(Resolved::Function(name)) => name.clone(),
        Some(Resolved::Files { prefix, dir }) => {
            return serve_files(prefix, dir, request).await;
        }
        None => {
            return (StatusCode::NOT_FOUND, "no function serves this path\n").into_response();
        }
    };
    if Method::from_name(request.method().as_str()).is_none() {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    tracing::info!(function = %function, path = %path, "Processing request");

    match exchange(&state, function.as_str(), request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(function = %function, error = %e, "HTTP exchange failed");
            let outcome = match e {
                SwitchyardError::Timeout { .. } => "timeout",
                _ => "error",
            };
            HTTP_EXCHANGES
                .with_label_values(&[function.as_str(), outcome])
                .inc();
            error_response(&e)
        }
    }
}

/// Serve a static directory mounted at `prefix`. The prefix is stripped so
/// `/assets/site.css` under `/assets/` reads `<dir>/site.css`.
async fn serve_files(prefix: &str, dir: &Path, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let rest = parts.uri.path().strip_prefix(prefix).unwrap_or_default();
    let rewritten = match parts.uri.query() {
        Some(query) => format!("/{}?{}", rest.trim_start_matches('/'), query),
        None => format!("/{}", rest.trim_start_matches('/')),
    };
    parts.uri = match rewritten.parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::debug!(uri = %rewritten, error = %e, "Rejected file path");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    tracing::debug!(dir = %dir.display(), path = %parts.uri.path(), "Serving file");
    match ServeDir::new(dir)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

fn error_response(error: &SwitchyardError) -> Response {
    let status = match error {
        SwitchyardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{error}\n")).into_response()
}

/// Tears down a request's actors when dropped.
struct ExchangeGuard {
    coordinator: Arc<Coordinator>,
    gateway: Address,
    function: Option<Address>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if let Some(function) = self.function.take() {
            if let Err(e) = self.coordinator.stop_function(function) {
                tracing::debug!(address = %function, error = %e, "Function already gone");
            }
        }
        self.coordinator.remove_gateway(self.gateway);
    }
}

async fn exchange(
    state: &AdapterState,
    function_name: &str,
    request: Request,
) -> SwitchyardResult<Response> {
    let coordinator = &state.coordinator;
    let timeout = coordinator.settings().response_timeout;

    let gateway = coordinator.new_gateway();
    let mut guard = ExchangeGuard {
        coordinator: Arc::clone(coordinator),
        gateway: gateway.address(),
        function: None,
    };

    let function = coordinator.spawn_function(
        function_name,
        gateway.address(),
        None,
        coordinator.store_descriptors(),
    )?;
    guard.function = Some(function.address());
    gateway.attach_fn(&function);

    let mut stream = GatewayStream::new(gateway);
    let (parts, body) = request.into_parts();
    write_frame(&mut stream, &dump_request(&parts)).await?;

    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| SwitchyardError::Io {
            context: "reading request body",
            source: io::Error::other(e),
        })?;
        if !chunk.is_empty() {
            write_frame(&mut stream, &Http::chunk(chunk.to_vec())).await?;
        }
    }
    write_frame(&mut stream, &Http::end()).await?;

    let head = next_frame(&mut stream, timeout).await?;
    let mut builder = Response::builder().status(status_code(head.status)?);
    if let Some(headers) = builder.headers_mut() {
        for (name, values) in &head.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(header = %name, "Dropping invalid response header");
                continue;
            };
            if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
                continue;
            }
            for value in &values.header {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.append(name.clone(), value);
                    }
                    Err(_) => {
                        tracing::warn!(header = %name, "Dropping invalid response header value")
                    }
                }
            }
        }
    }

    let body = ResponseBody {
        stream,
        guard,
        timeout,
        function: function_name.to_string(),
        pending: Some(head.body).filter(|b| !b.is_empty()).map(Bytes::from),
        done: head.eof,
    };
    if body.done {
        HTTP_EXCHANGES.with_label_values(&[function_name, "ok"]).inc();
    }

    builder
        .body(Body::from_stream(body.into_stream()))
        .map_err(|e| SwitchyardError::Io {
            context: "building response",
            source: io::Error::other(e),
        })
}

/// Response frames still to be forwarded to the client. Owns the
/// [`ExchangeGuard`], so the function lives exactly as long as the body.
struct ResponseBody {
    stream: GatewayStream,
    guard: ExchangeGuard,
    timeout: Option<Duration>,
    function: String,
    pending: Option<Bytes>,
    done: bool,
}

impl ResponseBody {
    fn into_stream(self) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut body| async move {
            if let Some(chunk) = body.pending.take() {
                return Some((Ok(chunk), body));
            }
            if body.done {
                return None;
            }
            loop {
                match next_frame(&mut body.stream, body.timeout).await {
                    Ok(frame) => {
                        if frame.eof {
                            body.done = true;
                            HTTP_EXCHANGES
                                .with_label_values(&[body.function.as_str(), "ok"])
                                .inc();
                            if frame.body.is_empty() {
                                return None;
                            }
                        } else if frame.body.is_empty() {
                            continue;
                        }
                        return Some((Ok(Bytes::from(frame.body)), body));
                    }
                    Err(e) => {
                        tracing::warn!(
                            function = %body.function,
                            gateway = %body.guard.gateway,
                            error = %e,
                            "Response stream aborted"
                        );
                        HTTP_EXCHANGES
                            .with_label_values(&[body.function.as_str(), "aborted"])
                            .inc();
                        body.done = true;
                        return Some((Err(io::Error::other(e.to_string())), body));
                    }
                }
            }
        })
    }
}

async fn next_frame(stream: &mut GatewayStream, timeout: Option<Duration>) -> SwitchyardResult<Http> {
    let read = read_frame::<_, Http>(stream);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| SwitchyardError::Timeout {
                what: "function response",
                elapsed_ms: limit.as_millis() as u64,
            })?
            .map_err(Into::into),
        None => Ok(read.await?),
    }
}

fn status_code(status: i32) -> SwitchyardResult<StatusCode> {
    if status == 0 {
        return Ok(StatusCode::OK);
    }
    u16::try_from(status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| SwitchyardError::Io {
            context: "function response status",
            source: io::Error::new(io::ErrorKind::InvalidData, format!("invalid status {status}")),
        })
}

/// Serialize a request head into the first request frame.
///
/// Header names are canonicalized. `Host` is always present; hop-level
/// framing headers are left out because the body travels as frames.
pub fn dump_request(parts: &Parts) -> Http {
    let (proto_major, proto_minor) = match parts.version {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    };

    let mut headers: HashMap<String, HeaderList> = HashMap::new();
    for (name, value) in &parts.headers {
        if name == header::TRANSFER_ENCODING || name == header::TRAILER {
            continue;
        }
        let Ok(value) = value.to_str() else {
            tracing::debug!(header = %name, "Skipping non-text request header");
            continue;
        };
        headers
            .entry(canonical_header_name(name.as_str()))
            .or_default()
            .header
            .push(value.to_string());
    }
    if !headers.contains_key("Host") {
        if let Some(host) = parts.uri.authority() {
            headers.insert(
                "Host".to_string(),
                HeaderList {
                    header: vec![host.to_string()],
                },
            );
        }
    }

    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Http {
        proto_major,
        proto_minor,
        uri,
        headers,
        method: Method::from_name(parts.method.as_str()).unwrap_or(Method::Get) as i32,
        ..Default::default()
    }
}

/// `content-type` becomes `Content-Type`.
fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}
