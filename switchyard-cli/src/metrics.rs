// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Plain-text Prometheus endpoint for the coordinator's counters.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Start the metrics server in a background task.
pub fn start_metrics_server(port: u16) {
    switchyard_core::metrics::init();

    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{}", port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                tracing::info!("Metrics server starting on {}", addr);
                loop {
                    if let Ok((mut socket, _)) = listener.accept().await {
                        tokio::spawn(async move {
                            let body = switchyard_core::metrics::render();
                            let response = format!(
                                "HTTP/1.0 200 OK\r\nConnection: close\r\nContent-Length: {}\r\nContent-Type: text/plain; version=0.0.4\r\n\r\n{}",
                                body.len(),
                                body
                            );
                            if let Err(e) = socket.write_all(response.as_bytes()).await {
                                tracing::debug!(error = %e, "Metrics client went away");
                            }
                            let _ = socket.flush().await;
                        });
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to bind metrics server: {}", e);
            }
        }
    });
}
