// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `switchyard up` command - Start the coordinator.
//!
//! Binds the IPC socket, starts one HTTP server per configured gateway and
//! runs until Ctrl-C.

use switchyard_core::{http, ConfigLoader, Coordinator};

use crate::metrics;

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting coordinator");

    // Fail fast on invalid config
    let config = ConfigLoader::load_file(config_path)?;
    tracing::info!(
        functions = config.functions.len(),
        stores = config.stores.len(),
        gateways = config.gateways.len(),
        "Configuration validated successfully"
    );

    let coordinator = Coordinator::from_config(&config)?;
    let ipc = coordinator.start()?;

    if let Some(port) = config.coordinator.metrics_port {
        metrics::start_metrics_server(port.value());
    }

    println!("▶ Coordinator socket: {}", config.coordinator.socket_path.display());
    let mut servers = Vec::with_capacity(config.gateways.len());
    for gateway in &config.gateways {
        println!("▶ Gateway: http://localhost:{}", gateway.port);
        for route in &gateway.routes {
            println!("    {} → {}", route.path, route.target);
        }
        if let Some(function) = &gateway.function {
            println!("    * → {}", function);
        }

        let coordinator = coordinator.clone();
        let gateway = gateway.clone();
        servers.push(tokio::spawn(async move {
            let port = gateway.port;
            if let Err(e) = http::serve_gateway(coordinator, gateway).await {
                tracing::error!(port = %port, error = %e, "Gateway stopped");
            }
        }));
    }

    println!();
    println!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    println!();
    println!("Shutting down...");
    tracing::info!("Shutting down coordinator");
    for server in servers {
        server.abort();
    }
    ipc.abort();
    if let Err(e) = std::fs::remove_file(&config.coordinator.socket_path) {
        tracing::debug!(error = %e, "Socket already removed");
    }

    Ok(())
}
