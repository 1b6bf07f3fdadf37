// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `switchyard validate` command - Validate configuration file.

use switchyard_core::ConfigLoader;

fn optional_ms(value: Option<std::time::Duration>) -> String {
    value
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "none".to_string())
}

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let settings = &config.coordinator;
            println!("✓ Configuration is valid");
            println!();
            println!("Coordinator Settings:");
            println!("  Socket:            {}", settings.socket_path.display());
            println!(
                "  Wrapper:           {}",
                settings.wrapper_executable.display()
            );
            println!(
                "  Handshake Timeout: {}",
                optional_ms(settings.handshake_timeout)
            );
            println!(
                "  Response Timeout:  {}",
                optional_ms(settings.response_timeout)
            );
            if let Some(port) = settings.metrics_port {
                println!("  Metrics Port:      {}", port);
            }
            println!();
            println!("Functions ({}):", config.functions.len());
            for func in &config.functions {
                println!("  - {} ({})", func.name, func.artifact.display());
            }
            if !config.stores.is_empty() {
                println!();
                println!("Stores ({}):", config.stores.len());
                for store in &config.stores {
                    println!("  - {} [{}] {}", store.name, store.kind, store.connection);
                }
            }
            if !config.gateways.is_empty() {
                println!();
                println!("Gateways ({}):", config.gateways.len());
                for gateway in &config.gateways {
                    println!("  - port {}", gateway.port);
                    for route in &gateway.routes {
                        println!("      {} → {}", route.path, route.target);
                    }
                    if let Some(function) = &gateway.function {
                        println!("      * → {}", function);
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
