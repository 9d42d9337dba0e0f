//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wayfarer_gateway::config::Arguments;
use wayfarer_gateway::registry::ConnectionRegistry;
use wayfarer_gateway::server::TelnetServer;
use wayfarer_gateway::shell::EchoShell;

fn main() {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    let concurrency = arguments.concurrency();
    info!(
        "Starting Wayfarer Gateway with {} worker thread(s)...",
        concurrency
    );

    // The worker pool is the tokio runtime itself
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(concurrency)
        .enable_all()
        .build()
        .expect("Unable to build the tokio runtime");

    runtime.block_on(async move {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, arguments.port()));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Unable to bind to telnet port");

        info!("Telnet Server listening on {}", addr);

        let registry = ConnectionRegistry::new(Box::new(|| Box::new(EchoShell::new())));
        let server = TelnetServer::new(registry.clone());

        tokio::select! {
            _ = server.run(listener) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down Wayfarer Gateway");
                registry.disconnect_all().await;
            }
        }
    });
}
