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

//! Telnet accept loop

use crate::registry::ConnectionRegistry;
use crate::transport::TcpTransport;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Telnet server front door: accepts sockets and hands them to the registry
pub struct TelnetServer {
    registry: Arc<ConnectionRegistry>,
}

impl TelnetServer {
    /// Create a new telnet server over an existing registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Run the accept loop until the listener fails
    pub async fn run(self, listener: TcpListener) {
        tracing::info!("Telnet server accepting connections...");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::info!("New telnet connection from {}", addr);
                    self.registry.on_accept(TcpTransport::new(stream)).await;
                }
                Err(err) => {
                    tracing::error!("Error accepting telnet connection: {}", err);
                }
            }
        }
    }
}
