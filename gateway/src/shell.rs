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

//! Minimal hosting shell
//!
//! The gateway core is a library; this handler is the small application
//! the bundled binary installs on each established session. It greets the
//! peer with what negotiation discovered, echoes payload back, and repaints
//! a status line when the terminal is resized.

use crate::client::SessionHandler;
use crate::connection::ConnectionWriter;
use async_trait::async_trait;
use bytes::Bytes;

pub struct EchoShell;

impl EchoShell {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHandler for EchoShell {
    async fn on_ready(
        &mut self,
        connection: &ConnectionWriter,
        terminal_type: &str,
        size: (u16, u16),
    ) {
        connection.write(format!(
            "\r\nWelcome to Wayfarer.\r\nTerminal: {} ({}x{})\r\n> ",
            terminal_type, size.0, size.1
        ));
    }

    async fn on_data(&mut self, connection: &ConnectionWriter, data: &[u8]) {
        connection.write(Bytes::copy_from_slice(data));
    }

    async fn on_window_size(&mut self, connection: &ConnectionWriter, width: u16, height: u16) {
        connection.write(format!("\r\n[resized to {}x{}]\r\n> ", width, height));
    }

    async fn on_close(&mut self) {
        tracing::debug!("shell session closed");
    }
}
