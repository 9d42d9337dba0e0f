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

//! Wayfarer Gateway Library
//!
//! This library provides the network front end of the Wayfarer terminal
//! server: per-connection telnet negotiation, client session lifecycle
//! management, and the registry that promotes negotiated connections into
//! application-visible sessions.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server;
pub mod shell;
pub mod transport;

// Re-export commonly used types
pub use client::{ClientSession, SessionHandler};
pub use connection::{Connection, ConnectionWriter};
pub use error::GatewayError;
pub use registry::{ConnectionRegistry, HandlerFactory};
pub use server::TelnetServer;
pub use transport::{StreamTransport, TcpTransport, Transport};
