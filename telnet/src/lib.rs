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

//! Wayfarer Telnet Protocol Engine
//!
//! This library implements the telnet option negotiation machinery used by
//! the Wayfarer gateway: per-option state machines, the session that routes
//! inbound control sequences and serializes outbound tokens, and the
//! MCCP2-style zlib codec that transparently compresses the wire stream
//! once negotiated. It performs no I/O of its own.

pub mod compress;
pub mod error;
pub mod event;
pub mod option;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use compress::CompressionCodec;
pub use error::TelnetError;
pub use event::TelnetEvent;
pub use option::{
    CompressionServer, EchoServer, NawsClient, OptionState, SuppressGoAheadServer,
    TelnetOptionHandler, TerminalTypeClient,
};
pub use protocol::{OutboundChunk, TelnetCommand, TelnetOption, TelnetToken};
pub use session::{SessionInput, TelnetSession};
