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

//! Protocol engine error types

use thiserror::Error;

/// Errors raised by the telnet protocol engine.
///
/// Malformed negotiation traffic is recovered from internally and never
/// surfaces here; only the compression codec can fail, and a corrupt
/// inbound stream is terminal for the owning connection.
#[derive(Error, Debug)]
pub enum TelnetError {
    /// Compressing outbound bytes failed
    #[error("compression failure: {0}")]
    Compression(String),

    /// The inbound compressed stream cannot be decoded or resynchronized
    #[error("corrupt compressed stream: {0}")]
    Corrupt(String),
}
