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

//! Gateway error types

use thiserror::Error;
use wayfarer_telnet::TelnetError;

/// Errors terminal to a single connection.
///
/// These never escalate past the connection that raised them; the registry
/// and client session absorb them as death events.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The socket closed or reset underneath the connection
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// The protocol engine failed, for example on a corrupt compressed
    /// stream
    #[error(transparent)]
    Telnet(#[from] TelnetError),
}
