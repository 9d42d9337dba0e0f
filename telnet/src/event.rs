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

//! Decoded negotiation events surfaced by the session

use crate::protocol::TelnetOption;

/// Semantic events decoded from inbound control traffic.
///
/// These carry the meaning of a completed negotiation or subnegotiation
/// upward; they never carry raw wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// The peer reported its terminal dimensions
    WindowSize { width: u16, height: u16 },

    /// The peer reported its terminal type
    TerminalType { terminal_type: String },

    /// An option finished negotiating and is now active
    OptionEnabled(TelnetOption),

    /// The peer declined an option we requested; it stays inactive and is
    /// never retried automatically
    OptionRefused(TelnetOption),
}
