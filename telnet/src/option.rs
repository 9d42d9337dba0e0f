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

//! Per-option negotiation state machines
//!
//! Every negotiable capability owns one state machine tracking the
//! inactive/negotiating/active cycle. Concrete handlers layer option
//! semantics (window size decoding, terminal type requests, compression
//! arming) on top of a shared negotiation core.

use crate::event::TelnetEvent;
use crate::protocol::{TTYPE_IS, TTYPE_SEND, TelnetCommand, TelnetOption, TelnetToken};

/// Activation state of a single option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionState {
    /// Not negotiated, or refused by the peer
    Inactive,
    /// Activation requested, awaiting the peer's answer
    Negotiating,
    /// Both sides agreed; subnegotiations are accepted
    Active,
}

/// Which side performs the option.
///
/// A `Local` option is offered by this server (WILL, answered by DO/DONT).
/// A `Remote` option is requested of the peer (DO, answered by WILL/WONT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRole {
    Local,
    Remote,
}

/// Result of feeding a peer negotiation command to the core machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The option just became active
    Activated,
    /// The peer declined while we were negotiating
    Refused,
    /// The peer withdrew an active option
    Deactivated,
    /// No state change of interest
    None,
}

/// Shared negotiation core embedded in every concrete handler
#[derive(Debug)]
struct Negotiation {
    option: TelnetOption,
    role: OptionRole,
    state: OptionState,
}

impl Negotiation {
    fn new(option: TelnetOption, role: OptionRole) -> Self {
        Self {
            option,
            role,
            state: OptionState::Inactive,
        }
    }

    /// The command that requests activation from our side
    fn request_command(&self) -> TelnetCommand {
        match self.role {
            OptionRole::Local => TelnetCommand::WILL,
            OptionRole::Remote => TelnetCommand::DO,
        }
    }

    /// The command that acknowledges refusal from our side
    fn refuse_command(&self) -> TelnetCommand {
        match self.role {
            OptionRole::Local => TelnetCommand::WONT,
            OptionRole::Remote => TelnetCommand::DONT,
        }
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        match self.state {
            OptionState::Inactive => {
                self.state = OptionState::Negotiating;
                vec![TelnetToken::Negotiation(
                    self.request_command(),
                    self.option.to_byte(),
                )]
            }
            // Already negotiating or active: nothing to do
            OptionState::Negotiating | OptionState::Active => Vec::new(),
        }
    }

    fn receive(&mut self, command: TelnetCommand) -> (Vec<TelnetToken>, Outcome) {
        let affirm = match self.role {
            OptionRole::Local => TelnetCommand::DO,
            OptionRole::Remote => TelnetCommand::WILL,
        };
        let refuse = match self.role {
            OptionRole::Local => TelnetCommand::DONT,
            OptionRole::Remote => TelnetCommand::WONT,
        };

        if command == affirm {
            match self.state {
                OptionState::Negotiating => {
                    self.state = OptionState::Active;
                    (Vec::new(), Outcome::Activated)
                }
                OptionState::Inactive => {
                    // Peer-initiated activation: acknowledge and accept
                    self.state = OptionState::Active;
                    (
                        vec![TelnetToken::Negotiation(
                            self.request_command(),
                            self.option.to_byte(),
                        )],
                        Outcome::Activated,
                    )
                }
                OptionState::Active => (Vec::new(), Outcome::None),
            }
        } else if command == refuse {
            match self.state {
                OptionState::Negotiating => {
                    self.state = OptionState::Inactive;
                    (Vec::new(), Outcome::Refused)
                }
                OptionState::Active => {
                    self.state = OptionState::Inactive;
                    (
                        vec![TelnetToken::Negotiation(
                            self.refuse_command(),
                            self.option.to_byte(),
                        )],
                        Outcome::Deactivated,
                    )
                }
                OptionState::Inactive => (
                    vec![TelnetToken::Negotiation(
                        self.refuse_command(),
                        self.option.to_byte(),
                    )],
                    Outcome::None,
                ),
            }
        } else {
            // WILL/WONT for a local option (or DO/DONT for a remote one) is
            // the peer talking about the wrong side; ignore it
            (Vec::new(), Outcome::None)
        }
    }

    fn outcome_events(&self, outcome: Outcome) -> Vec<TelnetEvent> {
        match outcome {
            Outcome::Activated => vec![TelnetEvent::OptionEnabled(self.option)],
            Outcome::Refused => vec![TelnetEvent::OptionRefused(self.option)],
            Outcome::Deactivated | Outcome::None => Vec::new(),
        }
    }
}

/// One installed option: negotiation plus option-specific semantics.
///
/// `receive_subnegotiation` is only invoked by the session while the option
/// is active; malformed payloads are dropped without error.
pub trait TelnetOptionHandler: Send {
    /// The option this handler negotiates
    fn option(&self) -> TelnetOption;

    /// Current activation state
    fn state(&self) -> OptionState;

    /// Request activation; a no-op while negotiating or active
    fn activate(&mut self) -> Vec<TelnetToken>;

    /// Feed a peer WILL/WONT/DO/DONT aimed at this option
    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>);

    /// Feed a completed subnegotiation payload (escaping already removed)
    fn receive_subnegotiation(&mut self, data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>);

    /// Arm outbound compression; only the compression option responds
    fn begin_compression(&mut self) -> Vec<TelnetToken> {
        Vec::new()
    }
}

/// Server-side echo option (we echo, the peer stops local echo)
pub struct EchoServer {
    negotiation: Negotiation,
}

impl EchoServer {
    pub fn new() -> Self {
        Self {
            negotiation: Negotiation::new(TelnetOption::Echo, OptionRole::Local),
        }
    }
}

impl Default for EchoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetOptionHandler for EchoServer {
    fn option(&self) -> TelnetOption {
        self.negotiation.option
    }

    fn state(&self) -> OptionState {
        self.negotiation.state
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        self.negotiation.activate()
    }

    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        let (tokens, outcome) = self.negotiation.receive(command);
        let events = self.negotiation.outcome_events(outcome);
        (tokens, events)
    }

    fn receive_subnegotiation(&mut self, _data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        // Echo defines no subnegotiation
        (Vec::new(), Vec::new())
    }
}

/// Server-side suppress-go-ahead option
pub struct SuppressGoAheadServer {
    negotiation: Negotiation,
}

impl SuppressGoAheadServer {
    pub fn new() -> Self {
        Self {
            negotiation: Negotiation::new(TelnetOption::SuppressGoAhead, OptionRole::Local),
        }
    }
}

impl Default for SuppressGoAheadServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetOptionHandler for SuppressGoAheadServer {
    fn option(&self) -> TelnetOption {
        self.negotiation.option
    }

    fn state(&self) -> OptionState {
        self.negotiation.state
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        self.negotiation.activate()
    }

    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        let (tokens, outcome) = self.negotiation.receive(command);
        let events = self.negotiation.outcome_events(outcome);
        (tokens, events)
    }

    fn receive_subnegotiation(&mut self, _data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        (Vec::new(), Vec::new())
    }
}

/// Client-side NAWS option: the peer reports its window size as it changes
pub struct NawsClient {
    negotiation: Negotiation,
}

impl NawsClient {
    pub fn new() -> Self {
        Self {
            negotiation: Negotiation::new(TelnetOption::NAWS, OptionRole::Remote),
        }
    }
}

impl Default for NawsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetOptionHandler for NawsClient {
    fn option(&self) -> TelnetOption {
        self.negotiation.option
    }

    fn state(&self) -> OptionState {
        self.negotiation.state
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        self.negotiation.activate()
    }

    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        let (tokens, outcome) = self.negotiation.receive(command);
        let events = self.negotiation.outcome_events(outcome);
        (tokens, events)
    }

    fn receive_subnegotiation(&mut self, data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        match crate::protocol::parse_window_size(data) {
            Some((width, height)) => {
                (Vec::new(), vec![TelnetEvent::WindowSize { width, height }])
            }
            // Short payload: drop it, keep whatever size we last saw
            None => (Vec::new(), Vec::new()),
        }
    }
}

/// Client-side terminal type option.
///
/// Once the peer agrees, the handler immediately issues the SEND request so
/// the type report arrives without further prompting.
pub struct TerminalTypeClient {
    negotiation: Negotiation,
}

impl TerminalTypeClient {
    pub fn new() -> Self {
        Self {
            negotiation: Negotiation::new(TelnetOption::TerminalType, OptionRole::Remote),
        }
    }

    /// Build the subnegotiation asking the peer to report its type
    pub fn request_terminal_type() -> TelnetToken {
        TelnetToken::Subnegotiation(TelnetOption::TerminalType, vec![TTYPE_SEND])
    }
}

impl Default for TerminalTypeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetOptionHandler for TerminalTypeClient {
    fn option(&self) -> TelnetOption {
        self.negotiation.option
    }

    fn state(&self) -> OptionState {
        self.negotiation.state
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        self.negotiation.activate()
    }

    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        let (mut tokens, outcome) = self.negotiation.receive(command);
        if outcome == Outcome::Activated {
            tokens.push(Self::request_terminal_type());
        }
        let events = self.negotiation.outcome_events(outcome);
        (tokens, events)
    }

    fn receive_subnegotiation(&mut self, data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        if data.first() != Some(&TTYPE_IS) {
            return (Vec::new(), Vec::new());
        }

        match std::str::from_utf8(&data[1..]) {
            Ok(terminal_type) if !terminal_type.is_empty() => (
                Vec::new(),
                vec![TelnetEvent::TerminalType {
                    terminal_type: terminal_type.to_string(),
                }],
            ),
            // Empty or non-printable report: drop it
            _ => (Vec::new(), Vec::new()),
        }
    }
}

/// Server-side MCCP2 compression option.
///
/// `begin_compression` records intent; once the peer affirms, the handler
/// emits the start-of-stream subnegotiation followed by the in-band marker
/// that flips the outbound codec. The marker frame itself leaves the wire
/// uncompressed; every byte serialized after it is compressed.
pub struct CompressionServer {
    negotiation: Negotiation,
    requested: bool,
    compressing: bool,
}

impl CompressionServer {
    pub fn new() -> Self {
        Self {
            negotiation: Negotiation::new(TelnetOption::MCCP2, OptionRole::Local),
            requested: false,
            compressing: false,
        }
    }

    fn start_tokens(&mut self) -> Vec<TelnetToken> {
        self.compressing = true;
        vec![
            TelnetToken::Subnegotiation(TelnetOption::MCCP2, Vec::new()),
            TelnetToken::BeginCompression,
        ]
    }
}

impl Default for CompressionServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetOptionHandler for CompressionServer {
    fn option(&self) -> TelnetOption {
        self.negotiation.option
    }

    fn state(&self) -> OptionState {
        self.negotiation.state
    }

    fn activate(&mut self) -> Vec<TelnetToken> {
        self.negotiation.activate()
    }

    fn receive_negotiation(
        &mut self,
        command: TelnetCommand,
    ) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        let (mut tokens, outcome) = self.negotiation.receive(command);
        if outcome == Outcome::Activated && self.requested && !self.compressing {
            tokens.extend(self.start_tokens());
        }
        let events = self.negotiation.outcome_events(outcome);
        (tokens, events)
    }

    fn receive_subnegotiation(&mut self, _data: &[u8]) -> (Vec<TelnetToken>, Vec<TelnetEvent>) {
        (Vec::new(), Vec::new())
    }

    fn begin_compression(&mut self) -> Vec<TelnetToken> {
        if self.compressing {
            return Vec::new();
        }
        if self.negotiation.state == OptionState::Active {
            self.start_tokens()
        } else {
            self.requested = true;
            Vec::new()
        }
    }
}
