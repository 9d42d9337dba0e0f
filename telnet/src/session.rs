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

//! Telnet session: option composition and stream framing
//!
//! The session owns the installed option handlers, splits inbound bytes
//! into payload and control sequences, and serializes outbound tokens into
//! wire chunks. It is transport-agnostic: callers write the returned bytes
//! and feed reads back in, in any chunking the transport produces. Control
//! sequences that span a read boundary are buffered and completed on the
//! next call.

use crate::event::TelnetEvent;
use crate::option::{OptionState, TelnetOptionHandler};
use crate::protocol::{
    OutboundChunk, TelnetCommand, TelnetOption, TelnetToken, build_negotiation,
    build_subnegotiation,
};

/// Result of feeding inbound bytes through [`TelnetSession::receive`]
#[derive(Debug, Default)]
pub struct SessionInput {
    /// Literal payload bytes, in arrival order, escaping removed
    pub data: Vec<u8>,

    /// Tokens that must be sent back to the peer immediately
    pub replies: Vec<TelnetToken>,

    /// Decoded negotiation events
    pub events: Vec<TelnetEvent>,
}

/// Scanner position, carried across receive calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Literal payload
    Ground,
    /// Saw IAC, awaiting a command byte
    Iac,
    /// Saw IAC WILL/WONT/DO/DONT, awaiting the option byte
    Negotiation(TelnetCommand),
    /// Saw IAC SB, awaiting the option byte
    SubnegotiationOption,
    /// Collecting subnegotiation payload for the given option byte
    Subnegotiation(u8),
    /// Saw IAC inside a subnegotiation payload
    SubnegotiationIac(u8),
}

/// A telnet session composed of installed option handlers.
///
/// Installation order fixes dispatch precedence; each control sequence is
/// claimed by exactly one installed handler.
pub struct TelnetSession {
    options: Vec<Box<dyn TelnetOptionHandler>>,
    parser: ParserState,
    subnegotiation_buffer: Vec<u8>,
}

impl TelnetSession {
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
            parser: ParserState::Ground,
            subnegotiation_buffer: Vec::new(),
        }
    }

    /// Install an option handler at the end of the dispatch list
    pub fn install(&mut self, handler: Box<dyn TelnetOptionHandler>) {
        self.options.push(handler);
    }

    /// Request activation of an installed option
    pub fn activate(&mut self, option: TelnetOption) -> Vec<TelnetToken> {
        for handler in &mut self.options {
            if handler.option() == option {
                return handler.activate();
            }
        }
        Vec::new()
    }

    /// Current state of an installed option
    pub fn option_state(&self, option: TelnetOption) -> Option<OptionState> {
        self.options
            .iter()
            .find(|handler| handler.option() == option)
            .map(|handler| handler.state())
    }

    /// Arm outbound compression on whichever installed option supports it
    pub fn begin_compression(&mut self) -> Vec<TelnetToken> {
        let mut tokens = Vec::new();
        for handler in &mut self.options {
            tokens.extend(handler.begin_compression());
        }
        tokens
    }

    /// Serialize tokens into wire chunks, preserving caller order.
    ///
    /// The result is split at compression boundaries so the codec can flip
    /// the compressor between chunks rather than mid-buffer.
    pub fn send(&self, tokens: Vec<TelnetToken>) -> Vec<OutboundChunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<u8> = Vec::new();

        for token in tokens {
            match token {
                TelnetToken::Data(data) => {
                    for &byte in data.iter() {
                        current.push(byte);
                        if byte == TelnetCommand::IAC.to_byte() {
                            current.push(byte);
                        }
                    }
                }
                TelnetToken::Command(command) => {
                    current.push(TelnetCommand::IAC.to_byte());
                    current.push(command.to_byte());
                }
                TelnetToken::Negotiation(command, option) => {
                    current.extend(build_negotiation(command, option));
                }
                TelnetToken::Subnegotiation(option, data) => {
                    current.extend(build_subnegotiation(option, &data));
                }
                TelnetToken::BeginCompression => {
                    if !current.is_empty() {
                        chunks.push(OutboundChunk::Bytes(std::mem::take(&mut current)));
                    }
                    chunks.push(OutboundChunk::BeginCompression);
                }
            }
        }

        if !current.is_empty() {
            chunks.push(OutboundChunk::Bytes(current));
        }

        chunks
    }

    /// Scan inbound bytes, routing control sequences to the installed
    /// options and accumulating literal payload.
    pub fn receive(&mut self, bytes: &[u8]) -> SessionInput {
        let mut input = SessionInput::default();

        for &byte in bytes {
            match self.parser {
                ParserState::Ground => {
                    if byte == TelnetCommand::IAC.to_byte() {
                        self.parser = ParserState::Iac;
                    } else {
                        input.data.push(byte);
                    }
                }
                ParserState::Iac => self.handle_iac(byte, &mut input),
                ParserState::Negotiation(command) => {
                    self.dispatch_negotiation(command, byte, &mut input);
                    self.parser = ParserState::Ground;
                }
                ParserState::SubnegotiationOption => {
                    self.subnegotiation_buffer.clear();
                    self.parser = ParserState::Subnegotiation(byte);
                }
                ParserState::Subnegotiation(option) => {
                    if byte == TelnetCommand::IAC.to_byte() {
                        self.parser = ParserState::SubnegotiationIac(option);
                    } else {
                        self.subnegotiation_buffer.push(byte);
                    }
                }
                ParserState::SubnegotiationIac(option) => {
                    if byte == TelnetCommand::IAC.to_byte() {
                        // Escaped literal IAC inside the payload
                        self.subnegotiation_buffer.push(byte);
                        self.parser = ParserState::Subnegotiation(option);
                    } else if byte == TelnetCommand::SE.to_byte() {
                        self.dispatch_subnegotiation(option, &mut input);
                        self.parser = ParserState::Ground;
                    } else {
                        // Truncated subnegotiation: discard it and resume
                        // with whatever command interrupted it
                        self.subnegotiation_buffer.clear();
                        self.handle_iac(byte, &mut input);
                    }
                }
            }
        }

        input
    }

    fn handle_iac(&mut self, byte: u8, input: &mut SessionInput) {
        if byte == TelnetCommand::IAC.to_byte() {
            // Escaped literal 255
            input.data.push(byte);
            self.parser = ParserState::Ground;
            return;
        }

        match TelnetCommand::from_byte(byte) {
            Some(command) if command.is_negotiation() => {
                self.parser = ParserState::Negotiation(command);
            }
            Some(TelnetCommand::SB) => {
                self.parser = ParserState::SubnegotiationOption;
            }
            // NOP, GA and the other lone commands carry no payload
            Some(_) | None => {
                self.parser = ParserState::Ground;
            }
        }
    }

    fn dispatch_negotiation(&mut self, command: TelnetCommand, option: u8, input: &mut SessionInput) {
        for handler in &mut self.options {
            if handler.option().to_byte() == option {
                let (tokens, events) = handler.receive_negotiation(command);
                input.replies.extend(tokens);
                input.events.extend(events);
                return;
            }
        }

        // No handler installed: refuse requests, ignore refusals
        match command {
            TelnetCommand::WILL => input
                .replies
                .push(TelnetToken::Negotiation(TelnetCommand::DONT, option)),
            TelnetCommand::DO => input
                .replies
                .push(TelnetToken::Negotiation(TelnetCommand::WONT, option)),
            _ => {}
        }
    }

    fn dispatch_subnegotiation(&mut self, option: u8, input: &mut SessionInput) {
        let data = std::mem::take(&mut self.subnegotiation_buffer);

        for handler in &mut self.options {
            if handler.option().to_byte() == option {
                // Payloads are only accepted while the owning option is
                // active; anything else is dropped without error
                if handler.state() == OptionState::Active {
                    let (tokens, events) = handler.receive_subnegotiation(&data);
                    input.replies.extend(tokens);
                    input.events.extend(events);
                }
                return;
            }
        }
    }
}

impl Default for TelnetSession {
    fn default() -> Self {
        Self::new()
    }
}
