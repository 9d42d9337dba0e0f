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

//! Telnet protocol constants and wire-level building blocks
//!
//! This module defines telnet command and option codes, the token type that
//! the session serializes onto the wire, and helper functions for building
//! negotiation and subnegotiation sequences.

use bytes::Bytes;

/// Telnet command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Interpret As Command
    IAC = 255,
    /// Don't do option
    DONT = 254,
    /// Do option
    DO = 253,
    /// Won't do option
    WONT = 252,
    /// Will do option
    WILL = 251,
    /// Subnegotiation begin
    SB = 250,
    /// Go ahead
    GA = 249,
    /// Erase line
    EL = 248,
    /// Erase character
    EC = 247,
    /// Are you there
    AYT = 246,
    /// Abort output
    AO = 245,
    /// Interrupt process
    IP = 244,
    /// Break
    BRK = 243,
    /// Data mark
    DM = 242,
    /// No operation
    NOP = 241,
    /// Subnegotiation end
    SE = 240,
}

impl TelnetCommand {
    /// Convert byte to telnet command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            255 => Some(Self::IAC),
            254 => Some(Self::DONT),
            253 => Some(Self::DO),
            252 => Some(Self::WONT),
            251 => Some(Self::WILL),
            250 => Some(Self::SB),
            249 => Some(Self::GA),
            248 => Some(Self::EL),
            247 => Some(Self::EC),
            246 => Some(Self::AYT),
            245 => Some(Self::AO),
            244 => Some(Self::IP),
            243 => Some(Self::BRK),
            242 => Some(Self::DM),
            241 => Some(Self::NOP),
            240 => Some(Self::SE),
            _ => None,
        }
    }

    /// Convert command to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// True for the four option negotiation commands
    pub fn is_negotiation(self) -> bool {
        matches!(self, Self::WILL | Self::WONT | Self::DO | Self::DONT)
    }
}

/// Telnet option codes negotiated by this engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetOption {
    /// Echo
    Echo = 1,
    /// Suppress go ahead
    SuppressGoAhead = 3,
    /// Terminal type
    TerminalType = 24,
    /// Negotiate about window size (NAWS)
    NAWS = 31,
    /// MCCP2 (MUD Client Compression Protocol v2)
    MCCP2 = 86,
}

impl TelnetOption {
    /// Convert byte to telnet option
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Echo),
            3 => Some(Self::SuppressGoAhead),
            24 => Some(Self::TerminalType),
            31 => Some(Self::NAWS),
            86 => Some(Self::MCCP2),
            _ => None,
        }
    }

    /// Convert option to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Terminal type subnegotiation: payload carries the type
pub const TTYPE_IS: u8 = 0;
/// Terminal type subnegotiation: request the type
pub const TTYPE_SEND: u8 = 1;

/// A single outbound element handed to the session serializer.
///
/// Tokens preserve caller-supplied ordering; the session turns a token run
/// into wire bytes without performing any I/O itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetToken {
    /// Literal payload bytes, IAC-escaped on serialization
    Data(Bytes),
    /// A lone command such as NOP or GA
    Command(TelnetCommand),
    /// An option negotiation (WILL/WONT/DO/DONT plus option byte)
    Negotiation(TelnetCommand, u8),
    /// A subnegotiation frame for the given option
    Subnegotiation(TelnetOption, Vec<u8>),
    /// In-band marker: every byte serialized after this point must pass
    /// through the outbound compressor
    BeginCompression,
}

/// A serialized run of wire bytes, split at compression boundaries.
///
/// The compression codec consumes chunks in order; a `BeginCompression`
/// chunk flips the outbound compressor on before the next byte run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundChunk {
    /// Raw serialized bytes
    Bytes(Vec<u8>),
    /// Enable outbound compression before the following chunks
    BeginCompression,
}

/// Build a telnet negotiation sequence
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![TelnetCommand::IAC.to_byte(), command.to_byte(), option]
}

/// Build a telnet subnegotiation sequence, doubling any IAC bytes in the
/// payload
pub fn build_subnegotiation(option: TelnetOption, data: &[u8]) -> Vec<u8> {
    let mut result = vec![
        TelnetCommand::IAC.to_byte(),
        TelnetCommand::SB.to_byte(),
        option.to_byte(),
    ];

    for &byte in data {
        result.push(byte);
        if byte == TelnetCommand::IAC.to_byte() {
            result.push(byte);
        }
    }

    result.push(TelnetCommand::IAC.to_byte());
    result.push(TelnetCommand::SE.to_byte());

    result
}

/// Parse window size from NAWS subnegotiation data
pub fn parse_window_size(data: &[u8]) -> Option<(u16, u16)> {
    if data.len() >= 4 {
        let width = u16::from_be_bytes([data[0], data[1]]);
        let height = u16::from_be_bytes([data[2], data[3]]);
        Some((width, height))
    } else {
        None
    }
}
