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

//! Client session state machine
//!
//! A client session owns a promoted connection and runs it through three
//! phases. In `setup` the terminal type is still unknown, so payload is
//! buffered rather than interpreted. Discovery moves the session to `main`,
//! which first replays exactly the buffered bytes to the application
//! handler and then streams live reads. A read that yields nothing while
//! the connection is gone moves the session to `dead`, which absorbs every
//! further event. The machine never moves backwards.

use crate::connection::{Connection, ConnectionWriter};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Application-side callbacks for one established session.
///
/// Handlers receive a write-capable connection handle with every call; they
/// may write, query liveness or disconnect at any time.
#[async_trait]
pub trait SessionHandler: Send {
    /// The session reached its established phase
    async fn on_ready(
        &mut self,
        connection: &ConnectionWriter,
        terminal_type: &str,
        size: (u16, u16),
    );

    /// Decoded payload from the peer, in arrival order
    async fn on_data(&mut self, connection: &ConnectionWriter, data: &[u8]);

    /// The peer reported a new window size
    async fn on_window_size(&mut self, connection: &ConnectionWriter, width: u16, height: u16);

    /// The session ended; no further callbacks follow
    async fn on_close(&mut self);
}

/// Session phase, strictly forward-moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Main,
    Dead,
}

/// What the driver must do after feeding the machine an event
#[derive(Debug, PartialEq, Eq)]
enum PhaseAction {
    /// Entering the established phase
    Ready { terminal_type: String },
    /// Hand payload to the application handler
    Deliver(Bytes),
    /// Forward a window-size change
    Resize(u16, u16),
    /// The session is dead; notify the handler and stop
    Close,
}

/// Pure transition core, driven by the session task and exercised directly
/// in tests
struct PhaseMachine {
    phase: Phase,
    buffered: BytesMut,
}

impl PhaseMachine {
    fn new() -> Self {
        Self {
            phase: Phase::Setup,
            buffered: BytesMut::new(),
        }
    }

    fn handle_data(&mut self, data: Bytes, connection_alive: bool) -> Vec<PhaseAction> {
        match self.phase {
            Phase::Setup => {
                if data.is_empty() && !connection_alive {
                    return self.enter_dead();
                }
                // The bytes cannot be interpreted without a terminal type;
                // keep them for replay
                self.buffered.extend_from_slice(&data);
                Vec::new()
            }
            Phase::Main => {
                if data.is_empty() && !connection_alive {
                    self.enter_dead()
                } else {
                    vec![PhaseAction::Deliver(data)]
                }
            }
            Phase::Dead => Vec::new(),
        }
    }

    fn terminal_type(&mut self, terminal_type: String, connection_alive: bool) -> Vec<PhaseAction> {
        match self.phase {
            Phase::Setup => {
                self.phase = Phase::Main;
                let buffered = self.buffered.split().freeze();

                let mut actions = vec![PhaseAction::Ready { terminal_type }];
                if !buffered.is_empty() {
                    actions.push(PhaseAction::Deliver(buffered));
                } else if !connection_alive {
                    actions.extend(self.enter_dead());
                }
                actions
            }
            Phase::Main | Phase::Dead => Vec::new(),
        }
    }

    fn window_size(&mut self, width: u16, height: u16) -> Vec<PhaseAction> {
        match self.phase {
            // While negotiating, the registry records the size for replay
            Phase::Setup => Vec::new(),
            Phase::Main => vec![PhaseAction::Resize(width, height)],
            Phase::Dead => Vec::new(),
        }
    }

    fn connection_lost(&mut self) -> Vec<PhaseAction> {
        self.enter_dead()
    }

    fn enter_dead(&mut self) -> Vec<PhaseAction> {
        if self.phase == Phase::Dead {
            Vec::new()
        } else {
            self.phase = Phase::Dead;
            vec![PhaseAction::Close]
        }
    }
}

/// Handle to a running client session
pub struct ClientSession {
    id: Uuid,
    writer: ConnectionWriter,
}

impl ClientSession {
    /// Take ownership of a promoted connection and drive it.
    ///
    /// `initial_size` is the window size recorded while the connection was
    /// pending, or the 80x24 default. `closed` receives the session id once
    /// the session is dead.
    pub fn spawn(
        connection: Connection,
        handler: Box<dyn SessionHandler>,
        initial_size: (u16, u16),
        closed: mpsc::UnboundedSender<Uuid>,
    ) -> Self {
        let id = connection.id();
        let writer = connection.writer();

        tokio::spawn(Self::run(connection, handler, initial_size, closed));

        Self { id, writer }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn writer(&self) -> ConnectionWriter {
        self.writer.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.writer.is_alive()
    }

    async fn run(
        mut connection: Connection,
        mut handler: Box<dyn SessionHandler>,
        initial_size: (u16, u16),
        closed: mpsc::UnboundedSender<Uuid>,
    ) {
        let id = connection.id();
        let writer = connection.writer();
        let mut machine = PhaseMachine::new();
        let mut size = initial_size;

        let mut terminal_type = connection.request_terminal_type();
        let mut terminal_type_pending = true;

        let (window_tx, mut window_rx) = mpsc::unbounded_channel();
        connection.on_window_size_changed(window_tx);

        'session: loop {
            let actions = tokio::select! {
                data = connection.read() => {
                    let alive = connection.is_alive();
                    machine.handle_data(data, alive)
                }
                result = &mut terminal_type, if terminal_type_pending => {
                    terminal_type_pending = false;
                    match result {
                        Ok(terminal_type) => {
                            machine.terminal_type(terminal_type, connection.is_alive())
                        }
                        // The connection died before reporting a type
                        Err(_) => machine.connection_lost(),
                    }
                }
                change = window_rx.recv() => match change {
                    Some((width, height)) => machine.window_size(width, height),
                    None => Vec::new(),
                }
            };

            for action in actions {
                match action {
                    PhaseAction::Ready { terminal_type } => {
                        tracing::info!(
                            session = %id,
                            terminal_type = %terminal_type,
                            width = size.0,
                            height = size.1,
                            "client session established"
                        );
                        handler.on_ready(&writer, &terminal_type, size).await;
                    }
                    PhaseAction::Deliver(data) => {
                        handler.on_data(&writer, &data).await;
                    }
                    PhaseAction::Resize(width, height) => {
                        size = (width, height);
                        handler.on_window_size(&writer, width, height).await;
                    }
                    PhaseAction::Close => {
                        tracing::info!(session = %id, "client session ended");
                        handler.on_close().await;
                        break 'session;
                    }
                }
            }
        }

        connection.disconnect();
        let _ = closed.send(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_buffers_payload() {
        let mut machine = PhaseMachine::new();

        assert!(machine.handle_data(Bytes::from_static(b"hel"), true).is_empty());
        assert!(machine.handle_data(Bytes::from_static(b"lo"), true).is_empty());
        assert_eq!(machine.phase, Phase::Setup);
    }

    #[test]
    fn test_terminal_type_replays_buffered_bytes_in_order() {
        let mut machine = PhaseMachine::new();
        machine.handle_data(Bytes::from_static(b"hel"), true);
        machine.handle_data(Bytes::from_static(b"lo"), true);

        let actions = machine.terminal_type("VT100".to_string(), true);
        assert_eq!(
            actions,
            vec![
                PhaseAction::Ready {
                    terminal_type: "VT100".to_string()
                },
                PhaseAction::Deliver(Bytes::from_static(b"hello")),
            ]
        );
        assert_eq!(machine.phase, Phase::Main);

        // Buffered bytes replay exactly once
        let actions = machine.handle_data(Bytes::from_static(b"next"), true);
        assert_eq!(actions, vec![PhaseAction::Deliver(Bytes::from_static(b"next"))]);
    }

    #[test]
    fn test_terminal_type_without_buffered_bytes() {
        let mut machine = PhaseMachine::new();
        let actions = machine.terminal_type("ANSI".to_string(), true);
        assert_eq!(
            actions,
            vec![PhaseAction::Ready {
                terminal_type: "ANSI".to_string()
            }]
        );
        assert_eq!(machine.phase, Phase::Main);
    }

    #[test]
    fn test_window_size_in_setup_has_no_effect() {
        let mut machine = PhaseMachine::new();
        assert!(machine.window_size(132, 43).is_empty());
        assert_eq!(machine.phase, Phase::Setup);
    }

    #[test]
    fn test_window_size_forwarded_in_main() {
        let mut machine = PhaseMachine::new();
        machine.terminal_type("ANSI".to_string(), true);

        let actions = machine.window_size(132, 43);
        assert_eq!(actions, vec![PhaseAction::Resize(132, 43)]);
        assert_eq!(machine.phase, Phase::Main);
    }

    #[test]
    fn test_empty_read_on_dead_connection_kills_session() {
        let mut machine = PhaseMachine::new();
        machine.terminal_type("ANSI".to_string(), true);

        let actions = machine.handle_data(Bytes::new(), false);
        assert_eq!(actions, vec![PhaseAction::Close]);
        assert_eq!(machine.phase, Phase::Dead);
    }

    #[test]
    fn test_empty_read_on_live_connection_is_delivered() {
        // An empty chunk with a live peer is protocol-only traffic, not a
        // death signal
        let mut machine = PhaseMachine::new();
        machine.terminal_type("ANSI".to_string(), true);

        let actions = machine.handle_data(Bytes::new(), true);
        assert_eq!(actions, vec![PhaseAction::Deliver(Bytes::new())]);
        assert_eq!(machine.phase, Phase::Main);
    }

    #[test]
    fn test_empty_read_during_setup_on_dead_connection_kills_session() {
        let mut machine = PhaseMachine::new();
        let actions = machine.handle_data(Bytes::new(), false);
        assert_eq!(actions, vec![PhaseAction::Close]);
        assert_eq!(machine.phase, Phase::Dead);
    }

    #[test]
    fn test_dead_is_absorbing() {
        let mut machine = PhaseMachine::new();
        machine.terminal_type("ANSI".to_string(), true);
        machine.handle_data(Bytes::new(), false);
        assert_eq!(machine.phase, Phase::Dead);

        assert!(machine.handle_data(Bytes::from_static(b"late"), true).is_empty());
        assert!(machine.terminal_type("VT220".to_string(), true).is_empty());
        assert!(machine.window_size(80, 24).is_empty());
        assert!(machine.connection_lost().is_empty());
        assert_eq!(machine.phase, Phase::Dead);
    }

    #[test]
    fn test_main_never_regresses_to_setup() {
        let mut machine = PhaseMachine::new();
        machine.terminal_type("ANSI".to_string(), true);
        assert_eq!(machine.phase, Phase::Main);

        // A second report neither regresses nor replays
        assert!(machine.terminal_type("VT100".to_string(), true).is_empty());
        assert_eq!(machine.phase, Phase::Main);
    }

    #[test]
    fn test_death_during_setup() {
        let mut machine = PhaseMachine::new();
        machine.handle_data(Bytes::from_static(b"partial"), true);

        let actions = machine.connection_lost();
        assert_eq!(actions, vec![PhaseAction::Close]);
        assert_eq!(machine.phase, Phase::Dead);
    }

    #[test]
    fn test_promotion_onto_dead_connection() {
        let mut machine = PhaseMachine::new();
        let actions = machine.terminal_type("ANSI".to_string(), false);
        assert_eq!(
            actions,
            vec![
                PhaseAction::Ready {
                    terminal_type: "ANSI".to_string()
                },
                PhaseAction::Close,
            ]
        );
        assert_eq!(machine.phase, Phase::Dead);
    }
}
