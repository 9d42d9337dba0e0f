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

//! Negotiating telnet connection
//!
//! A connection composes a transport, a telnet session and a compression
//! codec, and drives them from a single task. The task owns all protocol
//! state, so handlers for one connection are sequential by construction:
//! reads, writes, keepalive ticks and disconnects funnel through one loop.
//!
//! On construction the connection arms compression and requests the
//! standard option set in a fixed order, compression last, so that the
//! other activation bytes are never themselves compressed. The read loop
//! sizes each request adaptively: when the transport knows how much data is
//! waiting it asks for exactly that amount, otherwise it asks for a single
//! byte rather than blocking on a quiet peer.

use crate::error::GatewayError;
use crate::transport::Transport;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;
use wayfarer_telnet::{
    CompressionCodec, CompressionServer, EchoServer, NawsClient, SuppressGoAheadServer,
    TelnetCommand, TelnetEvent, TelnetOption, TelnetSession, TelnetToken, TerminalTypeClient,
};

/// Heartbeat period; a NOP is sent this often to keep intermediate network
/// equipment from timing the connection out
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// The options every connection negotiates, in activation order.
/// Compression must come last.
const ACTIVATION_ORDER: [TelnetOption; 5] = [
    TelnetOption::Echo,
    TelnetOption::SuppressGoAhead,
    TelnetOption::NAWS,
    TelnetOption::TerminalType,
    TelnetOption::MCCP2,
];

/// Commands accepted by the connection task
enum ConnectionCommand {
    /// Begin the read loop
    Start,
    /// Queue payload for the peer
    Write(Bytes),
    /// Close the transport and stop
    Disconnect,
}

/// Terminal type discovery state
enum TerminalTypeState {
    /// Not yet reported; waiters queue in registration order
    Pending(Vec<oneshot::Sender<String>>),
    /// Reported; late waiters resolve immediately
    Known(String),
}

/// State observable without going through the connection task
struct ConnectionShared {
    alive: AtomicBool,
    terminal_type: Mutex<TerminalTypeState>,
    window_size_listener: Mutex<Option<mpsc::UnboundedSender<(u16, u16)>>>,
    death_listener: Mutex<Option<mpsc::UnboundedSender<Uuid>>>,
}

/// Lock a shared-state mutex, recovering the data if a task panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owning handle to a negotiating connection.
///
/// Held by the registry while pending and handed to the client session on
/// promotion. Dropping the handle disconnects the peer.
pub struct Connection {
    id: Uuid,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    data: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<ConnectionShared>,
}

/// Cheap write-side handle, safe to hand to application code
#[derive(Clone)]
pub struct ConnectionWriter {
    id: Uuid,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    shared: Arc<ConnectionShared>,
}

impl Connection {
    /// Wrap a transport in a connection and spawn its task.
    ///
    /// The task immediately sends the option activations but does not read
    /// from the transport until [`start`](Self::start) is called, giving
    /// the owner time to register its callbacks.
    pub fn spawn<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConnectionShared {
            alive: AtomicBool::new(true),
            terminal_type: Mutex::new(TerminalTypeState::Pending(Vec::new())),
            window_size_listener: Mutex::new(None),
            death_listener: Mutex::new(None),
        });

        let mut session = TelnetSession::new();
        session.install(Box::new(EchoServer::new()));
        session.install(Box::new(SuppressGoAheadServer::new()));
        session.install(Box::new(NawsClient::new()));
        session.install(Box::new(TerminalTypeClient::new()));
        session.install(Box::new(CompressionServer::new()));

        let actor = ConnectionActor {
            id,
            transport,
            session,
            codec: CompressionCodec::new(),
            commands: command_rx,
            data: data_tx,
            shared: Arc::clone(&shared),
        };
        tokio::spawn(actor.run());

        Self {
            id,
            commands: command_tx,
            data: data_rx,
            shared,
        }
    }

    /// Connection identifier, stable for its lifetime
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Obtain a cloneable write-side handle
    pub fn writer(&self) -> ConnectionWriter {
        ConnectionWriter {
            id: self.id,
            commands: self.commands.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// True until the transport dies or the connection is disconnected
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Begin the read loop
    pub fn start(&self) {
        let _ = self.commands.send(ConnectionCommand::Start);
    }

    /// Queue payload for the peer; writes are delivered in call order
    pub fn write(&self, data: impl Into<Bytes>) {
        let _ = self.commands.send(ConnectionCommand::Write(data.into()));
    }

    /// Close the connection; calling twice is harmless
    pub fn disconnect(&self) {
        let _ = self.commands.send(ConnectionCommand::Disconnect);
    }

    /// Receive the next payload chunk.
    ///
    /// Returns an empty buffer once the connection is dead; pair it with
    /// [`is_alive`](Self::is_alive) to distinguish quiet from gone.
    pub async fn read(&mut self) -> Bytes {
        self.data.recv().await.unwrap_or_default()
    }

    /// Register for the terminal type report.
    ///
    /// Waiters registered before discovery all resolve, in registration
    /// order, with the same value; a waiter registered afterwards resolves
    /// immediately with the cached value. Each waiter resolves exactly
    /// once. If the connection dies first, the receiver reports closure.
    pub fn request_terminal_type(&self) -> oneshot::Receiver<String> {
        self.shared.request_terminal_type()
    }

    /// Register the window-size listener, replacing any previous one.
    /// It is notified on every subsequent negotiated size change.
    pub fn on_window_size_changed(&self, listener: mpsc::UnboundedSender<(u16, u16)>) {
        *lock(&self.shared.window_size_listener) = Some(listener);
    }

    /// Register the death listener, replacing any previous one. It receives
    /// the connection id once, when the connection ends for any reason.
    pub fn on_death(&self, listener: mpsc::UnboundedSender<Uuid>) {
        *lock(&self.shared.death_listener) = Some(listener);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(ConnectionCommand::Disconnect);
    }
}

impl ConnectionWriter {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn write(&self, data: impl Into<Bytes>) {
        let _ = self.commands.send(ConnectionCommand::Write(data.into()));
    }

    pub fn disconnect(&self) {
        let _ = self.commands.send(ConnectionCommand::Disconnect);
    }
}

impl ConnectionShared {
    fn request_terminal_type(&self) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        match &mut *lock(&self.terminal_type) {
            TerminalTypeState::Known(terminal_type) => {
                let _ = tx.send(terminal_type.clone());
            }
            TerminalTypeState::Pending(waiters) => {
                // Dropping the sender of a dead connection signals closure
                if self.alive.load(Ordering::SeqCst) {
                    waiters.push(tx);
                }
            }
        }
        rx
    }

    fn resolve_terminal_type(&self, terminal_type: String) {
        let previous = std::mem::replace(
            &mut *lock(&self.terminal_type),
            TerminalTypeState::Known(terminal_type.clone()),
        );
        if let TerminalTypeState::Pending(waiters) = previous {
            for waiter in waiters {
                let _ = waiter.send(terminal_type.clone());
            }
        }
    }
}

/// The task-owned half of a connection
struct ConnectionActor<T> {
    id: Uuid,
    transport: T,
    session: TelnetSession,
    codec: CompressionCodec,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    data: mpsc::UnboundedSender<Bytes>,
    shared: Arc<ConnectionShared>,
}

impl<T> ConnectionActor<T>
where
    T: Transport,
{
    async fn run(mut self) {
        // Arm compression first so it engages as soon as the peer affirms,
        // then request the activations in order, compression last
        let mut tokens = self.session.begin_compression();
        for option in ACTIVATION_ORDER {
            tokens.extend(self.session.activate(option));
        }
        if self.transmit(tokens).await.is_err() {
            self.shutdown().await;
            return;
        }

        // Hold off the read loop until the owner has registered callbacks
        loop {
            match self.commands.recv().await {
                Some(ConnectionCommand::Start) => break,
                Some(ConnectionCommand::Write(data)) => {
                    if self.transmit(vec![TelnetToken::Data(data)]).await.is_err() {
                        self.shutdown().await;
                        return;
                    }
                }
                Some(ConnectionCommand::Disconnect) | None => {
                    self.shutdown().await;
                    return;
                }
            }
        }

        let mut keepalive = tokio::time::interval_at(
            Instant::now() + KEEPALIVE_INTERVAL,
            KEEPALIVE_INTERVAL,
        );

        loop {
            let amount = self.transport.available_bytes().unwrap_or(1);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ConnectionCommand::Write(data)) => {
                        if self.transmit(vec![TelnetToken::Data(data)]).await.is_err() {
                            break;
                        }
                    }
                    Some(ConnectionCommand::Start) => {}
                    Some(ConnectionCommand::Disconnect) | None => break,
                },
                _ = keepalive.tick() => {
                    if self
                        .transmit(vec![TelnetToken::Command(TelnetCommand::NOP)])
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                result = self.transport.read(amount) => match result {
                    Ok(bytes) if bytes.is_empty() => {
                        tracing::debug!(connection = %self.id, "peer closed the stream");
                        break;
                    }
                    Ok(bytes) => {
                        if self.process(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(connection = %self.id, error = %err, "read failed");
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
    }

    /// Decode one raw read and act on its contents
    async fn process(&mut self, bytes: &[u8]) -> Result<(), GatewayError> {
        let decoded = match self.codec.unwrap(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                // A corrupt compressed stream cannot be resynchronized
                tracing::warn!(connection = %self.id, error = %err, "inbound stream corrupt");
                return Err(err.into());
            }
        };

        let input = self.session.receive(&decoded);

        if !input.replies.is_empty() {
            self.transmit(input.replies).await?;
        }

        for event in input.events {
            self.dispatch_event(event);
        }

        if !input.data.is_empty() {
            let _ = self.data.send(Bytes::from(input.data));
        }

        Ok(())
    }

    /// Serialize tokens through the session and codec and write the result
    async fn transmit(&mut self, tokens: Vec<TelnetToken>) -> Result<(), GatewayError> {
        if tokens.is_empty() {
            return Ok(());
        }

        let chunks = self.session.send(tokens);
        let wire = self.codec.wrap(chunks)?;
        if !wire.is_empty() {
            self.transport.write_all(&wire).await?;
        }

        Ok(())
    }

    fn dispatch_event(&self, event: TelnetEvent) {
        match event {
            TelnetEvent::WindowSize { width, height } => {
                tracing::debug!(connection = %self.id, width, height, "window size reported");
                if let Some(listener) = lock(&self.shared.window_size_listener).as_ref() {
                    let _ = listener.send((width, height));
                }
            }
            TelnetEvent::TerminalType { terminal_type } => {
                tracing::debug!(connection = %self.id, terminal_type = %terminal_type, "terminal type reported");
                self.shared.resolve_terminal_type(terminal_type);
            }
            TelnetEvent::OptionEnabled(option) => {
                tracing::debug!(connection = %self.id, option = ?option, "option enabled");
            }
            TelnetEvent::OptionRefused(option) => {
                tracing::debug!(connection = %self.id, option = ?option, "option refused by peer");
            }
        }
    }

    async fn shutdown(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        self.transport.close().await;

        // Waiters that never got a terminal type observe the death as a
        // closed channel
        if let TerminalTypeState::Pending(waiters) = &mut *lock(&self.shared.terminal_type) {
            waiters.clear();
        }

        if let Some(listener) = lock(&self.shared.death_listener).take() {
            let _ = listener.send(self.id);
        }

        tracing::info!(connection = %self.id, "connection closed");
    }
}
