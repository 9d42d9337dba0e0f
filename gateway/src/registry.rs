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

//! Connection registry
//!
//! The registry accepts raw transports, tracks connections that are still
//! negotiating, and promotes them into client sessions once their terminal
//! type is known. A window size reported before promotion is recorded and
//! handed to the new session in place of the 80x24 default. Death and
//! promotion race freely; the pending entry is removed exactly once by
//! whichever arrives first, and the loser becomes a no-op.
//!
//! Both pending bookkeeping structures live behind one lock, and every
//! mutation also funnels through a single event task, so handlers running
//! on different worker threads cannot interleave registry updates.

use crate::client::{ClientSession, SessionHandler};
use crate::connection::Connection;
use crate::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Window size assumed when the peer never reported one before promotion
const DEFAULT_WINDOW_SIZE: (u16, u16) = (80, 24);

/// Produces the application handler installed on each promoted session
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn SessionHandler> + Send + Sync>;

/// Registry bookkeeping events, serialized through one task
enum RegistryEvent {
    TerminalType(Uuid, String),
    WindowSize(Uuid, u16, u16),
    Death(Uuid),
    SessionClosed(Uuid),
}

/// A connection still in the negotiation phase
struct PendingConnection {
    connection: Connection,
    /// Most recent window size seen before promotion
    size: Option<(u16, u16)>,
}

struct RegistryInner {
    pending: HashMap<Uuid, PendingConnection>,
    sessions: HashMap<Uuid, ClientSession>,
}

/// Multi-connection bookkeeping for the gateway
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    handler_factory: HandlerFactory,
}

impl ConnectionRegistry {
    /// Create a registry and spawn its event task
    pub fn new(handler_factory: HandlerFactory) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(Self {
            inner: Mutex::new(RegistryInner {
                pending: HashMap::new(),
                sessions: HashMap::new(),
            }),
            events: events_tx,
            handler_factory,
        });

        tokio::spawn(Self::run_events(Arc::clone(&registry), events_rx));

        registry
    }

    async fn run_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<RegistryEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                RegistryEvent::TerminalType(id, terminal_type) => {
                    self.on_terminal_type(id, terminal_type).await;
                }
                RegistryEvent::WindowSize(id, width, height) => {
                    self.on_window_size_changed(id, width, height).await;
                }
                RegistryEvent::Death(id) => self.on_connection_death(id).await,
                RegistryEvent::SessionClosed(id) => self.on_session_closed(id).await,
            }
        }
    }

    /// Wrap an accepted transport in a connection and track it as pending.
    ///
    /// The callbacks registered here refer to the connection by id only;
    /// none of them keeps a dead connection alive just to report on it.
    pub async fn on_accept<T>(&self, transport: T) -> Uuid
    where
        T: Transport + 'static,
    {
        let connection = Connection::spawn(transport);
        let id = connection.id();
        tracing::info!(connection = %id, "connection accepted, negotiating");

        let (death_tx, mut death_rx) = mpsc::unbounded_channel();
        connection.on_death(death_tx);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(id) = death_rx.recv().await {
                let _ = events.send(RegistryEvent::Death(id));
            }
        });

        let (window_tx, mut window_rx) = mpsc::unbounded_channel();
        connection.on_window_size_changed(window_tx);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some((width, height)) = window_rx.recv().await {
                if events
                    .send(RegistryEvent::WindowSize(id, width, height))
                    .is_err()
                {
                    break;
                }
            }
        });

        let terminal_type = connection.request_terminal_type();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Ok(terminal_type) = terminal_type.await {
                let _ = events.send(RegistryEvent::TerminalType(id, terminal_type));
            }
        });

        // Insert before starting the read loop so a fast peer cannot race
        // its own promotion
        let mut inner = self.inner.lock().await;
        inner.pending.insert(
            id,
            PendingConnection {
                connection,
                size: None,
            },
        );
        if let Some(entry) = inner.pending.get(&id) {
            entry.connection.start();
        }

        id
    }

    /// Promote a pending connection whose terminal type arrived.
    ///
    /// A report for a connection no longer pending is a stray racing its
    /// own death and is dropped.
    pub async fn on_terminal_type(&self, id: Uuid, terminal_type: String) {
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.pending.remove(&id) else {
            tracing::debug!(connection = %id, "stray terminal type for unknown connection");
            return;
        };

        let size = entry.size.unwrap_or(DEFAULT_WINDOW_SIZE);
        tracing::info!(
            connection = %id,
            terminal_type = %terminal_type,
            width = size.0,
            height = size.1,
            "promoting connection to client session"
        );

        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(id) = closed_rx.recv().await {
                let _ = events.send(RegistryEvent::SessionClosed(id));
            }
        });

        let handler = (self.handler_factory)();
        let session = ClientSession::spawn(entry.connection, handler, size, closed_tx);
        inner.sessions.insert(id, session);
    }

    /// Forget a connection that died while negotiating.
    ///
    /// Safe to call repeatedly and for promoted connections; death of a
    /// promoted connection is the owning client session's concern.
    pub async fn on_connection_death(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        if inner.pending.remove(&id).is_some() {
            tracing::info!(connection = %id, "connection died during negotiation");
        }
    }

    /// Record a window size reported before promotion, overwriting any
    /// earlier report
    pub async fn on_window_size_changed(&self, id: Uuid, width: u16, height: u16) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.pending.get_mut(&id) {
            entry.size = Some((width, height));
        }
    }

    async fn on_session_closed(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        if inner.sessions.remove(&id).is_some() {
            tracing::info!(session = %id, "client session removed");
        }
    }

    /// Number of connections still negotiating
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Number of established client sessions
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Disconnect every pending connection and established session
    pub async fn disconnect_all(&self) {
        let inner = self.inner.lock().await;
        for entry in inner.pending.values() {
            entry.connection.disconnect();
        }
        for session in inner.sessions.values() {
            session.writer().disconnect();
        }
    }
}
