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

//! Negotiation and promotion tests over in-memory duplex streams.
//!
//! The test peer plays the telnet client byte-for-byte: it answers the
//! server's activation requests, reports window sizes and terminal types,
//! and observes what the registry and client session do with them.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use wayfarer_gateway::client::SessionHandler;
use wayfarer_gateway::connection::{Connection, ConnectionWriter};
use wayfarer_gateway::registry::{ConnectionRegistry, HandlerFactory};
use wayfarer_gateway::transport::StreamTransport;

const IAC: u8 = 255;
const SE: u8 = 240;
const SB: u8 = 250;
const WILL: u8 = 251;
const DO: u8 = 253;

const ECHO: u8 = 1;
const SGA: u8 = 3;
const TTYPE: u8 = 24;
const NAWS: u8 = 31;
const MCCP2: u8 = 86;

/// The five activation requests every connection sends first
const HANDSHAKE: [u8; 15] = [
    IAC, WILL, ECHO, IAC, WILL, SGA, IAC, DO, NAWS, IAC, DO, TTYPE, IAC, WILL, MCCP2,
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellEvent {
    Ready(String, (u16, u16)),
    Data(Vec<u8>),
    Resize(u16, u16),
    Closed,
}

struct RecordingHandler {
    events: Arc<Mutex<Vec<ShellEvent>>>,
}

#[async_trait]
impl SessionHandler for RecordingHandler {
    async fn on_ready(
        &mut self,
        _connection: &ConnectionWriter,
        terminal_type: &str,
        size: (u16, u16),
    ) {
        self.events
            .lock()
            .unwrap()
            .push(ShellEvent::Ready(terminal_type.to_string(), size));
    }

    async fn on_data(&mut self, _connection: &ConnectionWriter, data: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(ShellEvent::Data(data.to_vec()));
    }

    async fn on_window_size(&mut self, _connection: &ConnectionWriter, width: u16, height: u16) {
        self.events
            .lock()
            .unwrap()
            .push(ShellEvent::Resize(width, height));
    }

    async fn on_close(&mut self) {
        self.events.lock().unwrap().push(ShellEvent::Closed);
    }
}

fn recording_factory() -> (HandlerFactory, Arc<Mutex<Vec<ShellEvent>>>) {
    let events: Arc<Mutex<Vec<ShellEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let factory: HandlerFactory = Box::new(move || {
        Box::new(RecordingHandler {
            events: Arc::clone(&captured),
        })
    });
    (factory, events)
}

fn ttype_report(terminal_type: &str) -> Vec<u8> {
    let mut report = vec![IAC, SB, TTYPE, 0];
    report.extend_from_slice(terminal_type.as_bytes());
    report.extend_from_slice(&[IAC, SE]);
    report
}

fn naws_report(width: u16, height: u16) -> Vec<u8> {
    let mut report = vec![IAC, SB, NAWS];
    report.extend_from_slice(&width.to_be_bytes());
    report.extend_from_slice(&height.to_be_bytes());
    report.extend_from_slice(&[IAC, SE]);
    report
}

async fn drain_handshake(peer: &mut DuplexStream) {
    let mut buffer = [0u8; 15];
    tokio::time::timeout(Duration::from_secs(5), peer.read_exact(&mut buffer))
        .await
        .expect("handshake not sent in time")
        .expect("handshake read failed");
    assert_eq!(buffer, HANDSHAKE);
}

/// Answer DO TTYPE so the server asks for the type, then drain the request
async fn accept_ttype(peer: &mut DuplexStream) {
    peer.write_all(&[IAC, WILL, TTYPE]).await.unwrap();
    let mut request = [0u8; 6];
    tokio::time::timeout(Duration::from_secs(5), peer.read_exact(&mut request))
        .await
        .expect("terminal type request not sent in time")
        .expect("request read failed");
    assert_eq!(request, [IAC, SB, TTYPE, 1, IAC, SE]);
}

/// Poll the registry until it reaches the expected pending/session counts
async fn wait_for_counts(
    registry: &ConnectionRegistry,
    pending: usize,
    sessions: usize,
) -> bool {
    for _ in 0..500 {
        if registry.pending_count().await == pending && registry.session_count().await == sessions
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll the recorded shell events until the predicate holds
async fn wait_for_events<F>(events: &Arc<Mutex<Vec<ShellEvent>>>, predicate: F) -> bool
where
    F: Fn(&[ShellEvent]) -> bool,
{
    for _ in 0..500 {
        if predicate(&events.lock().unwrap()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_activation_requests_sent_in_fixed_order() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, _) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;

    drain_handshake(&mut peer).await;
}

#[tokio::test]
async fn test_terminal_type_report_promotes_connection() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, events) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;
    assert_eq!(registry.pending_count().await, 1);
    assert_eq!(registry.session_count().await, 0);

    drain_handshake(&mut peer).await;
    accept_ttype(&mut peer).await;
    peer.write_all(&ttype_report("ANSI")).await.unwrap();

    assert!(
        wait_for_counts(&registry, 0, 1).await,
        "connection was not promoted"
    );

    assert!(
        wait_for_events(&events, |recorded| !recorded.is_empty()).await,
        "handler never became ready"
    );
    assert_eq!(
        events.lock().unwrap()[0],
        ShellEvent::Ready("ANSI".to_string(), (80, 24))
    );
}

#[tokio::test]
async fn test_window_size_before_promotion_replaces_default() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, events) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;
    drain_handshake(&mut peer).await;

    // NAWS first: the size is recorded while pending
    peer.write_all(&[IAC, WILL, NAWS]).await.unwrap();
    peer.write_all(&naws_report(132, 43)).await.unwrap();

    accept_ttype(&mut peer).await;
    peer.write_all(&ttype_report("ANSI")).await.unwrap();

    assert!(
        wait_for_counts(&registry, 0, 1).await,
        "connection was not promoted"
    );
    assert!(
        wait_for_events(&events, |recorded| !recorded.is_empty()).await,
        "handler never became ready"
    );
    assert_eq!(
        events.lock().unwrap()[0],
        ShellEvent::Ready("ANSI".to_string(), (132, 43))
    );
}

#[tokio::test]
async fn test_window_size_after_promotion_reaches_handler() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, events) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;
    drain_handshake(&mut peer).await;

    // Terminal type before any window size report: the session starts with
    // the 80x24 default and buffers nothing
    accept_ttype(&mut peer).await;
    peer.write_all(&ttype_report("ANSI")).await.unwrap();
    assert!(
        wait_for_counts(&registry, 0, 1).await,
        "connection was not promoted"
    );

    peer.write_all(&[IAC, WILL, NAWS]).await.unwrap();
    peer.write_all(&naws_report(132, 43)).await.unwrap();

    assert!(
        wait_for_events(&events, |recorded| {
            recorded.contains(&ShellEvent::Resize(132, 43))
        })
        .await,
        "resize never reached the handler"
    );

    let recorded = events.lock().unwrap().clone();
    assert_eq!(recorded[0], ShellEvent::Ready("ANSI".to_string(), (80, 24)));
    assert!(!recorded.contains(&ShellEvent::Closed));
}

#[tokio::test]
async fn test_payload_before_terminal_type_is_replayed_first() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, events) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;
    drain_handshake(&mut peer).await;

    // Five payload bytes land before the terminal type is known
    peer.write_all(b"hello").await.unwrap();
    accept_ttype(&mut peer).await;
    peer.write_all(&ttype_report("VT100")).await.unwrap();

    assert!(
        wait_for_counts(&registry, 0, 1).await,
        "connection was not promoted"
    );

    peer.write_all(b"world").await.unwrap();

    assert!(
        wait_for_events(&events, |recorded| {
            let delivered: usize = recorded
                .iter()
                .filter_map(|event| match event {
                    ShellEvent::Data(bytes) => Some(bytes.len()),
                    _ => None,
                })
                .sum();
            delivered >= 10
        })
        .await,
        "payload never reached the handler"
    );

    let recorded = events.lock().unwrap().clone();
    assert_eq!(
        recorded[0],
        ShellEvent::Ready("VT100".to_string(), (80, 24))
    );

    // Buffered bytes replay first and exactly once, then live reads resume
    let data: Vec<u8> = recorded
        .iter()
        .filter_map(|event| match event {
            ShellEvent::Data(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(data, b"helloworld");
}

#[tokio::test]
async fn test_death_before_terminal_type_drops_pending_entry() {
    let (peer, stream) = tokio::io::duplex(4096);
    let (factory, _) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    registry.on_accept(StreamTransport::new(stream)).await;
    assert_eq!(registry.pending_count().await, 1);

    drop(peer);

    assert!(
        wait_for_counts(&registry, 0, 0).await,
        "dead connection not removed from pending set"
    );
}

#[tokio::test]
async fn test_stray_terminal_type_after_death_is_dropped() {
    let (peer, stream) = tokio::io::duplex(4096);
    let (factory, _) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    let id = registry.on_accept(StreamTransport::new(stream)).await;
    drop(peer);

    registry.on_connection_death(id).await;
    registry.on_terminal_type(id, "ANSI".to_string()).await;

    assert_eq!(registry.pending_count().await, 0);
    assert_eq!(registry.session_count().await, 0);

    // Death removal stays idempotent
    registry.on_connection_death(id).await;
    assert_eq!(registry.pending_count().await, 0);
}

#[tokio::test]
async fn test_death_after_promotion_is_a_registry_noop() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let (factory, _) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    let id = registry.on_accept(StreamTransport::new(stream)).await;
    drain_handshake(&mut peer).await;

    registry.on_terminal_type(id, "ANSI".to_string()).await;
    assert_eq!(registry.pending_count().await, 0);
    assert_eq!(registry.session_count().await, 1);

    registry.on_connection_death(id).await;
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test]
async fn test_promotion_and_death_race_resolves_exactly_once() {
    let (_peer, stream) = tokio::io::duplex(4096);
    let (factory, _) = recording_factory();
    let registry = ConnectionRegistry::new(factory);

    let id = registry.on_accept(StreamTransport::new(stream)).await;

    tokio::join!(
        registry.on_terminal_type(id, "ANSI".to_string()),
        registry.on_connection_death(id),
    );

    // Exactly one of removal and promotion wins; never both, never neither
    assert_eq!(registry.pending_count().await, 0);
    assert!(registry.session_count().await <= 1);
}

#[tokio::test]
async fn test_terminal_type_waiters_resolve_in_order_with_cached_late_delivery() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let connection = Connection::spawn(StreamTransport::new(stream));
    connection.start();

    drain_handshake(&mut peer).await;

    let first = connection.request_terminal_type();
    let second = connection.request_terminal_type();
    let third = connection.request_terminal_type();

    accept_ttype(&mut peer).await;
    peer.write_all(&ttype_report("VT220")).await.unwrap();

    assert_eq!(first.await.unwrap(), "VT220");
    assert_eq!(second.await.unwrap(), "VT220");
    assert_eq!(third.await.unwrap(), "VT220");

    // Registered after discovery: resolved immediately from the cache
    let late = connection.request_terminal_type();
    assert_eq!(late.await.unwrap(), "VT220");
}

#[tokio::test]
async fn test_pure_control_traffic_yields_no_payload() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let mut connection = Connection::spawn(StreamTransport::new(stream));
    connection.start();

    drain_handshake(&mut peer).await;

    // A NOP consumes an entire read with no payload to deliver
    peer.write_all(&[IAC, 241]).await.unwrap();
    peer.write_all(b"abc").await.unwrap();

    let data = tokio::time::timeout(Duration::from_secs(5), connection.read())
        .await
        .expect("payload not delivered");
    assert_eq!(data.as_ref(), b"abc");
}

#[tokio::test]
async fn test_read_returns_empty_once_peer_is_gone() {
    let (mut peer, stream) = tokio::io::duplex(4096);
    let mut connection = Connection::spawn(StreamTransport::new(stream));
    connection.start();

    drain_handshake(&mut peer).await;
    drop(peer);

    let data = tokio::time::timeout(Duration::from_secs(5), connection.read())
        .await
        .expect("death not observed");
    assert!(data.is_empty());
    assert!(!connection.is_alive());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_peer, stream) = tokio::io::duplex(4096);
    let mut connection = Connection::spawn(StreamTransport::new(stream));
    connection.start();

    connection.disconnect();
    connection.disconnect();

    let data = tokio::time::timeout(Duration::from_secs(5), connection.read())
        .await
        .expect("disconnect did not end the connection");
    assert!(data.is_empty());
    assert!(!connection.is_alive());

    connection.disconnect();
}

#[tokio::test]
async fn test_death_listener_fires_once_with_connection_id() {
    let (peer, stream) = tokio::io::duplex(4096);
    let connection = Connection::spawn(StreamTransport::new(stream));
    let id = connection.id();

    let (death_tx, mut death_rx) = tokio::sync::mpsc::unbounded_channel();
    connection.on_death(death_tx);
    connection.start();

    drop(peer);

    let dead = tokio::time::timeout(Duration::from_secs(5), death_rx.recv())
        .await
        .expect("death never reported");
    assert_eq!(dead, Some(id));

    // Listener is consumed on death; the channel ends afterwards
    let next = tokio::time::timeout(Duration::from_secs(5), death_rx.recv())
        .await
        .expect("channel should close");
    assert_eq!(next, None);
}
