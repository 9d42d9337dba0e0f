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

//! Byte-stream transport abstraction
//!
//! The connection layer is agnostic to the concrete transport as long as it
//! delivers ordered, reliable bytes. [`StreamTransport`] adapts any tokio
//! byte stream; tests run the same code over in-memory duplex pipes that
//! production runs over TCP sockets.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Bytes pulled from the stream per refill
const READ_BUFFER_SIZE: usize = 4096;

/// An ordered, reliable byte-stream endpoint.
///
/// A read of zero bytes signals that the peer is gone; after that
/// `is_alive` reports false and further operations are inert.
#[async_trait]
pub trait Transport: Send {
    /// False once the peer has closed or an I/O error occurred
    fn is_alive(&self) -> bool;

    /// Number of unread bytes known to be immediately available, if any
    fn available_bytes(&self) -> Option<usize>;

    /// Read up to `amount` bytes, waiting for at least one.
    ///
    /// Returns an empty buffer exactly when the stream has ended.
    async fn read(&mut self, amount: usize) -> std::io::Result<Bytes>;

    /// Write the whole buffer, preserving call order
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Close the stream; further reads report end of stream
    async fn close(&mut self);
}

/// [`Transport`] over any tokio byte stream.
///
/// Incoming bytes are staged in an internal buffer so that a minimal read
/// surfaces one byte while the remainder becomes known available data for
/// the next, exact-sized request.
pub struct StreamTransport<S> {
    stream: S,
    staged: BytesMut,
    alive: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            staged: BytesMut::new(),
            alive: true,
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn is_alive(&self) -> bool {
        self.alive || !self.staged.is_empty()
    }

    fn available_bytes(&self) -> Option<usize> {
        if self.staged.is_empty() {
            None
        } else {
            Some(self.staged.len())
        }
    }

    async fn read(&mut self, amount: usize) -> std::io::Result<Bytes> {
        if self.staged.is_empty() {
            if !self.alive {
                return Ok(Bytes::new());
            }

            self.staged.reserve(READ_BUFFER_SIZE);
            match self.stream.read_buf(&mut self.staged).await {
                Ok(0) => {
                    self.alive = false;
                    return Ok(Bytes::new());
                }
                Ok(_) => {}
                Err(err) => {
                    self.alive = false;
                    return Err(err);
                }
            }
        }

        let take = amount.max(1).min(self.staged.len());
        Ok(self.staged.split_to(take).freeze())
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        let result = self.stream.write_all(data).await;
        if result.is_err() {
            self.alive = false;
            return result;
        }
        let result = self.stream.flush().await;
        if result.is_err() {
            self.alive = false;
        }
        result
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
        self.alive = false;
    }
}

/// The production transport used by the accept loop
pub type TcpTransport = StreamTransport<TcpStream>;
