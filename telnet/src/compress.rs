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

//! MCCP2-style transparent stream compression
//!
//! The codec sits between the session serializer and the transport. It
//! passes bytes through untouched until the session emits the in-band
//! compression marker, after which every outbound byte runs through a zlib
//! deflate stream. Each wrap call ends with a sync flush so the peer
//! receives complete writes without waiting for more data.
//!
//! Inbound, the codec inflates once decompression has been armed and
//! resumes correctly across reads that split a compressed block. A corrupt
//! inbound stream is unrecoverable and reported as an error; the connection
//! owner treats it as a transport failure.

use crate::error::TelnetError;
use crate::protocol::OutboundChunk;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Spare output capacity reserved per zlib call
const ZLIB_CHUNK: usize = 4096;

/// Paired deflate/inflate state for one connection
pub struct CompressionCodec {
    outbound: Option<Compress>,
    inbound: Option<Decompress>,
}

impl CompressionCodec {
    pub fn new() -> Self {
        Self {
            outbound: None,
            inbound: None,
        }
    }

    /// True once outbound bytes are being compressed
    pub fn is_compressing(&self) -> bool {
        self.outbound.is_some()
    }

    /// True once inbound bytes are being decompressed
    pub fn is_decompressing(&self) -> bool {
        self.inbound.is_some()
    }

    /// Arm inbound decompression; bytes fed to [`unwrap`](Self::unwrap)
    /// after this point must form a zlib stream
    pub fn start_decompression(&mut self) {
        if self.inbound.is_none() {
            self.inbound = Some(Decompress::new(true));
        }
    }

    /// Serialize outbound chunks to wire bytes, compressing everything
    /// after the in-band marker
    pub fn wrap(&mut self, chunks: Vec<OutboundChunk>) -> Result<Vec<u8>, TelnetError> {
        let mut out = Vec::new();

        for chunk in chunks {
            match chunk {
                OutboundChunk::Bytes(bytes) => match self.outbound.as_mut() {
                    Some(compress) => deflate_sync(compress, &bytes, &mut out)?,
                    None => out.extend_from_slice(&bytes),
                },
                OutboundChunk::BeginCompression => {
                    if self.outbound.is_none() {
                        self.outbound = Some(Compress::new(Compression::default(), true));
                    }
                }
            }
        }

        Ok(out)
    }

    /// Decode inbound wire bytes, inflating when decompression is armed.
    ///
    /// If the peer terminates its compressed stream in-band, the codec
    /// reverts to pass-through for the remaining bytes.
    pub fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TelnetError> {
        let Some(decompress) = self.inbound.as_mut() else {
            return Ok(data.to_vec());
        };

        let mut out = Vec::with_capacity(data.len().max(ZLIB_CHUNK));
        let mut offset = 0;

        while offset < data.len() {
            out.reserve(ZLIB_CHUNK);
            let consumed_before = decompress.total_in();
            let status = decompress
                .decompress_vec(&data[offset..], &mut out, FlushDecompress::None)
                .map_err(|err| TelnetError::Corrupt(err.to_string()))?;
            offset += (decompress.total_in() - consumed_before) as usize;

            match status {
                Status::StreamEnd => {
                    // The peer closed its compressed stream; whatever
                    // follows is plain bytes again
                    self.inbound = None;
                    out.extend_from_slice(&data[offset..]);
                    return Ok(out);
                }
                Status::Ok | Status::BufError => {}
            }
        }

        Ok(out)
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one buffer through the compressor, finishing with a sync flush so
/// the peer can decode it immediately
fn deflate_sync(
    compress: &mut Compress,
    input: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), TelnetError> {
    let mut offset = 0;

    loop {
        out.reserve(ZLIB_CHUNK);
        let consumed_before = compress.total_in();
        let status = compress
            .compress_vec(&input[offset..], out, FlushCompress::Sync)
            .map_err(|err| TelnetError::Compression(err.to_string()))?;
        offset += (compress.total_in() - consumed_before) as usize;

        match status {
            Status::Ok | Status::BufError => {
                // Spare capacity after the call means the flush completed
                if offset >= input.len() && out.len() < out.capacity() {
                    return Ok(());
                }
            }
            Status::StreamEnd => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed_codec_pair() -> (CompressionCodec, CompressionCodec) {
        let mut tx = CompressionCodec::new();
        let wire = tx
            .wrap(vec![OutboundChunk::BeginCompression])
            .expect("arming emits no bytes");
        assert!(wire.is_empty());

        let mut rx = CompressionCodec::new();
        rx.start_decompression();
        (tx, rx)
    }

    #[test]
    fn test_passthrough_when_inactive() {
        let mut codec = CompressionCodec::new();
        let wire = codec
            .wrap(vec![OutboundChunk::Bytes(b"plain".to_vec())])
            .unwrap();
        assert_eq!(wire, b"plain");

        let decoded = codec.unwrap(b"plain").unwrap();
        assert_eq!(decoded, b"plain");
        assert!(!codec.is_compressing());
        assert!(!codec.is_decompressing());
    }

    #[test]
    fn test_bytes_before_marker_stay_uncompressed() {
        let mut codec = CompressionCodec::new();
        let wire = codec
            .wrap(vec![
                OutboundChunk::Bytes(b"clear".to_vec()),
                OutboundChunk::BeginCompression,
                OutboundChunk::Bytes(b"hidden".to_vec()),
            ])
            .unwrap();

        assert_eq!(&wire[..5], b"clear");
        assert_ne!(&wire[5..], b"hidden");
        assert!(codec.is_compressing());
    }

    #[test]
    fn test_round_trip_single_write() {
        let (mut tx, mut rx) = compressed_codec_pair();

        let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
        let wire = tx
            .wrap(vec![OutboundChunk::Bytes(payload.clone())])
            .unwrap();
        assert_ne!(wire, payload);

        let decoded = rx.unwrap(&wire).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_round_trip_across_split_blocks() {
        let (mut tx, mut rx) = compressed_codec_pair();

        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let wire = tx
            .wrap(vec![OutboundChunk::Bytes(payload.clone())])
            .unwrap();

        // Feed the wire bytes back in awkward slices, splitting blocks
        let mut decoded = Vec::new();
        for piece in wire.chunks(7) {
            decoded.extend(rx.unwrap(piece).unwrap());
        }
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_every_write_is_flushed() {
        let (mut tx, mut rx) = compressed_codec_pair();

        // Each wrap must be decodable on its own, without later writes
        let first = tx
            .wrap(vec![OutboundChunk::Bytes(b"first write".to_vec())])
            .unwrap();
        assert_eq!(rx.unwrap(&first).unwrap(), b"first write");

        let second = tx
            .wrap(vec![OutboundChunk::Bytes(b"second write".to_vec())])
            .unwrap();
        assert_eq!(rx.unwrap(&second).unwrap(), b"second write");
    }

    #[test]
    fn test_corrupt_stream_is_fatal() {
        let (_, mut rx) = compressed_codec_pair();
        let result = rx.unwrap(b"this is not a zlib stream");
        assert!(matches!(result, Err(TelnetError::Corrupt(_))));
    }

    #[test]
    fn test_stream_end_reverts_to_passthrough() {
        let (_, mut rx) = compressed_codec_pair();

        // Build a finished zlib stream followed by trailing plain bytes
        let mut compress = Compress::new(Compression::default(), true);
        let mut wire = Vec::new();
        let mut offset = 0;
        let payload = b"tail of compression";
        loop {
            wire.reserve(ZLIB_CHUNK);
            let before = compress.total_in();
            let status = compress
                .compress_vec(&payload[offset..], &mut wire, FlushCompress::Finish)
                .unwrap();
            offset += (compress.total_in() - before) as usize;
            if status == Status::StreamEnd {
                break;
            }
        }
        wire.extend_from_slice(b"plain again");

        let decoded = rx.unwrap(&wire).unwrap();
        assert_eq!(decoded, b"tail of compressionplain again");
        assert!(!rx.is_decompressing());
    }

    #[test]
    fn test_marker_is_applied_once() {
        let mut codec = CompressionCodec::new();
        codec
            .wrap(vec![OutboundChunk::BeginCompression])
            .unwrap();
        assert!(codec.is_compressing());

        // A second marker must not reset the deflate stream
        let first = codec
            .wrap(vec![OutboundChunk::Bytes(b"one".to_vec())])
            .unwrap();
        let second = codec
            .wrap(vec![
                OutboundChunk::BeginCompression,
                OutboundChunk::Bytes(b"two".to_vec()),
            ])
            .unwrap();

        let mut rx = CompressionCodec::new();
        rx.start_decompression();
        assert_eq!(rx.unwrap(&first).unwrap(), b"one");
        assert_eq!(rx.unwrap(&second).unwrap(), b"two");
    }
}
