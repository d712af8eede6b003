//! Byte-array compression for enveloped wire payloads.
//!
//! The enveloped send encoding compresses the whole envelope document and
//! tags the result with a compression kind plus the uncompressed size, so
//! the receiver can validate the inflated length before trusting it.
//! Compression is opportunistic: when gzip does not strictly shrink the
//! input, the raw bytes are carried tagged [`CompressionKind::None`].

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::protocol::error::{NetError, Result};

/// Wire tag describing how an envelope body was compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None = 0,
    Gzip = 1,
}

impl CompressionKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Gzip),
            other => Err(NetError::InvalidResponse(format!(
                "unknown compression tag {}",
                other
            ))),
        }
    }
}

/// Compresses `raw`, keeping the raw bytes whenever that is not a win.
///
/// # Returns
///
/// The kind actually used and the bytes to put on the wire. The caller must
/// carry `raw.len()` alongside so the peer can call [`decompress`].
pub fn compress(raw: &[u8]) -> (CompressionKind, Vec<u8>) {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    let compressed = encoder
        .write_all(raw)
        .and_then(|_| encoder.finish())
        .unwrap_or_default();

    if !compressed.is_empty() && compressed.len() < raw.len() {
        (CompressionKind::Gzip, compressed)
    } else {
        (CompressionKind::None, raw.to_vec())
    }
}

/// Restores the raw bytes of an envelope body.
///
/// # Arguments
///
/// * `kind` - The compression tag from the wire
/// * `data` - The (possibly compressed) body bytes
/// * `expected_len` - The uncompressed size from the wire
///
/// # Errors
///
/// Fails when inflation fails or the restored length does not match
/// `expected_len`; a mismatch means the frame is corrupt or lying about its
/// size, and the payload must not be used.
pub fn decompress(kind: CompressionKind, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let raw = match kind {
        CompressionKind::None => data.to_vec(),
        CompressionKind::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut raw = Vec::with_capacity(expected_len);
            decoder.read_to_end(&mut raw)?;
            raw
        }
    };

    if raw.len() != expected_len {
        return Err(NetError::InvalidResponse(format!(
            "decompressed {} bytes, expected {}",
            raw.len(),
            expected_len
        )));
    }
    Ok(raw)
}
