//! Byte-level codec helpers: MD5-over-base64, gzip, base64, and chunking.
//!
//! All functions are pure. Base-64 uses the traditional alphabet
//! (`A-Z a-z 0-9 + /` with `=` padding); decoding validates the character
//! set and length before touching the payload, so a malformed field can be
//! dropped without side effects.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::{GzDecoder, GzEncoder};
use md5::{Digest, Md5};

use crate::constants::CHUNK_SIZE;
use crate::error::CodecError;

/// MD5 of `data`, rendered as 24 characters of padded base-64.
pub fn md5_base64(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

/// Encode bytes with the traditional base-64 alphabet.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base-64 field after validating charset and length.
///
/// Length must be a multiple of 4 and every character must belong to the
/// traditional alphabet (plus `=` padding).
pub fn base64_decode(text: &str) -> Result<Vec<u8>, CodecError> {
    if text.len() % 4 != 0 {
        return Err(CodecError::Base64Length(text.len()));
    }
    for (pos, found) in text.char_indices() {
        let valid = found.is_ascii_alphanumeric() || found == '+' || found == '/' || found == '=';
        if !valid {
            return Err(CodecError::Base64Charset { found, pos });
        }
    }
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::Base64Decode(e.to_string()))
}

/// Compress with gzip at the default level.
pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(data, Compression::default());
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
    Ok(compressed)
}

/// Decompress gzip-compressed data.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CodecError::DecompressionFailed(e.to_string()))?;
    Ok(decompressed)
}

/// Split a payload into `CHUNK_SIZE`-byte fragments; the last may be short.
///
/// An empty payload yields no chunks.
pub fn split_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    data.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect()
}
