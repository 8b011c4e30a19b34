//! gzip + base64 transport encoding for large batch envelopes

use std::io::{Read, Write};

use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};

pub const ENCODING: &str = "gzip+base64";

/// Compress `bytes` with gzip at `level` (0-9) and base64 encode the result
pub fn compress(bytes: &[u8], level: u32) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(bytes.len() / 2),
        Compression::new(level.min(9)),
    );
    encoder.write_all(bytes)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`compress`]
pub fn decompress(data: &str) -> anyhow::Result<Vec<u8>> {
    let compressed = STANDARD.decode(data).context("invalid base64 payload")?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .context("invalid gzip payload")?;
    Ok(out)
}
