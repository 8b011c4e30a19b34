//! Batch sealing and the wire envelopes sent to subscribers
//!
//! A sealed batch is serialized exactly once. Large envelopes are replaced by
//! a tagged compressed envelope:
//!
//! ```json
//! { "compressed": true, "encoding": "gzip+base64", "data": "<base64>" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::compression;

/// One published item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    pub topic: String,
    pub data: serde_json::Value,
    pub time: DateTime<Utc>,
}

/// Uncompressed wire form of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub messages: Vec<HubMessage>,
    pub batch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedEnvelope {
    pub compressed: bool,
    pub encoding: String,
    pub data: String,
}

/// Settings applied when sealing
#[derive(Debug, Clone, Copy)]
pub struct SealOptions {
    pub compression_min_size: usize,
    pub compression_level: u32,
}

/// Immutable, ready to send batch shared by every recipient
#[derive(Debug, Clone, PartialEq)]
pub struct SealedBatch {
    pub topic: String,
    pub batch_id: String,
    pub message_count: usize,
    pub compressed: bool,
    /// Text frame as it goes on the wire
    pub payload: String,
}

impl SealedBatch {
    pub fn seal(
        topic: impl Into<String>,
        messages: Vec<HubMessage>,
        options: SealOptions,
    ) -> serde_json::Result<Self> {
        let envelope = BatchEnvelope {
            batch_id: new_batch_id(Utc::now()),
            messages,
        };
        let raw = serde_json::to_string(&envelope)?;

        let (payload, compressed) = if raw.len() > options.compression_min_size {
            match compression::compress(raw.as_bytes(), options.compression_level) {
                Ok(data) => {
                    let wrapped = serde_json::to_string(&CompressedEnvelope {
                        compressed: true,
                        encoding: compression::ENCODING.to_string(),
                        data,
                    })?;
                    (wrapped, true)
                }
                Err(e) => {
                    warn!("compression failed, sending batch uncompressed: {e}");
                    (raw, false)
                }
            }
        } else {
            (raw, false)
        };

        Ok(Self {
            topic: topic.into(),
            message_count: envelope.messages.len(),
            batch_id: envelope.batch_id,
            compressed,
            payload,
        })
    }
}

/// Decode a frame produced by [`SealedBatch::seal`], raw or compressed
pub fn decode_frame(frame: &str) -> anyhow::Result<BatchEnvelope> {
    if let Ok(wrapped) = serde_json::from_str::<CompressedEnvelope>(frame)
        && wrapped.compressed
    {
        anyhow::ensure!(
            wrapped.encoding == compression::ENCODING,
            "unsupported encoding {}",
            wrapped.encoding
        );
        let raw = compression::decompress(&wrapped.data)?;
        return Ok(serde_json::from_slice(&raw)?);
    }

    Ok(serde_json::from_str(frame)?)
}

/// `<UTC yyyymmddHHMMSS.mmm>-<8 hex chars>`
pub fn new_batch_id(now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d%H%M%S%.3f"), &random[..8])
}
