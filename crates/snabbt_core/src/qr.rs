use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Reference to one rendition of the BankID QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    /// Direct URL to the image in short-lived object storage.
    Url(String),
    /// Embedded base64 image data.
    Data(String),
}

impl QrPayload {
    pub fn as_str(&self) -> &str {
        match self {
            QrPayload::Url(url) => url,
            QrPayload::Data(data) => data,
        }
    }

    pub fn content_hash(&self) -> ContentHash {
        let tag: &[u8] = match self {
            QrPayload::Url(_) => b"url:",
            QrPayload::Data(_) => b"data:",
        };
        ContentHash::of_parts(&[tag, self.as_str().trim().as_bytes()])
    }
}

/// SHA-256 digest of a QR payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self::of_parts(&[bytes])
    }

    fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// First four bytes as hex, for logs and the liveness indicator.
    pub fn short(&self) -> String {
        hex(&self.0[..4])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// One observed QR rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrFrame {
    pub payload: QrPayload,
    pub content_hash: ContentHash,
    pub observed_at: DateTime<Utc>,
}

impl QrFrame {
    pub fn new(payload: QrPayload, observed_at: DateTime<Utc>) -> Self {
        let content_hash = payload.content_hash();
        Self {
            payload,
            content_hash,
            observed_at,
        }
    }
}
