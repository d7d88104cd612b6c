//! Sink for captured visitor photos.
//!
//! The edge device sends a base64 JPEG alongside the embedding. The photo is
//! auxiliary metadata: any failure here is logged and the identification
//! proceeds without a photo.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::PathBuf;

pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Decode and persist a captured photo, returning its serving path.
    /// Returns `None` (after logging) when the payload is not valid base64
    /// or the write fails.
    pub fn save(&self, key: &str, image_base64: &str) -> Option<String> {
        // Tolerate data-URL payloads ("data:image/jpeg;base64,...").
        let payload = image_base64
            .rsplit_once(',')
            .map(|(_, b64)| b64)
            .unwrap_or(image_base64);

        let bytes = match BASE64.decode(payload.trim()) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "photo payload is not valid base64; skipping");
                return None;
            }
        };

        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "cannot create photo dir");
            return None;
        }

        let filename = format!("{key}.jpg");
        let path = self.dir.join(&filename);
        match std::fs::write(&path, bytes) {
            Ok(()) => Some(format!("/photos/{filename}")),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "photo write failed");
                None
            }
        }
    }
}
