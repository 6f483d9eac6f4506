//! Request paths and response payloads of the panorama processing service.
//!
//! These types describe the wire contract only. They carry no transport
//! logic so both the client and test doubles of the service can share them.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

pub mod endpoints {
    pub const CLEAR_UPLOADS: &str = "/clear-uploads";
    pub const UPLOAD: &str = "/upload";
    /// Multipart field name, repeated once per uploaded file.
    pub const UPLOAD_FIELD: &str = "files[]";
    pub const STITCH: &str = "/stitch-opencv";
    pub const GENERATE_PANORAMA: &str = "/generate-panorama";
    pub const SERVE_ALL_FILES: &str = "/serve-all-files";
    pub const SERVE_FILES: &str = "/serve-files";
    /// Query parameter used to defeat intermediate caches.
    pub const CACHE_BUST_PARAM: &str = "t";
}

/// Status code the service embeds in a successful panorama envelope.
pub const EMBEDDED_OK: u16 = 200;

/// Body of `clear-uploads` and `upload` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchReply {
    pub matched_points_path: String,
    pub panorama_image_path: String,
    pub message: String,
}

impl StitchReply {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.matched_points_path.trim().is_empty(),
            "matched_points_path must not be blank"
        );
        ensure!(
            !self.panorama_image_path.trim().is_empty(),
            "panorama_image_path must not be blank"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanoramaResults {
    #[serde(default)]
    pub panoramas: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaBody {
    pub message: String,
    #[serde(default)]
    pub results: PanoramaResults,
}

/// `generate-panorama` answers with a two element array: the body and the
/// status code the service considers authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaEnvelope(pub PanoramaBody, pub u16);

impl PanoramaEnvelope {
    pub fn body(&self) -> &PanoramaBody {
        &self.0
    }

    pub fn embedded_status(&self) -> u16 {
        self.1
    }

    pub fn is_success(&self) -> bool {
        self.1 == EMBEDDED_OK
    }

    pub fn panorama_count(&self) -> usize {
        self.0.results.panoramas.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<String>,
}

#[derive(Deserialize)]
struct LooseMessage {
    #[serde(default)]
    message: Option<String>,
}

/// Extracts a human readable message from an error response body.
///
/// Accepts either a plain `{ "message": .. }` object or a panorama envelope.
/// Blank messages count as absent.
pub fn message_from_body(body: &[u8]) -> Option<String> {
    let message = serde_json::from_slice::<LooseMessage>(body)
        .ok()
        .and_then(|loose| loose.message)
        .or_else(|| {
            serde_json::from_slice::<PanoramaEnvelope>(body)
                .ok()
                .map(|envelope| envelope.0.message)
        })?;
    if message.trim().is_empty() {
        None
    } else {
        Some(message)
    }
}
