//! Embedded image encoding.
//!
//! Images travel through the engine as `data:` URLs so that scene segments,
//! character portraits and save thumbnails serialize into save records as
//! plain strings. An empty string means "no image" (still pending, or the
//! request failed). Inside a backup archive the same field holds a
//! `ref:<filename>` pointer instead of inline data.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix marking an image field that points into a backup archive.
pub const REFERENCE_PREFIX: &str = "ref:";

const DEFAULT_MIME: &str = "image/png";

/// Errors from decoding an embedded image.
#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image is empty")]
    Empty,

    #[error("image is an archive reference, not inline data")]
    Reference,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An image embedded as a data URL (or empty, or an archive reference).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// The "no image" value.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Encode raw image bytes as a data URL with the given MIME type.
    pub fn from_bytes(bytes: &[u8], mime: &str) -> Self {
        Self(format!("data:{mime};base64,{}", BASE64_STANDARD.encode(bytes)))
    }

    /// Encode raw PNG bytes.
    pub fn png(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes, DEFAULT_MIME)
    }

    /// Wrap an already-encoded value without inspecting it.
    ///
    /// Accepts data URLs, bare base64 payloads and `ref:` pointers.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A pointer to an entry of a backup archive's `images/` directory.
    pub fn from_reference(filename: &str) -> Self {
        Self(format!("{REFERENCE_PREFIX}{filename}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The archive filename if this is a `ref:` pointer.
    pub fn reference(&self) -> Option<&str> {
        self.0.strip_prefix(REFERENCE_PREFIX)
    }

    /// Whether this holds inline image data (neither empty nor a reference).
    pub fn is_inline(&self) -> bool {
        !self.is_empty() && self.reference().is_none()
    }

    /// MIME type declared by the data URL; bare base64 is assumed to be PNG.
    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_MIME)
    }

    /// Decode the payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, ImageDecodeError> {
        if self.is_empty() {
            return Err(ImageDecodeError::Empty);
        }
        if self.reference().is_some() {
            return Err(ImageDecodeError::Reference);
        }
        let payload = match self.0.split_once(',') {
            Some((_, data)) => data,
            None => self.0.as_str(),
        };
        Ok(BASE64_STANDARD.decode(payload.trim())?)
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<no image>")
        } else if let Some(name) = self.reference() {
            write!(f, "<ref {name}>")
        } else {
            write!(f, "<{} image, {} chars>", self.mime_type(), self.0.len())
        }
    }
}

/// File extension used when an image of this MIME type is written to disk.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// MIME type for a stored image file extension (PNG when unknown).
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => DEFAULT_MIME,
    }
}
