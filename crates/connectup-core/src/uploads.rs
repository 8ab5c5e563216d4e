//! # Uploads
//!
//! Upload records and the pure parts of the upload path: binary type
//! parsing, storage path layout, filename cleanup and image sniffing. The
//! bytes themselves go through the app's blob store.

use crate::storage::{Record, RecordTable};
use crate::{CoreError, CoreResult, Timestamp, UploadId, UserId, WriteTx};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Bucket every upload is written to.
pub const UPLOADS_BUCKET: &str = "uploads";

/// Lifetime of a shareable upload URL.
pub const URL_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryType {
    Image,
    Video,
    Audio,
    Document,
}

impl BinaryType {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            _ => Err(CoreError::invalid("invalid file type")),
        }
    }

    /// Top-level storage directory.
    #[must_use]
    pub fn directory(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
            Self::Audio => "audios",
            Self::Document => "documents",
        }
    }
}

/// Strip directories and control characters from a client filename.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Purpose segment of the path (`profile`, `group`, ...). Anything outside
/// `[a-z0-9_-]` is dropped; empty becomes `misc`.
#[must_use]
pub fn sanitize_kind(raw: &str) -> String {
    let kind: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if kind.is_empty() { "misc".to_string() } else { kind }
}

/// `{images|videos|audios|documents}/{kind}/{unix}-{filename}`.
#[must_use]
pub fn storage_path(binary: BinaryType, kind: &str, filename: &str, now: Timestamp) -> String {
    format!(
        "{}/{}/{}-{}",
        binary.directory(),
        sanitize_kind(kind),
        now.timestamp(),
        sanitize_filename(filename)
    )
}

/// Image formats recognised by [`sniff_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

impl ImageFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Svg => "image/svg+xml",
        }
    }
}

/// Detect an image by its leading bytes.
#[must_use]
pub fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(ImageFormat::Png);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        return Some(ImageFormat::Svg);
    }
    None
}

/// Reject image uploads whose bytes are not an image.
pub fn check_content(binary: BinaryType, bytes: &[u8]) -> CoreResult<Option<ImageFormat>> {
    match binary {
        BinaryType::Image => sniff_image(bytes)
            .map(Some)
            .ok_or_else(|| CoreError::invalid("file is not an image")),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: UploadId,
    pub uid: String,
    pub name: String,
    pub bucket: String,
    pub path: String,
    pub kind: String,
    pub binary_type: BinaryType,
    pub url: String,
    pub url_expires_at: Timestamp,
    pub uploaded_by: UserId,
    pub created_at: Timestamp,
}

impl Record for Upload {
    const TABLE: RecordTable = TableDefinition::new("uploads");
    const KIND: &'static str = "attachment";
    fn key(&self) -> u64 {
        self.id.0
    }
}

/// Metadata of a stored blob.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub name: String,
    pub path: String,
    pub kind: String,
    pub binary_type: BinaryType,
    pub url: String,
    pub url_expires_at: Timestamp,
    pub uploaded_by: UserId,
}

pub fn record_upload(tx: &WriteTx, input: NewUpload, now: Timestamp) -> CoreResult<Upload> {
    let upload = Upload {
        id: UploadId(tx.next_id::<Upload>()?),
        uid: uuid::Uuid::new_v4().to_string(),
        name: input.name,
        bucket: UPLOADS_BUCKET.to_string(),
        path: input.path,
        kind: sanitize_kind(&input.kind),
        binary_type: input.binary_type,
        url: input.url,
        url_expires_at: input.url_expires_at,
        uploaded_by: input.uploaded_by,
        created_at: now,
    };
    tx.put(&upload)?;
    Ok(upload)
}

/// Response body of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: UploadId,
    #[serde(rename = "imageUID")]
    pub image_uid: String,
    pub url: String,
    pub thumbnail_url: String,
}

impl From<&Upload> for UploadResponse {
    fn from(upload: &Upload) -> Self {
        let thumbnail_url = match upload.binary_type {
            BinaryType::Video => String::new(),
            _ => upload.url.clone(),
        };
        Self {
            id: upload.id,
            image_uid: upload.uid.clone(),
            url: upload.url.clone(),
            thumbnail_url,
        }
    }
}
