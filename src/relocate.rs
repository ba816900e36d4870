//! Moves a locally selected file into a bucket and returns its public URL.

use bytes::Bytes;
use log::{info, warn};
use std::path::Path;

use crate::backend::ObjectStore;
use crate::constants::{generate_upload_token, PUBLIC_PREFIX};
use crate::error::{AdminError, Result};

/// A file chosen by the operator, not yet stored anywhere
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl LocalFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AdminError::Validation(format!("'{}' has no usable file name", path.display()))
            })?
            .to_string();
        let content_type = guess_content_type(&file_name).to_string();
        Ok(Self::new(file_name, content_type, data))
    }
}

/// Content type for the media extensions the admin screens accept
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = split_extension(file_name)
        .1
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}

/// Keep names URL-safe so the object path can be recovered from its URL
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Object name of the form `<stem>_<timestamp_ms>_<token>.<ext>`
pub fn unique_object_name(file_name: &str, timestamp_ms: i64, token: &str) -> String {
    // browsers may hand over a full path
    let base = file_name
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(file_name);
    let (stem, ext) = split_extension(base);
    let stem = if stem.is_empty() { "file".to_string() } else { sanitize(stem) };
    match ext {
        Some(ext) => format!("{}_{}_{}.{}", stem, timestamp_ms, token, sanitize(ext)),
        None => format!("{}_{}_{}", stem, timestamp_ms, token),
    }
}

/// Upload `file` into `bucket` under the public prefix and return its public URL
pub async fn relocate(objects: &dyn ObjectStore, file: &LocalFile, bucket: &str) -> Result<String> {
    let name = unique_object_name(
        &file.file_name,
        chrono::Utc::now().timestamp_millis(),
        &generate_upload_token(),
    );
    let path = format!("{}/{}", PUBLIC_PREFIX, name);

    objects
        .upload(bucket, &path, file.data.clone(), &file.content_type)
        .await
        .map_err(|e| match e {
            AdminError::Upload(_) => e,
            other => AdminError::Upload(format!("{}/{}: {}", bucket, path, other)),
        })?;

    let url = objects.public_url(bucket, &path).map_err(|e| {
        warn!("Uploaded {}/{} but could not resolve its URL: {}", bucket, path, e);
        match e {
            AdminError::UrlResolution(_) => e,
            other => AdminError::UrlResolution(other.to_string()),
        }
    })?;

    info!("Relocated '{}' to {}", file.file_name, url);
    Ok(url)
}

/// Recover the object path (`public/<name>`) referenced by a stored URL.
///
/// The name is percent-decoded so it compares equal to what `ObjectStore::list` returns.
pub fn object_path_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let name = urlencoding::decode(segment).ok()?;
    Some(format!("{}/{}", PUBLIC_PREFIX, name))
}
