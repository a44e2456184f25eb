//! Image upload processing and storage.
//!
//! Uploaded bytes are checked, optionally resized, and handed to an
//! [`ImageStore`]. The returned reference is a URL path that can be stored
//! directly in an `image` or `thumbnail` field.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Maximum upload size (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Longest side of a resized image, in pixels.
pub const MAX_DIMENSION: u32 = 1200;

/// JPEG quality for resized images.
const JPEG_QUALITY: u8 = 85;

/// URL prefix under which stored images are served.
pub const UPLOAD_URL_PREFIX: &str = "/uploads";

/// Errors that can occur while processing or storing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("empty file")]
    Empty,

    #[error("file too large (maximum {max} bytes)")]
    TooLarge { max: usize },

    #[error("unsupported image format; use JPEG, PNG or WebP")]
    Unsupported,

    #[error("invalid image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("not an upload reference: {0}")]
    InvalidReference(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image task failed: {0}")]
    Task(String),
}

impl ImageError {
    /// Whether the client sent something unusable (as opposed to a server fault).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::TooLarge { .. } | Self::Unsupported | Self::Decode(_)
        )
    }
}

/// Where processed images are kept.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store bytes and return a reference such as `/uploads/<id>.jpg`.
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, ImageError>;

    /// Remove a previously stored image.
    async fn delete(&self, reference: &str) -> Result<(), ImageError>;
}

/// Stores images as files in one directory.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the files live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a reference back to a file in `dir`, refusing anything that
    /// could escape it.
    fn path_for(&self, reference: &str) -> Result<PathBuf, ImageError> {
        let name = reference
            .strip_prefix(UPLOAD_URL_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| {
                !name.is_empty()
                    && !name.contains(['/', '\\'])
                    && !name.starts_with('.')
            })
            .ok_or_else(|| ImageError::InvalidReference(reference.to_owned()))?;
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, ImageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{}.{extension}", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("{UPLOAD_URL_PREFIX}/{name}"))
    }

    async fn delete(&self, reference: &str) -> Result<(), ImageError> {
        let path = self.path_for(reference)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

/// Validate, optionally resize, and store an uploaded image.
///
/// With `resize`, the longest side is capped at [`MAX_DIMENSION`] (smaller
/// images keep their size) and the result is re-encoded as JPEG. Without it
/// the original bytes are stored unchanged.
///
/// # Errors
///
/// Returns a client-side `ImageError` for empty, oversized or undecodable
/// input, and `Io`/`Encode`/`Task` for server-side failures.
#[instrument(skip(store, bytes), fields(size = bytes.len()))]
pub async fn process_upload(
    store: &dyn ImageStore,
    bytes: Vec<u8>,
    resize: bool,
) -> Result<String, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ImageError::TooLarge {
            max: MAX_UPLOAD_BYTES,
        });
    }

    let (bytes, extension) = tokio::task::spawn_blocking(move || prepare(bytes, resize))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))??;

    let reference = store.put(bytes, extension).await?;
    tracing::info!(%reference, resize, "Image stored");
    Ok(reference)
}

/// Decode and optionally shrink. Returns the bytes to store and their
/// file extension.
fn prepare(bytes: Vec<u8>, resize: bool) -> Result<(Vec<u8>, &'static str), ImageError> {
    let format = image::guess_format(&bytes).map_err(|_| ImageError::Unsupported)?;
    let extension = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        _ => return Err(ImageError::Unsupported),
    };

    let img = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    if !resize {
        return Ok((bytes, extension));
    }

    Ok((encode_jpeg(&fit_within(img, MAX_DIMENSION))?, "jpg"))
}

/// Scale down so neither side exceeds `max`, keeping the aspect ratio.
fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max {
        return img;
    }
    img.resize(max, max, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buffer), JPEG_QUALITY);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_resize_caps_longest_side() {
        let (bytes, ext) = prepare(png(2400, 1200), true).unwrap();
        assert_eq!(ext, "jpg");
        let out = image::load_from_memory(&bytes).unwrap();
        assert_eq!((out.width(), out.height()), (1200, 600));
    }

    #[test]
    fn test_resize_never_upscales() {
        let (bytes, _) = prepare(png(300, 500), true).unwrap();
        let out = image::load_from_memory(&bytes).unwrap();
        assert_eq!((out.width(), out.height()), (300, 500));
    }

    #[test]
    fn test_without_resize_keeps_original() {
        let original = png(2400, 1200);
        let (bytes, ext) = prepare(original.clone(), false).unwrap();
        assert_eq!(ext, "png");
        assert_eq!(bytes, original);
    }

    #[test]
    fn test_rejects_non_image() {
        assert!(matches!(
            prepare(b"definitely not an image".to_vec(), true),
            Err(ImageError::Unsupported)
        ));
    }

    #[test]
    fn test_reference_cannot_escape_dir() {
        let store = LocalImageStore::new("/srv/uploads");
        assert!(store.path_for("/uploads/abc.jpg").is_ok());
        assert!(store.path_for("/uploads/../etc/passwd").is_err());
        assert!(store.path_for("/uploads/").is_err());
        assert!(store.path_for("https://cdn.example/abc.jpg").is_err());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let store = LocalImageStore::new(std::env::temp_dir());
        assert!(matches!(
            process_upload(&store, Vec::new(), true).await,
            Err(ImageError::Empty)
        ));
    }
}
