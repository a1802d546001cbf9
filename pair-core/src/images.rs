// pair-core/src/images.rs
use crate::errors::{PairError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Extensions accepted as images, with their MIME types.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

/// The MIME type for an image path, judged by its extension.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

pub fn is_image_path(path: &Path) -> bool {
    image_mime_type(path).is_some()
}

/// Reads an image file into a `data:<mime>;base64,<payload>` URL.
pub fn image_to_data_url(path: &Path) -> Result<String> {
    let mime = image_mime_type(path).ok_or_else(|| {
        PairError::InvalidImageData(format!("Unsupported image type: {}", path.display()))
    })?;
    let bytes = fs::read(path).map_err(|source| PairError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), mime, "Encoding image.");
    Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
}
