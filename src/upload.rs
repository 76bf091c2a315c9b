use crate::error::UploadError;
use image::DynamicImage;
use std::path::{Path, PathBuf};

pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const ACCEPTED_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// Declared type of a file, taken from its extension.
pub fn declared_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub fn validate(mime: &str, size: u64) -> Result<(), UploadError> {
    if !ACCEPTED_TYPES.contains(&mime) {
        return Err(UploadError::UnsupportedType {
            mime: mime.to_string(),
        });
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge { size });
    }
    Ok(())
}

#[derive(Debug)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

/// Validates type and size before reading anything, then decodes.
pub fn load(path: &Path) -> Result<LoadedImage, UploadError> {
    let io_err = |source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    validate(declared_mime(path), size)?;
    let bytes = std::fs::read(path).map_err(io_err)?;
    let image = image::load_from_memory(&bytes)?;
    tracing::info!(
        path = %path.display(),
        size,
        width = image.width(),
        height = image.height(),
        "image loaded"
    );
    Ok(LoadedImage {
        path: path.to_path_buf(),
        bytes,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn rejects_gif() {
        assert_matches!(
            validate("image/gif", 1024),
            Err(UploadError::UnsupportedType { mime }) if mime == "image/gif"
        );
        assert_eq!(
            validate("image/gif", 1024).unwrap_err().to_string(),
            "Please select a JPG or PNG image file."
        );
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(validate("image/png", MAX_UPLOAD_BYTES).is_ok());
        assert_matches!(
            validate("image/jpeg", MAX_UPLOAD_BYTES + 1),
            Err(UploadError::TooLarge { .. })
        );
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(declared_mime(Path::new("a/IMG_001.JPG")), "image/jpeg");
        assert_eq!(declared_mime(Path::new("b.png")), "image/png");
        assert_eq!(declared_mime(Path::new("c.gif")), "image/gif");
        assert_eq!(declared_mime(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn load_rejects_gif_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        std::fs::write(&path, b"GIF89a").unwrap();
        assert_matches!(load(&path), Err(UploadError::UnsupportedType { .. }));
    }

    #[test]
    fn load_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!((loaded.image.width(), loaded.image.height()), (3, 2));
        assert!(!loaded.bytes.is_empty());
        assert!(format!("{loaded:?}").contains("photo.png"));
    }
}
