use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Please select a JPG or PNG image file.")]
    UnsupportedType { mime: String },

    #[error("Please select an image smaller than 10MB.")]
    TooLarge { size: u64 },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Location not found. Please try a different search term.")]
    NotFound,

    #[error("Search failed. Please try again.")]
    Transport(#[from] reqwest::Error),

    #[error("Unable to get your current location. Please select manually on the map.")]
    PermissionDenied,

    #[error("Lookup returned an unexpected response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read EXIF data: {0}")]
    Exif(#[from] exif::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Select a location before exporting")]
    NoLocation,

    #[error("No image loaded")]
    NoImage,

    #[error("An export is already running")]
    Busy,

    #[error("No usable font: {0}")]
    Font(String),

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
