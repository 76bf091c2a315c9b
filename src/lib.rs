pub mod app;
pub mod compose;
pub mod config;
pub mod error;
pub mod location;
pub mod metadata;
pub mod model;
pub mod nominatim;
pub mod rasterize;
pub mod session;
pub mod timestamp;
pub mod upload;
