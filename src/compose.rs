//! Watermark text and placement.
//!
//! Everything here is a pure function of its inputs: the preview and the
//! exporter both call [`compose`] every time they draw.

use crate::model::{Coordinate, Corner, LocationRecord, TimestampSetting};
use chrono::NaiveDateTime;

pub const TITLE: &str = "GPS Map Camera";
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Distance between the overlay box and the two edges of its corner, in
/// logical pixels.
pub const CORNER_INSET: f32 = 16.0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposedOverlay {
    pub title: String,
    pub place: String,
    pub address: String,
    pub coordinates: String,
    pub timestamp: String,
}

impl ComposedOverlay {
    /// Nothing to render; export must stay disabled.
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.coordinates.is_empty() && self.timestamp.is_empty()
    }

    /// `Lat X Long Y dd/mm/yyyy HH:mm GMT <offset>`
    pub fn coordinate_line(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("{} {}", self.coordinates, self.timestamp)
    }
}

pub fn format_coordinates(coordinate: Coordinate) -> String {
    format!(
        "Lat {:.6} Long {:.6}",
        coordinate.latitude, coordinate.longitude
    )
}

pub fn format_instant(instant: NaiveDateTime) -> String {
    instant.format(DATE_FORMAT).to_string()
}

/// The offset is appended verbatim; no conversion is applied to the instant.
pub fn format_timestamp(timestamp: &TimestampSetting) -> String {
    format!(
        "{} GMT {}",
        format_instant(timestamp.instant),
        timestamp.timezone
    )
}

pub fn compose(location: Option<&LocationRecord>, timestamp: &TimestampSetting) -> ComposedOverlay {
    let Some(location) = location else {
        return ComposedOverlay::default();
    };
    let place = if location.place_name.is_empty() {
        location.address.clone()
    } else {
        location.place_name.clone()
    };
    ComposedOverlay {
        title: TITLE.to_string(),
        place,
        address: location.address.clone(),
        coordinates: format_coordinates(location.coordinate),
        timestamp: format_timestamp(timestamp),
    }
}

// ── Placement ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub corner: Corner,
    pub inset: f32,
}

impl Placement {
    pub fn new(corner: Corner, scale: f32) -> Self {
        Self {
            corner,
            inset: CORNER_INSET * scale,
        }
    }

    /// Top-left of a `box_size` overlay inside a `canvas` sized area.
    ///
    /// The box is not kept inside the canvas: a box larger than the canvas
    /// yields a negative origin.
    pub fn origin(&self, canvas: (f32, f32), box_size: (f32, f32)) -> (f32, f32) {
        let x = if self.corner.is_right() {
            canvas.0 - self.inset - box_size.0
        } else {
            self.inset
        };
        let y = if self.corner.is_bottom() {
            canvas.1 - self.inset - box_size.1
        } else {
            self.inset
        };
        (x, y)
    }
}
