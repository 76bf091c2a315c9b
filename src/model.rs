use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Location ────────────────────────────────────────────────────────────────

/// Place name used when a lookup yields nothing better.
pub const FALLBACK_PLACE_NAME: &str = "Selected Location";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::new(12.82464, 80.046536)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub coordinate: Coordinate,
    pub address: String,
    pub place_name: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

impl LocationRecord {
    /// Record carrying only the coordinate, used when lookup fails.
    pub fn fallback(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            address: coordinate.to_string(),
            place_name: FALLBACK_PLACE_NAME.to_string(),
            ..Default::default()
        }
    }

    /// Record built from user-typed text at the last picked coordinate.
    pub fn manual(coordinate: Coordinate, text: &str) -> Self {
        Self {
            coordinate,
            address: text.to_string(),
            place_name: text.to_string(),
            ..Default::default()
        }
    }
}

// ── Timestamp ───────────────────────────────────────────────────────────────

pub const DEFAULT_TIMEZONE: &str = "+05:30";

/// Offsets offered by the timezone picker, with their labels.
pub const TIMEZONES: &[(&str, &str)] = &[
    ("+05:30", "GMT +05:30 (India)"),
    ("+00:00", "GMT +00:00 (UTC)"),
    ("-05:00", "GMT -05:00 (EST)"),
    ("-08:00", "GMT -08:00 (PST)"),
    ("+01:00", "GMT +01:00 (CET)"),
    ("+08:00", "GMT +08:00 (CST)"),
    ("+09:00", "GMT +09:00 (JST)"),
];

pub fn timezone_label(offset: &str) -> &str {
    TIMEZONES
        .iter()
        .find(|(value, _)| *value == offset)
        .map(|(_, label)| *label)
        .unwrap_or(offset)
}

/// The offset is a display label only; `instant` is never shifted by it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimestampSetting {
    pub instant: NaiveDateTime,
    pub timezone: String,
}

impl TimestampSetting {
    pub fn new(instant: NaiveDateTime, timezone: impl Into<String>) -> Self {
        Self {
            instant,
            timezone: timezone.into(),
        }
    }

    pub fn now(timezone: impl Into<String>) -> Self {
        Self::new(chrono::Local::now().naive_local(), timezone)
    }
}

// ── Style ───────────────────────────────────────────────────────────────────

pub const MIN_FONT_SIZE: u32 = 10;
pub const MAX_FONT_SIZE: u32 = 18;
pub const MIN_OPACITY: f32 = 0.3;
pub const MAX_OPACITY: f32 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    #[default]
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Corner::TopLeft => "Top Left",
            Corner::TopRight => "Top Right",
            Corner::BottomLeft => "Bottom Left",
            Corner::BottomRight => "Bottom Right",
        }
    }

    pub fn is_right(self) -> bool {
        matches!(self, Corner::TopRight | Corner::BottomRight)
    }

    pub fn is_bottom(self) -> bool {
        matches!(self, Corner::BottomLeft | Corner::BottomRight)
    }
}

impl std::str::FromStr for Corner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-left" => Ok(Corner::TopLeft),
            "top-right" => Ok(Corner::TopRight),
            "bottom-left" => Ok(Corner::BottomLeft),
            "bottom-right" => Ok(Corner::BottomRight),
            other => Err(format!("unknown corner: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const WHITE: Color4 = Color4::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Accepts `#rrggbb`, `#rrggbbaa` and `rgba(r, g, b, a)`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
                return None;
            }
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .ok()
                    .map(|v| v as f32 / 255.0)
            };
            let a = if hex.len() == 8 { channel(6)? } else { 1.0 };
            return Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a));
        }
        let inner = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        let parts: Vec<f32> = inner
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [r, g, b] => Some(Self::rgba(r / 255.0, g / 255.0, b / 255.0, 1.0)),
            [r, g, b, a] => Some(Self::rgba(r / 255.0, g / 255.0, b / 255.0, a.clamp(0.0, 1.0))),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        if a == 255 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }

    /// Same colour with its alpha multiplied by `opacity`.
    pub fn faded(self, opacity: f32) -> Self {
        Self {
            a: self.a * opacity,
            ..self
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [c(self.r), c(self.g), c(self.b), c(self.a)]
    }

    pub fn rgb(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn set_rgb(&mut self, rgb: [f32; 3]) {
        self.r = rgb[0];
        self.g = rgb[1];
        self.b = rgb[2];
    }
}

impl TryFrom<String> for Color4 {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color4::parse(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Color4> for String {
    fn from(color: Color4) -> Self {
        color.to_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkStyle {
    pub corner: Corner,
    #[serde(deserialize_with = "de_font_size")]
    font_size: u32,
    #[serde(deserialize_with = "de_opacity")]
    opacity: f32,
    pub background: Color4,
    pub text: Color4,
}

fn de_font_size<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    u32::deserialize(d).map(|v| v.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE))
}

fn de_opacity<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    f32::deserialize(d).map(clamp_opacity)
}

fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() {
        MAX_OPACITY
    } else {
        value.clamp(MIN_OPACITY, MAX_OPACITY)
    }
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            corner: Corner::BottomLeft,
            font_size: 16,
            opacity: 0.9,
            background: Color4::rgba(0.0, 0.0, 0.0, 0.7),
            text: Color4::WHITE,
        }
    }
}

impl WatermarkStyle {
    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Saturates at 10 and 18.
    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }

    /// Saturates at 0.3 and 1.0.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = clamp_opacity(opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_size_saturates_at_bounds() {
        let mut style = WatermarkStyle::default();
        style.set_font_size(4);
        assert_eq!(style.font_size(), 10);
        style.set_font_size(40);
        assert_eq!(style.font_size(), 18);
        style.set_font_size(12);
        assert_eq!(style.font_size(), 12);
    }

    #[test]
    fn opacity_saturates_at_bounds() {
        let mut style = WatermarkStyle::default();
        style.set_opacity(0.0);
        assert_eq!(style.opacity(), 0.3);
        style.set_opacity(1.7);
        assert_eq!(style.opacity(), 1.0);
        style.set_opacity(f32::NAN);
        assert_eq!(style.opacity(), 1.0);
    }

    #[test]
    fn deserialized_style_is_clamped() {
        let style: WatermarkStyle =
            serde_json::from_str(r#"{"font_size": 99, "opacity": 0.1, "corner": "top-right"}"#)
                .unwrap();
        assert_eq!(style.font_size(), 18);
        assert_eq!(style.opacity(), 0.3);
        assert_eq!(style.corner, Corner::TopRight);
        assert_eq!(style.text, Color4::WHITE);
    }

    #[test]
    fn parses_css_colors() {
        let c = Color4::parse("rgba(0, 0, 0, 0.5)").unwrap();
        assert_eq!(c.to_rgba8(), [0, 0, 0, 128]);
        assert_eq!(Color4::parse("#ffffff").unwrap(), Color4::WHITE);
        assert_eq!(Color4::parse("#ff000080").unwrap().to_rgba8(), [255, 0, 0, 128]);
        assert!(Color4::parse("#fff").is_none());
        assert!(Color4::parse("blue").is_none());
    }

    #[test]
    fn fallback_record_uses_six_decimals() {
        let record = LocationRecord::fallback(Coordinate::new(1.0, 2.0));
        assert_eq!(record.address, "1.000000, 2.000000");
        assert_eq!(record.place_name, "Selected Location");
        assert!(record.city.is_empty() && record.postal_code.is_empty());
    }

    #[test]
    fn corner_from_str() {
        assert_eq!("Bottom-Right".parse::<Corner>(), Ok(Corner::BottomRight));
        assert!("middle".parse::<Corner>().is_err());
    }

    #[test]
    fn unknown_timezone_label_is_the_offset() {
        assert_eq!(timezone_label("+09:00"), "GMT +09:00 (JST)");
        assert_eq!(timezone_label("+03:00"), "+03:00");
    }
}
