use crate::error::ConfigError;
use crate::model::{Coordinate, WatermarkStyle, DEFAULT_TIMEZONE};
use crate::nominatim::DEFAULT_BASE_URL;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stamp photos with a GPS location and timestamp watermark.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct ProgramArgs {
    /// JSON config file
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,

    /// Image to open on startup
    #[clap(value_parser)]
    pub image: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watermark an image without opening the window
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Input JPG or PNG
    #[clap(value_parser)]
    pub input: PathBuf,

    #[clap(long, value_parser, allow_hyphen_values = true, requires = "lon")]
    pub lat: Option<f64>,

    #[clap(long, value_parser, allow_hyphen_values = true, requires = "lat")]
    pub lon: Option<f64>,

    /// Free-text search instead of a coordinate
    #[clap(long, value_parser, conflicts_with = "lat")]
    pub search: Option<String>,

    /// Use this text as the address instead of a lookup
    #[clap(long, value_parser)]
    pub address: Option<String>,

    /// Capture time override, `YYYY-MM-DD HH:MM`
    #[clap(long, value_parser)]
    pub time: Option<String>,

    /// Timezone label, e.g. +05:30
    #[clap(long, value_parser, allow_hyphen_values = true)]
    pub timezone: Option<String>,

    #[clap(long, value_parser)]
    pub font_size: Option<u32>,

    #[clap(long, value_parser)]
    pub opacity: Option<f32>,

    /// top-left, top-right, bottom-left or bottom-right
    #[clap(long, value_parser)]
    pub corner: Option<String>,

    /// Output directory (defaults to the config's)
    #[clap(short, long, value_parser)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nominatim_url: String,
    pub user_agent: String,
    pub default_timezone: String,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    /// Answer for "use current position"; unset means no permission.
    pub home_position: Option<Coordinate>,
    pub style: WatermarkStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nominatim_url: DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("geostamp/", env!("CARGO_PKG_VERSION")).to_string(),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            output_dir: PathBuf::from("."),
            font_path: None,
            home_position: None,
            style: WatermarkStyle::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Corner;

    #[test]
    fn missing_keys_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"default_timezone": "+00:00"}"#).unwrap();
        assert_eq!(config.default_timezone, "+00:00");
        assert_eq!(config.nominatim_url, DEFAULT_BASE_URL);
        assert_eq!(config.home_position, None);
        assert_eq!(config.style, WatermarkStyle::default());
    }

    #[test]
    fn loads_file_with_style() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geostamp.json");
        std::fs::write(
            &path,
            r##"{
                "home_position": {"latitude": 25.6, "longitude": 85.1},
                "style": {"corner": "top-left", "font_size": 12, "text": "#ffcc00"}
            }"##,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.home_position, Some(Coordinate::new(25.6, 85.1)));
        assert_eq!(config.style.corner, Corner::TopLeft);
        assert_eq!(config.style.font_size(), 12);
        assert_eq!(config.style.text.to_hex(), "#ffcc00");
    }

    #[test]
    fn bad_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn render_args_parse() {
        let args = ProgramArgs::parse_from([
            "geostamp",
            "render",
            "in.jpg",
            "--lat",
            "-33.86",
            "--lon",
            "151.2",
            "--timezone",
            "-05:00",
        ]);
        let Some(Command::Render(render)) = args.command else {
            panic!("expected render");
        };
        assert_eq!(render.lat, Some(-33.86));
        assert_eq!(render.timezone.as_deref(), Some("-05:00"));
    }
}
