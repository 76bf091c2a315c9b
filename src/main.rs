use anyhow::{bail, Context};
use clap::Parser;
use eframe::egui;
use geostamp::app::GeostampApp;
use geostamp::config::{Command, Config, ProgramArgs, RenderArgs};
use geostamp::location::{FixedPosition, LocationAction, LookupOutcome, LookupWorker};
use geostamp::metadata::ExifReader;
use geostamp::model::{Coordinate, Corner, TimestampSetting};
use geostamp::nominatim::NominatimClient;
use geostamp::rasterize::OverlayRasterizer;
use geostamp::session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ── Headless render ─────────────────────────────────────────────────────────

fn render(args: RenderArgs, config: Config) -> anyhow::Result<PathBuf> {
    let lookup = NominatimClient::new(&config.nominatim_url, &config.user_agent)?;
    let timezone = args.timezone.unwrap_or(config.default_timezone);
    let mut session = Session::new(
        TimestampSetting::now(timezone),
        config.style,
        Coordinate::default(),
    );
    if let Some(size) = args.font_size {
        session.style.set_font_size(size);
    }
    if let Some(opacity) = args.opacity {
        session.style.set_opacity(opacity);
    }
    if let Some(corner) = args.corner {
        session.style.corner = corner.parse::<Corner>().map_err(anyhow::Error::msg)?;
    }

    session.open_image(&args.input, &ExifReader)?;

    if let Some(time) = args.time {
        let instant = chrono::NaiveDateTime::parse_from_str(&time, "%Y-%m-%d %H:%M")
            .with_context(|| format!("--time {time:?} is not YYYY-MM-DD HH:MM"))?;
        if !session.timestamp.manual_enabled() {
            session.timestamp.toggle_auto();
        }
        session.timestamp.set_instant(instant);
    }

    let coordinate = args.lat.zip(args.lon).map(|(lat, lon)| Coordinate::new(lat, lon));
    if let Some(address) = args.address {
        if let Some(coordinate) = coordinate {
            session.location.set_position(coordinate);
        }
        if !session.location.enter_manual(&address) {
            bail!("--address must not be blank");
        }
    } else {
        let action = match (coordinate, args.search) {
            (Some(coordinate), _) => LocationAction::Click(coordinate),
            (None, Some(query)) => LocationAction::Search(query),
            (None, None) => LocationAction::CurrentPosition,
        };
        let position = FixedPosition(config.home_position);
        session.location.begin(&action);
        let result = LookupWorker::run(&action, &lookup, &position);
        if let Some(notice) = session.location.finish(LookupOutcome { action, result }) {
            bail!(notice.0);
        }
    }

    let rasterizer = OverlayRasterizer::from_config(config.font_path.as_deref())?;
    let out_dir = args.output.unwrap_or(config.output_dir);
    let now = chrono::Utc::now().timestamp_millis();
    Ok(session.export(&rasterizer, &out_dir, now)?)
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geostamp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = ProgramArgs::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    if let Some(Command::Render(render_args)) = args.command {
        let path = render(render_args, config)?;
        println!("{}", path.display());
        return Ok(());
    }

    if let Some(path) = &args.image {
        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
    }

    let lookup = Arc::new(NominatimClient::new(&config.nominatim_url, &config.user_agent)?);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 820.0])
            .with_drag_and_drop(true)
            .with_title("geostamp"),
        ..Default::default()
    };

    eframe::run_native(
        "geostamp",
        options,
        Box::new(move |_cc| Ok(Box::new(GeostampApp::new(config, lookup, args.image)))),
    )
    .map_err(|e| anyhow::anyhow!("failed to run eframe: {e}"))
}
