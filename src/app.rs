use crate::compose::{format_instant, format_timestamp, ComposedOverlay};
use crate::config::Config;
use crate::location::{
    FixedPosition, LocationAction, LocationLookup, LocationState, LookupWorker, Notice,
};
use crate::metadata::{ExifReader, MetadataReader};
use crate::model::{
    timezone_label, Color4, Coordinate, Corner, TimestampSetting, WatermarkStyle, MAX_FONT_SIZE,
    MAX_OPACITY, MIN_FONT_SIZE, MIN_OPACITY, TIMEZONES,
};
use crate::rasterize::{OverlayRasterizer, Rasterizer};
use crate::session::{ExportWorker, Session};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use eframe::egui;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXPORT_FAILED: &str = "Failed to download image. Please try again.";

/// Preview texture and the inputs it was rasterized from.
struct Preview {
    texture: egui::TextureHandle,
    overlay: ComposedOverlay,
    style: WatermarkStyle,
}

pub struct GeostampApp {
    session: Session,
    worker: LookupWorker,
    reader: Box<dyn MetadataReader>,
    rasterizer: Option<Arc<OverlayRasterizer>>,
    exporter: Option<ExportWorker>,
    output_dir: PathBuf,

    preview: Option<Preview>,
    notices: VecDeque<Notice>,
    status: Option<String>,

    // location inputs
    search_buf: String,
    manual_buf: String,
    pick: Coordinate,

    show_options: bool,
}

impl GeostampApp {
    pub fn new(config: Config, lookup: Arc<dyn LocationLookup>, image: Option<PathBuf>) -> Self {
        let position = Arc::new(FixedPosition(config.home_position));
        let rasterizer = match OverlayRasterizer::from_config(config.font_path.as_deref()) {
            Ok(r) => Some(Arc::new(r)),
            Err(err) => {
                tracing::error!(error = %err, "no font for export");
                None
            }
        };
        let session = Session::new(
            TimestampSetting::now(config.default_timezone.clone()),
            config.style.clone(),
            Coordinate::default(),
        );
        let exporter = rasterizer
            .as_ref()
            .map(|r| ExportWorker::new(Arc::clone(r) as Arc<dyn Rasterizer>));
        let pick = session.location.position();
        let mut app = Self {
            session,
            worker: LookupWorker::new(lookup, position),
            reader: Box::new(ExifReader),
            rasterizer,
            exporter,
            output_dir: config.output_dir,
            preview: None,
            notices: VecDeque::new(),
            status: None,
            search_buf: String::new(),
            manual_buf: String::new(),
            pick,
            show_options: false,
        };
        if let Some(path) = image {
            app.open(&path);
        }
        app
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notices.push_back(Notice(message.into()));
    }

    fn open(&mut self, path: &Path) {
        match self.session.open_image(path, self.reader.as_ref()) {
            Ok(()) => {
                self.preview = None;
                self.status = None;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "image rejected");
                self.notify(err.to_string());
            }
        }
    }

    fn start(&mut self, action: LocationAction) {
        self.worker.spawn(&mut self.session.location, action);
    }

    fn export(&mut self) {
        let Some(exporter) = &self.exporter else {
            self.notify(EXPORT_FAILED);
            return;
        };
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(err) = exporter.spawn(&mut self.session, &self.output_dir, now) {
            tracing::warn!(error = %err, "export not started");
            self.notify(EXPORT_FAILED);
        }
    }

    fn poll_export(&mut self) {
        let Some(result) = self.exporter.as_ref().and_then(|e| e.poll(&mut self.session)) else {
            return;
        };
        match result {
            Ok(path) => self.status = Some(format!("Saved {}", path.display())),
            Err(_) => self.notify(EXPORT_FAILED),
        }
    }

    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let (Some(loaded), Some(rasterizer)) = (&self.session.image, &self.rasterizer) else {
            return;
        };
        let overlay = self.session.overlay();
        let style = &self.session.style;
        if let Some(p) = &self.preview {
            if p.overlay == overlay && &p.style == style {
                return;
            }
        }
        match rasterizer.rasterize(&loaded.image, &overlay, style, 1.0) {
            Ok(rgba) => {
                let size = [rgba.width() as usize, rgba.height() as usize];
                let pixels = rgba.as_flat_samples();
                let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
                self.preview = Some(Preview {
                    texture: ctx.load_texture("preview", color_image, egui::TextureOptions::LINEAR),
                    overlay,
                    style: style.clone(),
                });
            }
            Err(err) => tracing::error!(error = %err, "preview failed"),
        }
    }

    // ── Panels ──────────────────────────────────────────────────────────────

    fn upload_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Upload Photo");
        if ui.button("Choose photo…").clicked() {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("Images", &["jpg", "jpeg", "png"])
                .pick_file()
            {
                self.open(&path);
            }
        }
        ui.label("Drop a JPG or PNG up to 10MB anywhere in the window.");
        if let Some(loaded) = &self.session.image {
            ui.label(loaded.path.display().to_string());
        }
    }

    fn location_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Select Location");
        let loading = self.session.location.is_loading();

        ui.horizontal(|ui| {
            let edit = ui.add(
                egui::TextEdit::singleline(&mut self.search_buf)
                    .hint_text("Search for hospitals, landmarks, buildings..."),
            );
            let submitted = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui.add_enabled(!loading, egui::Button::new("Search")).clicked();
            if submitted || clicked {
                self.start(LocationAction::Search(self.search_buf.clone()));
            }
            if ui
                .add_enabled(!loading, egui::Button::new("⌖"))
                .on_hover_text("Use current location")
                .clicked()
            {
                self.start(LocationAction::CurrentPosition);
            }
        });

        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.manual_buf)
                    .hint_text("Or type location manually"),
            );
            if ui.button("Use Manual").clicked() {
                self.session.location.enter_manual(&self.manual_buf);
            }
        });

        ui.horizontal(|ui| {
            ui.label("Lat");
            ui.add(
                egui::DragValue::new(&mut self.pick.latitude)
                    .range(-90.0..=90.0)
                    .speed(0.0001)
                    .fixed_decimals(6),
            );
            ui.label("Long");
            ui.add(
                egui::DragValue::new(&mut self.pick.longitude)
                    .range(-180.0..=180.0)
                    .speed(0.0001)
                    .fixed_decimals(6),
            );
            if ui.button("Pick").clicked() {
                self.start(LocationAction::Click(self.pick));
            }
        });

        if loading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading location...");
            });
        }
        ui.label(format!("Current coordinates: {}", self.session.location.position()));
        if self.session.location.state() == LocationState::ResolvedFallback {
            ui.weak("Address lookup unavailable; using coordinates.");
        }
    }

    fn timestamp_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Set Date & Time");
        let ts = &mut self.session.timestamp;

        if let Some(detected) = ts.detected() {
            ui.horizontal(|ui| {
                ui.label(format!(
                    "Auto-detected from photo EXIF data: {}",
                    format_instant(detected)
                ));
                let label = if ts.uses_auto() { "Using Auto" } else { "Use Auto" };
                if ui.selectable_label(ts.uses_auto(), label).clicked() {
                    ts.toggle_auto();
                }
            });
        }

        let current = ts.setting().instant;
        let mut date = current.date();
        let (mut hour, mut minute) = (current.hour(), current.minute());
        ui.add_enabled_ui(ts.manual_enabled(), |ui| {
            ui.horizontal(|ui| {
                ui.add(egui_extras::DatePickerButton::new(&mut date));
                ui.add(egui::DragValue::new(&mut hour).range(0..=23).suffix(" h"));
                ui.add(egui::DragValue::new(&mut minute).range(0..=59).suffix(" min"));
            });
        });
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, current.second()) {
            let edited = NaiveDateTime::new(date, time);
            if edited != current {
                ts.set_instant(edited);
            }
        }

        let mut timezone = ts.setting().timezone.clone();
        egui::ComboBox::from_label("Timezone")
            .selected_text(timezone_label(&timezone).to_string())
            .show_ui(ui, |ui| {
                for (value, label) in TIMEZONES {
                    ui.selectable_value(&mut timezone, value.to_string(), *label);
                }
            });
        if timezone != ts.setting().timezone {
            ts.set_timezone(timezone);
        }

        ui.label(format!("Final timestamp: {}", format_timestamp(ts.setting())));
    }

    fn options_ui(&mut self, ui: &mut egui::Ui) {
        let style = &mut self.session.style;
        ui.horizontal_wrapped(|ui| {
            let mut corner = style.corner;
            egui::ComboBox::from_label("Position")
                .selected_text(corner.label())
                .show_ui(ui, |ui| {
                    for c in Corner::ALL {
                        ui.selectable_value(&mut corner, c, c.label());
                    }
                });
            style.corner = corner;

            ui.separator();
            let mut size = style.font_size();
            ui.add(egui::Slider::new(&mut size, MIN_FONT_SIZE..=MAX_FONT_SIZE).text("Font"));
            style.set_font_size(size);

            ui.separator();
            let mut opacity = style.opacity();
            ui.add(
                egui::Slider::new(&mut opacity, MIN_OPACITY..=MAX_OPACITY)
                    .step_by(0.1)
                    .text("Opacity"),
            );
            style.set_opacity(opacity);

            ui.separator();
            ui.label("Text:");
            let mut rgb = style.text.rgb();
            ui.color_edit_button_rgb(&mut rgb);
            style.text.set_rgb(rgb);

            ui.label("Background:");
            let bg = &mut style.background;
            let mut rgba = [bg.r, bg.g, bg.b, bg.a];
            ui.color_edit_button_rgba_unmultiplied(&mut rgba);
            *bg = Color4::rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
        });
    }

    fn preview_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Preview & Export");
            if ui.button("Customize").clicked() {
                self.show_options = !self.show_options;
            }
        });
        if self.show_options {
            self.options_ui(ui);
            ui.separator();
        }

        if let Some(preview) = &self.preview {
            let size = preview.texture.size_vec2();
            let fit = (ui.available_width() / size.x).min(1.0);
            ui.image((preview.texture.id(), size * fit));
        }

        let label = if self.session.is_exporting() {
            "Processing..."
        } else {
            "Download Image"
        };
        if ui
            .add_enabled(self.session.can_export(), egui::Button::new(label))
            .clicked()
        {
            self.export();
        }
        if self.session.location().is_none() {
            ui.weak("Select a location on the map to preview the watermark");
        }
        if let Some(status) = &self.status {
            ui.label(status);
        }
    }

    fn notice_ui(&mut self, ctx: &egui::Context) {
        let Some(Notice(message)) = self.notices.front() else {
            return;
        };
        let mut acknowledged = false;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(message);
                if ui.button("OK").clicked() {
                    acknowledged = true;
                }
            });
        if acknowledged {
            self.notices.pop_front();
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for GeostampApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let arrived = self.worker.poll(&mut self.session.location);
        self.notices.extend(arrived);
        self.poll_export();
        if self.session.location.is_loading() || self.session.is_exporting() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        let dropped = ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.open(&path);
        }

        self.refresh_preview(ctx);
        let blocked = !self.notices.is_empty();

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(380.0)
            .show(ctx, |ui| {
                ui.add_enabled_ui(!blocked, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        self.upload_ui(ui);
                        if self.session.image.is_some() {
                            ui.separator();
                            self.location_ui(ui);
                            ui.separator();
                            self.timestamp_ui(ui);
                        }
                    });
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!blocked, |ui| {
                if self.session.image.is_some() {
                    egui::ScrollArea::vertical().show(ui, |ui| self.preview_ui(ui));
                } else {
                    ui.centered_and_justified(|ui| {
                        ui.label("Drop your photo here, or choose one on the left");
                    });
                }
            });
        });

        self.notice_ui(ctx);
    }
}
