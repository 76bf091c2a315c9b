use crate::compose::{compose, ComposedOverlay};
use crate::error::{ExportError, UploadError};
use crate::location::LocationSelector;
use crate::metadata::MetadataReader;
use crate::model::{Coordinate, LocationRecord, TimestampSetting, WatermarkStyle};
use crate::rasterize::{export_png, Rasterizer};
use crate::timestamp::TimestampState;
use crate::upload::{self, LoadedImage};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// The single image/location/timestamp/style slot set the UI edits.
pub struct Session {
    pub image: Option<LoadedImage>,
    pub location: LocationSelector,
    pub timestamp: TimestampState,
    pub style: WatermarkStyle,
    exporting: bool,
}

impl Session {
    pub fn new(timestamp: TimestampSetting, style: WatermarkStyle, position: Coordinate) -> Self {
        Self {
            image: None,
            location: LocationSelector::new(position),
            timestamp: TimestampState::new(timestamp),
            style,
            exporting: false,
        }
    }

    /// Validates and decodes `path`, then reads its capture time once.
    ///
    /// Nothing changes when validation fails.
    pub fn open_image(
        &mut self,
        path: &Path,
        reader: &dyn MetadataReader,
    ) -> Result<(), UploadError> {
        let loaded = upload::load(path)?;
        self.set_image(loaded, reader);
        Ok(())
    }

    pub fn set_image(&mut self, loaded: LoadedImage, reader: &dyn MetadataReader) {
        let detected = reader.read_capture_time(&loaded.bytes).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to extract EXIF data");
            None
        });
        self.timestamp.on_metadata(detected);
        self.image = Some(loaded);
    }

    pub fn location(&self) -> Option<&LocationRecord> {
        self.location.record()
    }

    pub fn overlay(&self) -> ComposedOverlay {
        compose(self.location(), self.timestamp.setting())
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting
    }

    pub fn can_export(&self) -> bool {
        self.image.is_some() && self.location().is_some() && !self.exporting
    }

    /// Snapshots what an export needs and marks the session as exporting
    /// until [`Session::finish_export`] is called.
    pub fn begin_export(
        &mut self,
        out_dir: &Path,
        now_millis: i64,
    ) -> Result<ExportJob, ExportError> {
        if self.exporting {
            return Err(ExportError::Busy);
        }
        let image = self.image.as_ref().ok_or(ExportError::NoImage)?;
        if self.location().is_none() {
            return Err(ExportError::NoLocation);
        }
        let job = ExportJob {
            image: image.image.clone(),
            overlay: self.overlay(),
            style: self.style.clone(),
            out_dir: out_dir.to_path_buf(),
            now_millis,
        };
        self.exporting = true;
        tracing::debug!(out_dir = %out_dir.display(), "export started");
        Ok(job)
    }

    pub fn finish_export(
        &mut self,
        result: Result<PathBuf, ExportError>,
    ) -> Result<PathBuf, ExportError> {
        self.exporting = false;
        if let Err(err) = &result {
            tracing::error!(error = %err, "export failed");
        }
        result
    }

    /// Runs an export to completion on the calling thread.
    pub fn export(
        &mut self,
        rasterizer: &dyn Rasterizer,
        out_dir: &Path,
        now_millis: i64,
    ) -> Result<PathBuf, ExportError> {
        let job = self.begin_export(out_dir, now_millis)?;
        let result = job.run(rasterizer);
        self.finish_export(result)
    }
}

// ── Export worker ───────────────────────────────────────────────────────────

/// A detached copy of the session's export inputs.
pub struct ExportJob {
    image: DynamicImage,
    overlay: ComposedOverlay,
    style: WatermarkStyle,
    out_dir: PathBuf,
    now_millis: i64,
}

impl ExportJob {
    pub fn run(&self, rasterizer: &dyn Rasterizer) -> Result<PathBuf, ExportError> {
        export_png(
            rasterizer,
            &self.image,
            &self.overlay,
            &self.style,
            &self.out_dir,
            self.now_millis,
        )
    }
}

/// Runs exports off the UI thread. At most one is pending per session.
pub struct ExportWorker {
    rasterizer: Arc<dyn Rasterizer>,
    tx: Sender<Result<PathBuf, ExportError>>,
    rx: Receiver<Result<PathBuf, ExportError>>,
}

impl ExportWorker {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rasterizer, tx, rx }
    }

    pub fn spawn(
        &self,
        session: &mut Session,
        out_dir: &Path,
        now_millis: i64,
    ) -> Result<(), ExportError> {
        let job = session.begin_export(out_dir, now_millis)?;
        let rasterizer = Arc::clone(&self.rasterizer);
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = job.run(rasterizer.as_ref());
            // Receiver only goes away when the app shuts down.
            let _ = tx.send(result);
        });
        Ok(())
    }

    /// Hands back the finished export, if one has arrived, and clears the flag.
    pub fn poll(&self, session: &mut Session) -> Option<Result<PathBuf, ExportError>> {
        let result = self.rx.try_recv().ok()?;
        Some(session.finish_export(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::location::tests::FakeLookup;
    use crate::location::{resolve_click, LocationAction, LookupOutcome, ReverseAddress};
    use crate::rasterize::OverlayRasterizer;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveDateTime};
    use image::RgbaImage;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Holds every rasterization until the test sends on the gate.
    struct Gated {
        gate: Mutex<Receiver<()>>,
        inner: OverlayRasterizer,
    }

    impl Rasterizer for Gated {
        fn rasterize(
            &self,
            image: &DynamicImage,
            overlay: &ComposedOverlay,
            style: &WatermarkStyle,
            scale: f32,
        ) -> Result<RgbaImage, ExportError> {
            self.gate.lock().unwrap().recv().unwrap();
            self.inner.rasterize(image, overlay, style, scale)
        }
    }

    struct FixedCapture(Option<NaiveDateTime>);

    impl MetadataReader for FixedCapture {
        fn read_capture_time(&self, _: &[u8]) -> Result<Option<NaiveDateTime>, MetadataError> {
            Ok(self.0)
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap()
    }

    fn session() -> Session {
        Session::new(
            TimestampSetting::new(start(), "+05:30"),
            WatermarkStyle::default(),
            Coordinate::default(),
        )
    }

    fn png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::new(20, 10).save(&path).unwrap();
        path
    }

    fn click(session: &mut Session, lookup: &FakeLookup, lat: f64, lon: f64) {
        let coordinate = Coordinate::new(lat, lon);
        let action = LocationAction::Click(coordinate);
        session.location.begin(&action);
        let notice = session.location.finish(LookupOutcome {
            result: Ok(resolve_click(lookup, coordinate)),
            action,
        });
        assert_eq!(notice, None);
    }

    #[test]
    fn rejected_upload_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("a.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();
        let mut s = session();
        let err = s.open_image(&gif, &FixedCapture(None)).unwrap_err();
        assert_matches!(err, UploadError::UnsupportedType { .. });
        assert!(s.image.is_none());
        assert_eq!(s.timestamp.setting().instant, start());
        assert!(!s.can_export());
    }

    #[test]
    fn map_click_scenario() {
        let lookup = FakeLookup::with_reverse(ReverseAddress {
            display_name: Some("Test Rd, City".into()),
            ..Default::default()
        });
        let mut s = session();
        click(&mut s, &lookup, 12.824640, 80.046536);
        let overlay = s.overlay();
        assert_eq!(overlay.address, "Test Rd, City");
        assert_eq!(
            overlay.coordinate_line(),
            "Lat 12.824640 Long 80.046536 29/02/2024 07:05 GMT +05:30"
        );
    }

    #[test]
    fn failed_click_scenario() {
        let mut s = session();
        click(&mut s, &FakeLookup::default(), 1.0, 2.0);
        let record = s.location().unwrap();
        assert_eq!(record.address, "1.000000, 2.000000");
        assert_eq!(record.place_name, "Selected Location");
    }

    #[test]
    fn exif_capture_survives_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let capture = NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut s = session();
        s.open_image(&png(dir.path(), "p.png"), &FixedCapture(Some(capture)))
            .unwrap();
        s.location.enter_manual("Somewhere");
        s.timestamp.toggle_auto();
        s.timestamp.set_instant(start());
        s.timestamp.toggle_auto();
        assert_eq!(s.overlay().timestamp, "01/05/2023 10:00 GMT +05:30");
    }

    #[test]
    fn export_requires_image_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let r = OverlayRasterizer::new().unwrap();
        let mut s = session();
        assert_matches!(s.export(&r, dir.path(), 1), Err(ExportError::NoImage));

        s.open_image(&png(dir.path(), "p.png"), &FixedCapture(None))
            .unwrap();
        assert!(!s.can_export());
        assert_matches!(s.export(&r, dir.path(), 1), Err(ExportError::NoLocation));

        s.location.enter_manual("Somewhere");
        assert!(s.can_export());
        let out = s.export(&r, dir.path(), 42).unwrap();
        assert!(out.ends_with("gps-watermarked-42.png"));
        assert!(!s.is_exporting());
    }

    #[test]
    fn exporting_flag_covers_a_pending_export() {
        let dir = tempfile::tempdir().unwrap();
        let (release, gate) = mpsc::channel();
        let worker = ExportWorker::new(Arc::new(Gated {
            gate: Mutex::new(gate),
            inner: OverlayRasterizer::new().unwrap(),
        }));
        let mut s = session();
        s.open_image(&png(dir.path(), "p.png"), &FixedCapture(None))
            .unwrap();
        s.location.enter_manual("Somewhere");

        worker.spawn(&mut s, dir.path(), 7).unwrap();
        assert!(s.is_exporting());
        assert!(!s.can_export());
        assert_matches!(worker.spawn(&mut s, dir.path(), 8), Err(ExportError::Busy));
        assert_matches!(worker.poll(&mut s), None);
        assert!(s.is_exporting());

        release.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        let result = loop {
            if let Some(result) = worker.poll(&mut s) {
                break result;
            }
            assert!(Instant::now() < deadline, "export never finished");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert!(result.unwrap().ends_with("gps-watermarked-7.png"));
        assert!(!s.is_exporting());
        assert!(s.can_export());
    }
}
