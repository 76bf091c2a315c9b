use crate::model::TimestampSetting;
use chrono::NaiveDateTime;

/// Active timestamp plus the auto/manual toggle around the EXIF capture time.
#[derive(Clone, Debug)]
pub struct TimestampState {
    setting: TimestampSetting,
    detected: Option<NaiveDateTime>,
    use_auto: bool,
}

impl TimestampState {
    pub fn new(setting: TimestampSetting) -> Self {
        Self {
            setting,
            detected: None,
            use_auto: true,
        }
    }

    pub fn setting(&self) -> &TimestampSetting {
        &self.setting
    }

    pub fn detected(&self) -> Option<NaiveDateTime> {
        self.detected
    }

    pub fn uses_auto(&self) -> bool {
        self.use_auto
    }

    /// Called once per loaded image with whatever the metadata reader found.
    pub fn on_metadata(&mut self, detected: Option<NaiveDateTime>) {
        self.detected = detected;
        if let (Some(instant), true) = (detected, self.use_auto) {
            tracing::info!(%instant, "capture time detected");
            self.setting.instant = instant;
        }
    }

    /// The picker is locked only while auto mode has something to show.
    pub fn manual_enabled(&self) -> bool {
        !(self.use_auto && self.detected.is_some())
    }

    pub fn toggle_auto(&mut self) {
        self.use_auto = !self.use_auto;
        if let (Some(instant), true) = (self.detected, self.use_auto) {
            self.setting.instant = instant;
        }
    }

    /// Ignored while the picker is locked.
    pub fn set_instant(&mut self, instant: NaiveDateTime) -> bool {
        if !self.manual_enabled() {
            return false;
        }
        self.setting.instant = instant;
        true
    }

    /// Changes the label only.
    pub fn set_timezone(&mut self, timezone: impl Into<String>) {
        self.setting.timezone = timezone.into();
    }
}
