use crate::error::LookupError;
use crate::model::{Coordinate, LocationRecord, FALLBACK_PLACE_NAME};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

// ── Capabilities ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct SearchCandidate {
    pub coordinate: Coordinate,
    pub display_name: Option<String>,
}

/// Reverse lookup result. Every field may be missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReverseAddress {
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub road: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

pub trait LocationLookup: Send + Sync {
    /// Ranked candidates for a free-text query, best first.
    fn search(&self, query: &str) -> Result<Vec<SearchCandidate>, LookupError>;

    fn reverse(&self, coordinate: Coordinate) -> Result<ReverseAddress, LookupError>;
}

/// Where "use current position" gets its coordinate from.
pub trait PositionSource: Send + Sync {
    fn current_position(&self) -> Result<Coordinate, LookupError>;
}

/// A position configured ahead of time; reports `PermissionDenied` when unset.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedPosition(pub Option<Coordinate>);

impl PositionSource for FixedPosition {
    fn current_position(&self) -> Result<Coordinate, LookupError> {
        self.0.ok_or(LookupError::PermissionDenied)
    }
}

// ── Resolution ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(LocationRecord),
    Fallback(LocationRecord),
}

impl Resolution {
    pub fn record(&self) -> &LocationRecord {
        match self {
            Resolution::Resolved(record) | Resolution::Fallback(record) => record,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn record_from_reverse(coordinate: Coordinate, address: ReverseAddress) -> LocationRecord {
    let ReverseAddress {
        display_name,
        name,
        road,
        city,
        state,
        country,
        postal_code,
    } = address;
    LocationRecord {
        coordinate,
        address: non_empty(display_name).unwrap_or_else(|| coordinate.to_string()),
        place_name: non_empty(name)
            .or_else(|| non_empty(road))
            .unwrap_or_else(|| FALLBACK_PLACE_NAME.to_string()),
        city: city.unwrap_or_default(),
        state: state.unwrap_or_default(),
        country: country.unwrap_or_default(),
        postal_code: postal_code.unwrap_or_default(),
    }
}

/// Reverse lookup for a picked coordinate. Failures fall back silently to a
/// coordinate-only record.
pub fn resolve_click(lookup: &dyn LocationLookup, coordinate: Coordinate) -> Resolution {
    match lookup.reverse(coordinate) {
        Ok(address) => Resolution::Resolved(record_from_reverse(coordinate, address)),
        Err(err) => {
            tracing::warn!(%coordinate, error = %err, "reverse geocoding failed, using fallback");
            Resolution::Fallback(LocationRecord::fallback(coordinate))
        }
    }
}

/// Forward search, then a reverse lookup on the best candidate.
pub fn resolve_search(lookup: &dyn LocationLookup, query: &str) -> Result<Resolution, LookupError> {
    let candidate = lookup
        .search(query.trim())?
        .into_iter()
        .next()
        .ok_or(LookupError::NotFound)?;
    tracing::debug!(query, coordinate = %candidate.coordinate, "search matched");
    Ok(resolve_click(lookup, candidate.coordinate))
}

pub fn resolve_current(
    source: &dyn PositionSource,
    lookup: &dyn LocationLookup,
) -> Result<Resolution, LookupError> {
    let coordinate = source.current_position()?;
    Ok(resolve_click(lookup, coordinate))
}

/// Manual text skips lookup entirely. Blank text is ignored.
pub fn manual_entry(coordinate: Coordinate, text: &str) -> Option<Resolution> {
    if text.trim().is_empty() {
        return None;
    }
    Some(Resolution::Resolved(LocationRecord::manual(coordinate, text)))
}

// ── Selector state ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum LocationAction {
    Click(Coordinate),
    Search(String),
    CurrentPosition,
}

/// Shown for any failed search other than an empty result.
pub const SEARCH_FAILED: &str = "Search failed. Please try again.";

impl LocationAction {
    /// What the user is told when this action fails. Picks never notify.
    fn failure_notice(&self, err: &LookupError) -> Option<Notice> {
        match (self, err) {
            (LocationAction::Click(_), _) => None,
            (LocationAction::Search(_), LookupError::NotFound) => Some(Notice(err.to_string())),
            (LocationAction::Search(_), _) => Some(Notice(SEARCH_FAILED.to_string())),
            (LocationAction::CurrentPosition, _) => Some(Notice(err.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationState {
    NoLocation,
    Resolving,
    Resolved,
    ResolvedFallback,
}

/// Message the user must acknowledge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice(pub String);

#[derive(Debug)]
pub struct LookupOutcome {
    pub action: LocationAction,
    pub result: Result<Resolution, LookupError>,
}

/// Owns the single active location slot.
///
/// Outcomes are applied in the order they arrive; a late response overwrites
/// an earlier one even if its action was started first.
#[derive(Debug, Default)]
pub struct LocationSelector {
    current: Option<Resolution>,
    position: Coordinate,
    in_flight: usize,
}

impl LocationSelector {
    pub fn new(position: Coordinate) -> Self {
        Self {
            current: None,
            position,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> LocationState {
        if self.in_flight > 0 {
            return LocationState::Resolving;
        }
        match &self.current {
            None => LocationState::NoLocation,
            Some(Resolution::Resolved(_)) => LocationState::Resolved,
            Some(Resolution::Fallback(_)) => LocationState::ResolvedFallback,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn record(&self) -> Option<&LocationRecord> {
        self.current.as_ref().map(Resolution::record)
    }

    /// Last picked or resolved coordinate.
    pub fn position(&self) -> Coordinate {
        self.position
    }

    /// Moves the picker without resolving anything.
    pub fn set_position(&mut self, coordinate: Coordinate) {
        self.position = coordinate;
    }

    /// Marks an action as in flight.
    pub fn begin(&mut self, action: &LocationAction) {
        if let LocationAction::Click(coordinate) = action {
            self.position = *coordinate;
        }
        self.in_flight += 1;
        tracing::debug!(?action, in_flight = self.in_flight, "location lookup started");
    }

    pub fn finish(&mut self, outcome: LookupOutcome) -> Option<Notice> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome.result {
            Ok(resolution) => {
                self.apply(resolution);
                None
            }
            Err(err) => {
                tracing::warn!(action = ?outcome.action, error = %err, "location lookup failed");
                outcome.action.failure_notice(&err)
            }
        }
    }

    pub fn enter_manual(&mut self, text: &str) -> bool {
        match manual_entry(self.position, text) {
            Some(resolution) => {
                self.apply(resolution);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, resolution: Resolution) {
        self.position = resolution.record().coordinate;
        tracing::info!(
            address = %resolution.record().address,
            fallback = resolution.is_fallback(),
            "location selected"
        );
        self.current = Some(resolution);
    }
}

// ── Worker ──────────────────────────────────────────────────────────────────

/// Runs each lookup on its own thread and hands outcomes back over a channel.
pub struct LookupWorker {
    lookup: Arc<dyn LocationLookup>,
    position: Arc<dyn PositionSource>,
    tx: Sender<LookupOutcome>,
    rx: Receiver<LookupOutcome>,
}

impl LookupWorker {
    pub fn new(lookup: Arc<dyn LocationLookup>, position: Arc<dyn PositionSource>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            lookup,
            position,
            tx,
            rx,
        }
    }

    pub fn run(
        action: &LocationAction,
        lookup: &dyn LocationLookup,
        position: &dyn PositionSource,
    ) -> Result<Resolution, LookupError> {
        match action {
            LocationAction::Click(coordinate) => Ok(resolve_click(lookup, *coordinate)),
            LocationAction::Search(query) => resolve_search(lookup, query),
            LocationAction::CurrentPosition => resolve_current(position, lookup),
        }
    }

    /// Starts `action` in the background. Blank searches are not started.
    pub fn spawn(&self, selector: &mut LocationSelector, action: LocationAction) -> bool {
        if let LocationAction::Search(query) = &action {
            if query.trim().is_empty() {
                return false;
            }
        }
        selector.begin(&action);
        let lookup = Arc::clone(&self.lookup);
        let position = Arc::clone(&self.position);
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = Self::run(&action, lookup.as_ref(), position.as_ref());
            // Receiver only goes away when the app shuts down.
            let _ = tx.send(LookupOutcome { action, result });
        });
        true
    }

    /// Applies every outcome that has arrived, returning the notices raised.
    pub fn poll(&self, selector: &mut LocationSelector) -> Vec<Notice> {
        self.rx
            .try_iter()
            .filter_map(|outcome| selector.finish(outcome))
            .collect()
    }
}
