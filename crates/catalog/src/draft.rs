//! Draft form controller: one in-progress create or edit at a time.
//!
//! The draft is a snapshot of a peak's editable fields as text. It never
//! reads or writes the cache until `submit`.

use common::{Error, Peak, PeakPayload};
use tracing::debug;

use crate::repository::{parse_optional_number, PeakRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Name,
    Region,
    Grade,
    ElevationFt,
    Lat,
    Lon,
    Description,
}

/// Editable fields, as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftFields {
    pub name: String,
    pub region: String,
    pub grade: String,
    pub elevation_ft: String,
    pub lat: String,
    pub lon: String,
    pub description: String,
}

fn number_text(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl DraftFields {
    pub fn from_peak(peak: &Peak) -> Self {
        Self {
            name: peak.name.clone(),
            region: peak.region.clone(),
            grade: peak.grade.clone(),
            elevation_ft: number_text(peak.elevation_ft),
            lat: number_text(peak.lat),
            lon: number_text(peak.lon),
            description: peak.description.clone(),
        }
    }

    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::Name => &self.name,
            DraftField::Region => &self.region,
            DraftField::Grade => &self.grade,
            DraftField::ElevationFt => &self.elevation_ft,
            DraftField::Lat => &self.lat,
            DraftField::Lon => &self.lon,
            DraftField::Description => &self.description,
        }
    }

    fn slot(&mut self, field: DraftField) -> &mut String {
        match field {
            DraftField::Name => &mut self.name,
            DraftField::Region => &mut self.region,
            DraftField::Grade => &mut self.grade,
            DraftField::ElevationFt => &mut self.elevation_ft,
            DraftField::Lat => &mut self.lat,
            DraftField::Lon => &mut self.lon,
            DraftField::Description => &mut self.description,
        }
    }

    /// Build the write payload. Only a blank name is rejected.
    pub fn to_payload(&self) -> Result<PeakPayload, Error> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Name is required".into()));
        }

        Ok(PeakPayload {
            name: name.to_string(),
            region: optional_text(&self.region),
            grade: optional_text(&self.grade),
            description: optional_text(&self.description),
            elevation_ft: parse_optional_number(&self.elevation_ft),
            lat: parse_optional_number(&self.lat),
            lon: parse_optional_number(&self.lon),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Idle,
    Editing,
    Submitting,
}

/// The single draft slot shared by "new peak" and "edit peak".
#[derive(Debug, Clone)]
pub struct DraftForm {
    state: DraftState,
    target: Option<i64>,
    fields: DraftFields,
    error: Option<String>,
}

impl DraftForm {
    pub fn new() -> Self {
        Self {
            state: DraftState::Idle,
            target: None,
            fields: DraftFields::default(),
            error: None,
        }
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    /// Id being edited; `None` for a new record.
    pub fn target(&self) -> Option<i64> {
        self.target
    }

    pub fn fields(&self) -> &DraftFields {
        &self.fields
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_editing(&self, id: i64) -> bool {
        self.target == Some(id)
    }

    /// Open an empty draft for a new peak, discarding any open draft.
    pub fn start_new(&mut self) {
        self.reset();
        self.state = DraftState::Editing;
    }

    /// Copy `peak` into the draft, discarding any open draft.
    pub fn start_edit(&mut self, peak: &Peak) {
        if self.state != DraftState::Idle && self.target != Some(peak.id) {
            debug!("Discarding open draft for {:?}", self.target);
        }
        self.state = DraftState::Editing;
        self.target = Some(peak.id);
        self.fields = DraftFields::from_peak(peak);
        self.error = None;
    }

    /// Typing into an idle form starts a new-record draft.
    pub fn set_field(&mut self, field: DraftField, value: impl Into<String>) {
        if self.state == DraftState::Idle {
            self.state = DraftState::Editing;
        }
        *self.fields.slot(field) = value.into();
    }

    pub fn cancel(&mut self) {
        self.reset();
    }

    /// Drop the draft if it belongs to a peak that was just deleted.
    pub fn on_deleted(&mut self, id: i64) {
        if self.is_editing(id) {
            self.reset();
        }
    }

    /// Validate and send the draft. On success the slot is reset; on
    /// failure it stays populated with the error attached. Dropping the
    /// future mid-request leaves the draft editable.
    pub async fn submit(&mut self, repo: &PeakRepository) -> Result<Peak, Error> {
        let payload = match self.fields.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                self.state = DraftState::Editing;
                self.error = Some(err.to_string());
                return Err(err);
            }
        };

        self.state = DraftState::Submitting;
        self.error = None;
        let mut pending = Pending(self);

        let result = match pending.0.target {
            Some(id) => repo.update(id, &payload).await,
            None => repo.create(&payload).await,
        };

        let form = &mut *pending.0;
        match result {
            Ok(peak) => {
                form.reset();
                Ok(peak)
            }
            Err(err) => {
                form.state = DraftState::Editing;
                form.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.state = DraftState::Idle;
        self.target = None;
        self.fields = DraftFields::default();
        self.error = None;
    }
}

/// Puts an interrupted submit back into `Editing`.
struct Pending<'a>(&'a mut DraftForm);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.0.state == DraftState::Submitting {
            self.0.state = DraftState::Editing;
        }
    }
}

impl Default for DraftForm {
    fn default() -> Self {
        Self::new()
    }
}
