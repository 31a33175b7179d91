//! On-call schedules and rotation resolution.
//!
//! A [`Schedule`] is an ordered list of [`Layer`]s. Each layer hands the pager
//! from one user to the next every interval, counted from `rotation_start`.
//! All arithmetic is done on UTC instants; `timezone` is display metadata.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OnCallError, Result};

const HOURS_PER_DAY: i64 = 24;
const HOURS_PER_WEEK: i64 = 7 * HOURS_PER_DAY;

/// How often a layer hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationType {
    /// Every 24 hours.
    Daily,
    /// Every 7 days.
    Weekly,
    /// Every `duration_hours` hours.
    Custom,
}

impl RotationType {
    /// Returns the rotation type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for RotationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rotation inside a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer name, e.g. "primary".
    pub name: String,
    /// Handover cadence.
    pub rotation_type: RotationType,
    /// Instant the first user's shift begins.
    pub rotation_start: DateTime<Utc>,
    /// Shift length for custom rotations.
    #[serde(default)]
    pub duration_hours: i64,
    /// Users in rotation order.
    #[serde(default)]
    pub users: Vec<String>,
}

impl Layer {
    /// Creates a layer with no users.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        rotation_type: RotationType,
        rotation_start: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            rotation_type,
            rotation_start,
            duration_hours: 0,
            users: Vec::new(),
        }
    }

    /// Sets the shift length of a custom rotation.
    #[must_use]
    pub fn with_duration_hours(mut self, hours: i64) -> Self {
        self.duration_hours = hours;
        self
    }

    /// Sets the users in rotation order.
    #[must_use]
    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the shift length.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` for a custom rotation whose
    /// `duration_hours` is not positive.
    pub fn interval(&self) -> Result<TimeDelta> {
        let hours = match self.rotation_type {
            RotationType::Daily => HOURS_PER_DAY,
            RotationType::Weekly => HOURS_PER_WEEK,
            RotationType::Custom => self.duration_hours,
        };
        if hours <= 0 {
            return Err(OnCallError::configuration(format!(
                "layer '{}': custom rotation needs duration_hours > 0, got {hours}",
                self.name
            )));
        }
        TimeDelta::try_hours(hours).ok_or_else(|| {
            OnCallError::configuration(format!(
                "layer '{}': duration_hours {hours} is out of range",
                self.name
            ))
        })
    }

    /// Checks that the layer can be resolved.
    ///
    /// # Errors
    ///
    /// Same as [`Layer::interval`].
    pub fn validate(&self) -> Result<()> {
        self.interval().map(|_| ())
    }

    /// Number of whole shifts between `rotation_start` and `at`, floored so
    /// instants before the start count backwards.
    fn rotations(&self, at: DateTime<Utc>) -> Result<i64> {
        let interval_ms = self.interval()?.num_milliseconds();
        let elapsed_ms = (at - self.rotation_start).num_milliseconds();
        Ok(elapsed_ms.div_euclid(interval_ms))
    }

    /// Returns the user on call at `at`, or `None` if the layer has no users.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if the layer has users but an
    /// invalid interval.
    pub fn resolve(&self, at: DateTime<Utc>) -> Result<Option<String>> {
        if self.users.is_empty() {
            return Ok(None);
        }
        let rotations = self.rotations(at)?;
        let index = rotations.rem_euclid(self.users.len() as i64) as usize;
        Ok(self.users.get(index).cloned())
    }

    /// Returns the instant the shift covering `at` ends.
    ///
    /// # Errors
    ///
    /// Same as [`Layer::interval`].
    pub fn handoff_after(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let interval = self.interval()?;
        let rotations = self.rotations(at)?;
        let next = rotations
            .checked_add(1)
            .and_then(|n| interval.checked_mul(i32::try_from(n).ok()?))
            .and_then(|offset| self.rotation_start.checked_add_signed(offset));
        next.ok_or_else(|| {
            OnCallError::configuration(format!(
                "layer '{}': next handoff is out of range",
                self.name
            ))
        })
    }
}

/// Who is on call, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnCallShift {
    /// The user on call.
    pub user: String,
    /// The layer that produced the user.
    pub layer: String,
    /// When the current shift ends.
    pub until: DateTime<Utc>,
}

/// A named on-call policy made of ordered layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// IANA zone name shown to humans. Never used in rotation math.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Layers in priority order.
    #[serde(default)]
    pub layers: Vec<Layer>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Schedule {
    /// Creates a schedule with no layers.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            timezone: default_timezone(),
            layers: Vec::new(),
        }
    }

    /// Appends a layer.
    #[must_use]
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Checks every layer.
    ///
    /// # Errors
    ///
    /// Returns the first layer's `OnCallError::Configuration`.
    pub fn validate(&self) -> Result<()> {
        self.layers.iter().try_for_each(Layer::validate)
    }

    /// Returns the first user any layer puts on call at `at`.
    ///
    /// # Errors
    ///
    /// Returns `OnCallError::Configuration` if a layer consulted before a
    /// match is invalid.
    pub fn resolve(&self, at: DateTime<Utc>) -> Result<Option<String>> {
        Ok(self.on_call(at)?.map(|shift| shift.user))
    }

    /// Like [`Schedule::resolve`], also reporting the layer and shift end.
    ///
    /// # Errors
    ///
    /// Same as [`Schedule::resolve`].
    pub fn on_call(&self, at: DateTime<Utc>) -> Result<Option<OnCallShift>> {
        for layer in &self.layers {
            if let Some(user) = layer.resolve(at)? {
                return Ok(Some(OnCallShift {
                    user,
                    layer: layer.name.clone(),
                    until: layer.handoff_after(at)?,
                }));
            }
        }
        Ok(None)
    }
}
