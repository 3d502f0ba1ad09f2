//! Core domain types for the Pulse heart-rate monitor.
//!
//! This module defines the fundamental types used throughout the system:
//! - Quantities, samples and sample batches
//! - Query predicates for the sample stream
//! - Workout configuration and provider-side identifiers
//! - Session state machine states
//! - Display state handed to the display surface

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Point in time as reported by the provider
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// Quantity and Sample Types
// ============================================================================

/// Kind of quantity a sample measures
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    HeartRate,
    StepCount,
}

/// Units a heart-rate quantity can be expressed in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum HeartRateUnit {
    #[serde(rename = "count/min")]
    CountPerMinute,
    #[serde(rename = "count/s")]
    CountPerSecond,
}

impl HeartRateUnit {
    /// Unit string as used by the health store
    pub fn symbol(&self) -> &'static str {
        match self {
            HeartRateUnit::CountPerMinute => "count/min",
            HeartRateUnit::CountPerSecond => "count/s",
        }
    }

    fn counts_per_minute(&self) -> f64 {
        match self {
            HeartRateUnit::CountPerMinute => 1.0,
            HeartRateUnit::CountPerSecond => 60.0,
        }
    }
}

/// A measured value together with its unit
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: HeartRateUnit,
}

impl Quantity {
    pub fn count_per_minute(value: f64) -> Self {
        Self {
            value,
            unit: HeartRateUnit::CountPerMinute,
        }
    }

    /// Convert the value into the requested unit
    pub fn value_in(&self, unit: HeartRateUnit) -> f64 {
        if self.unit == unit {
            return self.value;
        }
        self.value * self.unit.counts_per_minute() / unit.counts_per_minute()
    }
}

/// Which device recorded a sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceDevice {
    /// The sensor built into the device running the monitor
    Local,
    /// Any other paired device or app that wrote to the store
    Remote(String),
}

/// A single timestamped quantity sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub quantity_type: QuantityType,
    pub quantity: Quantity,
    /// Name of the originating source (e.g. "Apple Watch")
    pub source_name: String,
    pub device: SourceDevice,
    pub timestamp: Timestamp,
}

impl Sample {
    /// Heart-rate sample from the local sensor, in count/min
    pub fn heart_rate(bpm: f64, source_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            quantity_type: QuantityType::HeartRate,
            quantity: Quantity::count_per_minute(bpm),
            source_name: source_name.into(),
            device: SourceDevice::Local,
            timestamp,
        }
    }
}

/// Samples delivered together by one provider callback, in provider order
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SampleBatch {
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<Sample>> for SampleBatch {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

// ============================================================================
// Query Predicate Types
// ============================================================================

/// Sample time window; `end == None` leaves the window open
///
/// When an end is set, samples must fall strictly before it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl TimeWindow {
    pub fn open_from(start: Timestamp) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start && self.end.map_or(true, |end| at < end)
    }
}

/// Restricts which devices' samples a query returns
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFilter {
    LocalOnly,
    Any,
}

/// Compound query predicate: quantity type AND time window AND device
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Predicate {
    pub quantity_type: QuantityType,
    pub window: TimeWindow,
    pub device: DeviceFilter,
}

impl Predicate {
    /// Heart-rate samples from the local sensor recorded at or after `start`
    pub fn heart_rate_since(start: Timestamp) -> Self {
        Self {
            quantity_type: QuantityType::HeartRate,
            window: TimeWindow::open_from(start),
            device: DeviceFilter::LocalOnly,
        }
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        if sample.quantity_type != self.quantity_type || !self.window.contains(sample.timestamp) {
            return false;
        }
        match self.device {
            DeviceFilter::LocalOnly => sample.device == SourceDevice::Local,
            DeviceFilter::Any => true,
        }
    }
}

// ============================================================================
// Workout and Provider Types
// ============================================================================

/// Activity recorded by the workout session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CrossTraining,
    Running,
    Cycling,
    Walking,
    Other,
}

/// Where the workout takes place
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Indoor,
    Outdoor,
    Unknown,
}

/// Parameters handed to the provider when creating a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkoutConfiguration {
    pub activity_type: ActivityType,
    pub location_type: LocationType,
}

impl Default for WorkoutConfiguration {
    fn default() -> Self {
        Self {
            activity_type: ActivityType::CrossTraining,
            location_type: LocationType::Indoor,
        }
    }
}

/// Provider-side workout session identifier
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProviderSessionId(pub Uuid);

impl ProviderSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProviderSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProviderSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Provider-side subscription registration handle
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session states as reported by the provider's delegate callbacks
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSessionState {
    NotStarted,
    Prepared,
    Running,
    Paused,
    Stopped,
    Ended,
}

// ============================================================================
// Session State Machine Types
// ============================================================================

/// Why a session attempt failed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CreationError(String),
    QueryCreationError(String),
}

/// Controller-side session lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Ending,
    Ended,
    Failed(FailureReason),
}

impl SessionState {
    /// Ended and Failed stay put until the next start intent resets them
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Failed(_))
    }
}

/// Outcome of the activation checks and authorization request
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Activation has not run yet
    Unknown,
    /// Waiting for the authorization reply
    Pending,
    Granted,
    Denied,
    /// The platform has no health data store
    Unavailable,
    /// The heart-rate quantity type is not offered
    Unsupported,
}

impl Availability {
    /// Ok only once read access has been granted
    pub fn check(self) -> Result<()> {
        match self {
            Availability::Granted => Ok(()),
            Availability::Unavailable => Err(Error::DataUnavailable),
            Availability::Denied | Availability::Unsupported => Err(Error::AuthorizationDenied),
            Availability::Unknown | Availability::Pending => Err(Error::AuthorizationPending),
        }
    }
}

// ============================================================================
// Display Types
// ============================================================================

/// Start/stop button title
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ButtonLabel {
    Start,
    Stop,
}

impl ButtonLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonLabel::Start => "Start",
            ButtonLabel::Stop => "Stop",
        }
    }
}

impl fmt::Display for ButtonLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Fixed status texts shown in place of a reading
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusText {
    NotAvailable,
    NotAllowed,
    CannotStart,
    Placeholder,
}

impl StatusText {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusText::NotAvailable => "not available",
            StatusText::NotAllowed => "not allowed",
            StatusText::CannotStart => "cannot start",
            StatusText::Placeholder => "---",
        }
    }
}

/// What the display surface shows; overwritten on every update
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayState {
    pub latest_value_text: String,
    pub device_name_text: String,
    pub pulse_trigger: bool,
}

impl DisplayState {
    /// A reading from a device, with the pulse cue set
    pub fn reading(value_text: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            latest_value_text: value_text.into(),
            device_name_text: device_name.into(),
            pulse_trigger: true,
        }
    }

    /// Replace the value with a status text, keeping the last device name
    pub fn with_status(&self, status: StatusText) -> Self {
        Self {
            latest_value_text: status.as_str().to_string(),
            device_name_text: self.device_name_text.clone(),
            pulse_trigger: false,
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            latest_value_text: StatusText::Placeholder.as_str().to_string(),
            device_name_text: String::new(),
            pulse_trigger: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_count_per_second_converts_to_per_minute() {
        let q = Quantity {
            value: 1.5,
            unit: HeartRateUnit::CountPerSecond,
        };
        assert!((q.value_in(HeartRateUnit::CountPerMinute) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_window_has_no_upper_bound() {
        let start = Utc::now();
        let window = TimeWindow::open_from(start);
        assert!(window.contains(start));
        assert!(window.contains(start + Duration::days(365)));
        assert!(!window.contains(start - Duration::seconds(1)));
    }

    #[test]
    fn test_closed_window_is_strict_at_end() {
        let start = Utc::now();
        let end = start + Duration::minutes(5);
        let window = TimeWindow {
            start,
            end: Some(end),
        };
        assert!(window.contains(end - Duration::seconds(1)));
        assert!(!window.contains(end));
    }

    #[test]
    fn test_heart_rate_predicate_filters_device_and_type() {
        let start = Utc::now();
        let predicate = Predicate::heart_rate_since(start);

        let local = Sample::heart_rate(80.0, "Apple Watch", start);
        assert!(predicate.matches(&local));

        let mut remote = local.clone();
        remote.device = SourceDevice::Remote("Chest Strap".into());
        assert!(!predicate.matches(&remote));

        let mut steps = local.clone();
        steps.quantity_type = QuantityType::StepCount;
        assert!(!predicate.matches(&steps));

        let early = Sample::heart_rate(80.0, "Apple Watch", start - Duration::seconds(10));
        assert!(!predicate.matches(&early));
    }

    #[test]
    fn test_status_keeps_device_name() {
        let reading = DisplayState::reading("88", "Watch");
        let reset = reading.with_status(StatusText::Placeholder);
        assert_eq!(reset.latest_value_text, "---");
        assert_eq!(reset.device_name_text, "Watch");
        assert!(!reset.pulse_trigger);
    }

    #[test]
    fn test_availability_check_maps_to_errors() {
        assert!(Availability::Granted.check().is_ok());
        assert!(matches!(
            Availability::Unavailable.check(),
            Err(Error::DataUnavailable)
        ));
        assert!(matches!(
            Availability::Unsupported.check(),
            Err(Error::AuthorizationDenied)
        ));
        assert!(matches!(
            Availability::Pending.check(),
            Err(Error::AuthorizationPending)
        ));
    }

    #[test]
    fn test_only_ended_and_failed_are_terminal() {
        assert!(SessionState::Ended.is_terminal());
        assert!(SessionState::Failed(FailureReason::CreationError("x".into())).is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }
}
