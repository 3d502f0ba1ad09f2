//! Maps sample batches to display state.

use crate::types::{DisplayState, HeartRateUnit, SampleBatch};

/// Stateless mapping from a batch to what the display shows
#[derive(Clone, Copy, Debug)]
pub struct ReadingPresenter {
    unit: HeartRateUnit,
}

impl Default for ReadingPresenter {
    fn default() -> Self {
        Self {
            unit: HeartRateUnit::CountPerMinute,
        }
    }
}

impl ReadingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display state for the first sample of the batch
    ///
    /// Batch order is the provider's; nothing is re-sorted. Returns `None`
    /// for an empty batch or when the first value cannot be shown.
    pub fn on_batch(&self, batch: &SampleBatch) -> Option<DisplayState> {
        let sample = batch.first()?;
        let value = sample.quantity.value_in(self.unit);

        let Some(text) = value_text(value) else {
            tracing::warn!(
                "Ignoring heart-rate value {} {} from {}",
                value,
                self.unit.symbol(),
                sample.source_name
            );
            return None;
        };

        tracing::debug!(
            "Reading {} {} from {} ({} samples in batch)",
            text,
            self.unit.symbol(),
            sample.source_name,
            batch.len()
        );
        Some(DisplayState::reading(text, sample.source_name.clone()))
    }
}

/// Truncate toward zero into the unsigned 16-bit range
///
/// NaN and anything that truncates outside `0..=u16::MAX` has no text.
pub fn value_text(value: f64) -> Option<String> {
    let truncated = value.trunc();
    if !(0.0..=f64::from(u16::MAX)).contains(&truncated) {
        return None;
    }
    Some((truncated as u16).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quantity, Sample};
    use chrono::{Duration, Utc};

    fn batch_of(values: &[(f64, &str)]) -> SampleBatch {
        let now = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, (bpm, source))| {
                Sample::heart_rate(*bpm, *source, now + Duration::seconds(i as i64))
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_value_is_truncated_not_rounded() {
        assert_eq!(value_text(72.9).as_deref(), Some("72"));
        assert_eq!(value_text(0.4).as_deref(), Some("0"));
        assert_eq!(value_text(65535.99).as_deref(), Some("65535"));
    }

    #[test]
    fn test_out_of_range_values_have_no_text() {
        assert_eq!(value_text(-1.0), None);
        assert_eq!(value_text(65536.0), None);
        assert_eq!(value_text(f64::NAN), None);
        assert_eq!(value_text(f64::INFINITY), None);
        // Truncates to zero, same as the unsigned conversion
        assert_eq!(value_text(-0.4).as_deref(), Some("0"));
    }

    #[test]
    fn test_first_sample_wins() {
        let presenter = ReadingPresenter::new();
        let display = presenter
            .on_batch(&batch_of(&[(72.9, "Apple Watch"), (130.0, "Other")]))
            .unwrap();

        assert_eq!(display.latest_value_text, "72");
        assert_eq!(display.device_name_text, "Apple Watch");
        assert!(display.pulse_trigger);
    }

    #[test]
    fn test_pulse_fires_even_when_value_repeats() {
        let presenter = ReadingPresenter::new();
        let batch = batch_of(&[(88.0, "Watch")]);

        let first = presenter.on_batch(&batch).unwrap();
        let second = presenter.on_batch(&batch).unwrap();
        assert_eq!(first, second);
        assert!(second.pulse_trigger);
    }

    #[test]
    fn test_empty_batch_yields_nothing() {
        assert_eq!(ReadingPresenter::new().on_batch(&SampleBatch::default()), None);
    }

    #[test]
    fn test_per_second_samples_are_converted() {
        let mut batch = batch_of(&[(0.0, "Strap")]);
        batch.samples[0].quantity = Quantity {
            value: 1.2,
            unit: HeartRateUnit::CountPerSecond,
        };

        let display = ReadingPresenter::new().on_batch(&batch).unwrap();
        assert_eq!(display.latest_value_text, "72");
    }

    #[test]
    fn test_negative_first_sample_is_skipped() {
        let display =
            ReadingPresenter::new().on_batch(&batch_of(&[(-5.0, "Watch"), (80.0, "Watch")]));
        assert_eq!(display, None);
    }
}
