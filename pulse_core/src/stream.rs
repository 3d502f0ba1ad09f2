//! Heart-rate sample stream.
//!
//! Wraps one provider-side subscription: registration against a
//! [`Predicate`], delivery of sample batches into the control loop, and
//! cancellation. Initial results and later updates go through the same
//! [`BatchSink::deliver`] handler and are indistinguishable downstream.

use crate::events::{EventSender, Generation, SessionEvent};
use crate::provider::HealthProvider;
use crate::types::{Predicate, QuantityType, Sample, SampleBatch, SubscriptionHandle};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// An open subscription, tagged with the session generation that opened it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamHandle {
    pub handle: SubscriptionHandle,
    pub generation: Generation,
    pub predicate: Predicate,
}

/// Consumer side of a subscription, handed to the provider
///
/// Every delivered batch is stamped with the generation of the session the
/// subscription belongs to, so the controller can drop batches that outlive it.
#[derive(Clone, Debug)]
pub struct BatchSink {
    generation: Generation,
    events: EventSender,
}

impl BatchSink {
    pub fn new(generation: Generation, events: EventSender) -> Self {
        Self { generation, events }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Handler for both the initial results and every later update
    ///
    /// `None` (the provider had nothing to report) and batches without any
    /// heart-rate samples are dropped. Returns true if a batch was posted.
    pub fn deliver(&self, samples: Option<Vec<Sample>>) -> bool {
        let Some(samples) = samples else {
            return false;
        };

        let heart_rate: Vec<Sample> = samples
            .into_iter()
            .filter(|s| s.quantity_type == QuantityType::HeartRate)
            .collect();
        if heart_rate.is_empty() {
            return false;
        }

        tracing::trace!(
            "Posting batch of {} samples for generation {}",
            heart_rate.len(),
            self.generation
        );
        self.events.send(SessionEvent::BatchArrived {
            generation: self.generation,
            batch: SampleBatch::new(heart_rate),
        })
    }
}

/// Register a continuously updating query for `predicate`
///
/// Fails with [`Error::QueryCreation`] when the predicate asks for anything
/// other than heart rate, or when the provider rejects the registration.
pub fn open<P>(
    provider: &mut P,
    predicate: &Predicate,
    generation: Generation,
    events: &EventSender,
) -> Result<StreamHandle>
where
    P: HealthProvider + ?Sized,
{
    if predicate.quantity_type != QuantityType::HeartRate {
        return Err(Error::QueryCreation(format!(
            "unsupported quantity type {:?}",
            predicate.quantity_type
        )));
    }

    let sink = BatchSink::new(generation, events.clone());
    let handle = provider
        .register_subscription(predicate, sink)
        .map_err(|e| match e {
            Error::QueryCreation(_) => e,
            other => Error::QueryCreation(other.to_string()),
        })?;

    tracing::info!(
        "Opened heart-rate stream {} for generation {} from {}",
        handle,
        generation,
        predicate.window.start
    );

    Ok(StreamHandle {
        handle,
        generation,
        predicate: predicate.clone(),
    })
}

/// Stop deliveries for a stream
///
/// No further batches are posted once this returns; a batch the provider
/// had already dispatched may still arrive and must be discarded by the caller.
pub fn cancel<P>(provider: &mut P, stream: &StreamHandle)
where
    P: HealthProvider + ?Sized,
{
    provider.cancel_subscription(stream.handle);
    tracing::info!(
        "Cancelled heart-rate stream {} (generation {})",
        stream.handle,
        stream.generation
    );
}
