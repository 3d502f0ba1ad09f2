//! In-process simulated health store.
//!
//! Implements both provider traits without any platform support, so the
//! CLI can run a workout end to end and tests can script provider behavior:
//! delegate timing, creation and query failures, and batches that were
//! already in flight when their subscription was cancelled.
//!
//! [`SimulatedHealthStore`] is a cheap cloneable handle; every clone shares
//! the same store, which lets a sensor thread record samples while the
//! driver owns another clone.

use crate::events::EventSender;
use crate::provider::{AuthorizationProvider, HealthProvider};
use crate::stream::BatchSink;
use crate::types::{
    Predicate, ProviderSessionId, ProviderSessionState, QuantityType, Sample, SubscriptionHandle,
    Timestamp, WorkoutConfiguration,
};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Samples kept for replay as initial query results
const HISTORY_LIMIT: usize = 1024;

/// Behavior switches for the simulated store
#[derive(Clone, Debug)]
pub struct SimulatedSettings {
    pub health_data_available: bool,
    pub heart_rate_supported: bool,
    pub grant_access: bool,
    pub fail_session_creation: bool,
    pub fail_query_creation: bool,
    /// Report running/ended through the delegate as soon as a session is begun/ended
    pub auto_report_state: bool,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            health_data_available: true,
            heart_rate_supported: true,
            grant_access: true,
            fail_session_creation: false,
            fail_query_creation: false,
            auto_report_state: true,
        }
    }
}

/// Provider calls observed by the store, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    RequestAccess(Vec<QuantityType>),
    CreateSession(WorkoutConfiguration),
    BeginSession(ProviderSessionId),
    EndSession(ProviderSessionId),
    RegisterSubscription(Predicate),
    CancelSubscription(SubscriptionHandle),
}

struct Subscriber {
    predicate: Predicate,
    sink: BatchSink,
}

#[derive(Default)]
struct StoreInner {
    settings: SimulatedSettings,
    delegate: Option<EventSender>,
    sessions: HashMap<ProviderSessionId, ProviderSessionState>,
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    history: VecDeque<Sample>,
    calls: Vec<StoreCall>,
    hold_deliveries: bool,
    in_flight: Vec<(BatchSink, Vec<Sample>)>,
}

/// Shared handle to a simulated health store
#[derive(Clone, Default)]
pub struct SimulatedHealthStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SimulatedHealthStore {
    pub fn new(settings: SimulatedSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                settings,
                ..StoreInner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change behavior switches for subsequent calls
    pub fn update_settings<F>(&self, f: F)
    where
        F: FnOnce(&mut SimulatedSettings),
    {
        f(&mut self.lock().settings);
    }

    /// Every provider call made so far
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of subscriptions ever registered
    pub fn registrations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, StoreCall::RegisterSubscription(_)))
            .count()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn session_state(&self, session: ProviderSessionId) -> Option<ProviderSessionState> {
        self.lock().sessions.get(&session).copied()
    }

    /// Record a sample and push it to every matching subscription
    pub fn record(&self, sample: Sample) {
        self.record_batch(vec![sample]);
    }

    /// Record samples; each subscription receives its matching subset as one batch
    pub fn record_batch(&self, samples: Vec<Sample>) {
        let deliveries = {
            let mut inner = self.lock();
            for sample in &samples {
                if inner.history.len() == HISTORY_LIMIT {
                    inner.history.pop_front();
                }
                inner.history.push_back(sample.clone());
            }

            let deliveries: Vec<(BatchSink, Vec<Sample>)> = inner
                .subscribers
                .values()
                .filter_map(|sub| {
                    let matching: Vec<Sample> = samples
                        .iter()
                        .filter(|s| sub.predicate.matches(s))
                        .cloned()
                        .collect();
                    (!matching.is_empty()).then(|| (sub.sink.clone(), matching))
                })
                .collect();

            if inner.hold_deliveries {
                inner.in_flight.extend(deliveries);
                return;
            }
            deliveries
        };

        for (sink, batch) in deliveries {
            sink.deliver(Some(batch));
        }
    }

    /// Queue deliveries instead of posting them, as if dispatched but not yet run
    pub fn hold_deliveries(&self) {
        self.lock().hold_deliveries = true;
    }

    /// Post every queued delivery, even for subscriptions cancelled since
    pub fn release_deliveries(&self) -> usize {
        let in_flight = {
            let mut inner = self.lock();
            inner.hold_deliveries = false;
            std::mem::take(&mut inner.in_flight)
        };
        let count = in_flight.len();
        for (sink, batch) in in_flight {
            sink.deliver(Some(batch));
        }
        count
    }

    /// Report a session state change through the delegate
    ///
    /// Ended sessions are forgotten once reported.
    pub fn report_state(
        &self,
        session: ProviderSessionId,
        to: ProviderSessionState,
        date: Timestamp,
    ) {
        let delegate = {
            let mut inner = self.lock();
            let previous = if to == ProviderSessionState::Ended {
                inner.sessions.remove(&session)
            } else {
                inner.sessions.insert(session, to)
            };
            let from = previous.unwrap_or(ProviderSessionState::NotStarted);
            inner.delegate.clone().map(|d| (d, from))
        };

        match delegate {
            Some((delegate, from)) => {
                delegate.state_changed(session, from, to, date);
            }
            None => tracing::warn!("No delegate registered for session {}", session),
        }
    }

    /// Report a session error through the delegate
    pub fn report_failure(&self, session: ProviderSessionId, reason: &str) {
        let delegate = self.lock().delegate.clone();
        if let Some(delegate) = delegate {
            delegate.session_failed(session, reason);
        }
    }
}

impl AuthorizationProvider for SimulatedHealthStore {
    fn is_health_data_available(&self) -> bool {
        self.lock().settings.health_data_available
    }

    fn supports(&self, quantity_type: QuantityType) -> bool {
        match quantity_type {
            QuantityType::HeartRate => self.lock().settings.heart_rate_supported,
            QuantityType::StepCount => true,
        }
    }

    fn request_access(&mut self, types: &[QuantityType], reply: EventSender) {
        let granted = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::RequestAccess(types.to_vec()));
            inner.settings.grant_access
        };
        let granted = granted && types.iter().all(|t| self.supports(*t));
        reply.authorization_resolved(granted);
    }
}

impl HealthProvider for SimulatedHealthStore {
    fn set_delegate(&mut self, delegate: EventSender) {
        self.lock().delegate = Some(delegate);
    }

    fn create_session(&mut self, config: &WorkoutConfiguration) -> Result<ProviderSessionId> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::CreateSession(config.clone()));
        if inner.settings.fail_session_creation {
            return Err(Error::SessionCreation(
                "simulated session creation failure".into(),
            ));
        }

        let id = ProviderSessionId::new();
        inner.sessions.insert(id, ProviderSessionState::NotStarted);
        Ok(id)
    }

    fn begin_session(&mut self, session: ProviderSessionId) {
        let auto = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::BeginSession(session));
            inner.settings.auto_report_state
        };
        if auto {
            self.report_state(session, ProviderSessionState::Running, Utc::now());
        }
    }

    fn end_session(&mut self, session: ProviderSessionId) {
        let auto = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::EndSession(session));
            inner.settings.auto_report_state
        };
        if auto {
            self.report_state(session, ProviderSessionState::Ended, Utc::now());
        }
    }

    fn register_subscription(
        &mut self,
        predicate: &Predicate,
        sink: BatchSink,
    ) -> Result<SubscriptionHandle> {
        let (handle, initial) = {
            let mut inner = self.lock();
            inner
                .calls
                .push(StoreCall::RegisterSubscription(predicate.clone()));

            let settings = &inner.settings;
            if settings.fail_query_creation
                || (predicate.quantity_type == QuantityType::HeartRate
                    && !settings.heart_rate_supported)
            {
                return Err(Error::QueryCreation(
                    "heart-rate quantity type unavailable".into(),
                ));
            }

            let initial: Vec<Sample> = inner
                .history
                .iter()
                .filter(|s| predicate.matches(s))
                .cloned()
                .collect();

            let handle = SubscriptionHandle::new();
            inner.subscribers.insert(
                handle,
                Subscriber {
                    predicate: predicate.clone(),
                    sink: sink.clone(),
                },
            );
            (handle, initial)
        };

        // Initial results, same path as every later update
        sink.deliver(Some(initial));
        Ok(handle)
    }

    fn cancel_subscription(&mut self, handle: SubscriptionHandle) {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::CancelSubscription(handle));
        inner.subscribers.remove(&handle);
    }
}

/// Shape of the simulated heart-rate signal
#[derive(Clone, Debug)]
pub struct SensorProfile {
    pub device_name: String,
    pub baseline_bpm: f64,
    pub amplitude_bpm: f64,
    pub interval: Duration,
}

/// Value of the simulated signal at a given tick
pub fn simulated_bpm(profile: &SensorProfile, tick: u64) -> f64 {
    let phase = tick as f64 * 0.35;
    (profile.baseline_bpm + profile.amplitude_bpm * phase.sin()).max(0.0)
}

/// Background thread recording samples into a store at a fixed interval
pub struct SimulatedSensor {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl SimulatedSensor {
    pub fn spawn(store: SimulatedHealthStore, profile: SensorProfile) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            let mut tick = 0u64;
            while !flag.load(Ordering::Relaxed) {
                let bpm = simulated_bpm(&profile, tick);
                store.record(Sample::heart_rate(bpm, profile.device_name.clone(), Utc::now()));
                tick += 1;
                thread::sleep(profile.interval);
            }
            tick
        });

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop the thread and return how many samples it recorded
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stop.store(true, Ordering::Relaxed);
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(ticks)) => ticks,
            Some(Err(_)) => {
                tracing::warn!("Simulated sensor thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
