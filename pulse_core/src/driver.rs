//! Control loop binding the controller to its providers.
//!
//! The driver is the only owner of the [`SessionController`]. Provider
//! callbacks and user intents reach it as [`SessionEvent`]s over a channel,
//! so state is only ever mutated on the thread that runs the loop and no
//! lock guards it. Provider calls may re-enter by posting events; those are
//! queued behind the current transition rather than run inside it.

use crate::controller::{ControllerOptions, Effect, SessionController};
use crate::events::{self, EventSender, SessionEvent};
use crate::provider::{AuthorizationProvider, DisplaySurface, HealthProvider};
use crate::stream;
use crate::types::QuantityType;
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

/// Single-threaded owner of session state
pub struct SessionDriver<P, D>
where
    P: HealthProvider + AuthorizationProvider,
    D: DisplaySurface,
{
    controller: SessionController,
    provider: P,
    surface: D,
    events: EventSender,
    inbox: Receiver<SessionEvent>,
}

impl<P, D> SessionDriver<P, D>
where
    P: HealthProvider + AuthorizationProvider,
    D: DisplaySurface,
{
    /// Create a driver and register it as the provider's delegate
    pub fn new(mut provider: P, surface: D, options: ControllerOptions) -> Self {
        let (events, inbox) = events::channel();
        provider.set_delegate(events.clone());
        Self {
            controller: SessionController::new(options),
            provider,
            surface,
            events,
            inbox,
        }
    }

    /// Sender for posting events from other threads
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn surface(&self) -> &D {
        &self.surface
    }

    /// Run availability checks and request authorization
    pub fn activate(&mut self) {
        let event = SessionEvent::Activated {
            data_available: self.provider.is_health_data_available(),
            heart_rate_supported: self.provider.supports(QuantityType::HeartRate),
        };
        self.dispatch(event);
    }

    /// Start/stop button handler
    pub fn toggle(&mut self) {
        self.dispatch(SessionEvent::Toggle);
    }

    pub fn start(&mut self) {
        self.dispatch(SessionEvent::UserStart);
    }

    pub fn stop(&mut self) {
        self.dispatch(SessionEvent::UserStop);
    }

    /// Apply an event and everything it causes synchronously
    ///
    /// Follow-up events produced by executing effects run before anything
    /// waiting in the channel, in the order they were produced.
    pub fn dispatch(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.controller.handle(event) {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn execute(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::RequestAuthorization(types) => {
                self.provider.request_access(&types, self.events.clone());
                None
            }
            Effect::CreateSession(config) => match self.provider.create_session(&config) {
                Ok(id) => Some(SessionEvent::SessionCreated(id)),
                Err(e) => Some(SessionEvent::SessionCreationFailed(e.to_string())),
            },
            Effect::BeginSession(id) => {
                self.provider.begin_session(id);
                None
            }
            Effect::EndSession(id) => {
                self.provider.end_session(id);
                None
            }
            Effect::OpenSubscription {
                generation,
                predicate,
            } => match stream::open(&mut self.provider, &predicate, generation, &self.events) {
                Ok(handle) => Some(SessionEvent::SubscriptionOpened(handle)),
                Err(e) => Some(SessionEvent::SubscriptionFailed {
                    generation,
                    reason: e.to_string(),
                }),
            },
            Effect::CancelSubscription(handle) => {
                stream::cancel(&mut self.provider, &handle);
                Some(SessionEvent::SubscriptionCancelled {
                    generation: handle.generation,
                })
            }
            Effect::Render { display, button } => {
                self.surface.render(&display, button);
                None
            }
        }
    }

    /// Apply every event already waiting in the channel; returns how many
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        loop {
            match self.inbox.try_recv() {
                Ok(SessionEvent::Shutdown) => {
                    processed += 1;
                    break;
                }
                Ok(event) => {
                    self.dispatch(event);
                    processed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        processed
    }

    /// Run the loop until `done` holds, `timeout` passes, or a shutdown arrives
    ///
    /// Returns true only if `done` was satisfied.
    pub fn run_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&SessionController) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.controller) {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            match self.inbox.recv_timeout(remaining) {
                Ok(SessionEvent::Shutdown) => {
                    tracing::debug!("Control loop shutting down");
                    return done(&self.controller);
                }
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => return done(&self.controller),
                Err(RecvTimeoutError::Disconnected) => return done(&self.controller),
            }
        }
    }

    /// Process events for `duration`, stopping early on shutdown
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(duration, |_| false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedHealthStore, SimulatedSettings, StoreCall};
    use crate::types::{ButtonLabel, DisplayState, Sample, SessionState};
    use chrono::Utc;

    type Updates = Vec<(DisplayState, ButtonLabel)>;
    type TestDriver = SessionDriver<SimulatedHealthStore, Updates>;

    fn driver_with(settings: SimulatedSettings) -> (SimulatedHealthStore, TestDriver) {
        let store = SimulatedHealthStore::new(settings);
        let driver = SessionDriver::new(store.clone(), Vec::new(), ControllerOptions::default());
        (store, driver)
    }

    fn activated(settings: SimulatedSettings) -> (SimulatedHealthStore, TestDriver) {
        let (store, mut driver) = driver_with(settings);
        driver.activate();
        driver.process_pending();
        (store, driver)
    }

    #[test]
    fn test_activation_grants_access() {
        let (store, driver) = activated(SimulatedSettings::default());
        assert_eq!(
            driver.controller().availability(),
            crate::types::Availability::Granted
        );
        assert_eq!(
            store.calls(),
            vec![StoreCall::RequestAccess(vec![QuantityType::HeartRate])]
        );
    }

    #[test]
    fn test_toggle_reaches_running_with_one_subscription() {
        let (store, mut driver) = activated(SimulatedSettings::default());
        driver.toggle();
        // Running is reported through the channel, so the session is still starting
        assert_eq!(driver.controller().state(), &SessionState::Starting);
        driver.start();
        driver.process_pending();

        assert_eq!(driver.controller().state(), &SessionState::Running);
        assert_eq!(store.registrations(), 1);
        assert_eq!(store.active_subscriptions(), 1);
    }

    #[test]
    fn test_samples_reach_surface_in_order() {
        let (store, mut driver) = activated(SimulatedSettings::default());
        driver.toggle();
        driver.process_pending();

        for bpm in [80.0, 81.0, 82.0] {
            store.record(Sample::heart_rate(bpm, "Watch", Utc::now()));
        }
        driver.process_pending();

        let values: Vec<&str> = driver
            .surface()
            .iter()
            .filter(|(d, _)| d.pulse_trigger)
            .map(|(d, _)| d.latest_value_text.as_str())
            .collect();
        assert_eq!(values, vec!["80", "81", "82"]);
    }

    #[test]
    fn test_shutdown_stops_run_loop() {
        let (_store, mut driver) = activated(SimulatedSettings::default());
        let sender = driver.sender();
        std::thread::spawn(move || {
            sender.shutdown();
        });
        let satisfied = driver.run_until(Duration::from_secs(5), |_| false);
        assert!(!satisfied);
    }

    #[test]
    fn test_run_until_sees_events_from_other_threads() {
        let (_store, mut driver) = activated(SimulatedSettings::default());
        let sender = driver.sender();
        std::thread::spawn(move || {
            sender.toggle();
        });

        let running = driver.run_until(Duration::from_secs(5), |c| {
            c.state() == &SessionState::Running
        });
        assert!(running);
    }

    #[test]
    fn test_creation_failure_renders_cannot_start() {
        let (_store, mut driver) = activated(SimulatedSettings {
            fail_session_creation: true,
            ..SimulatedSettings::default()
        });
        driver.toggle();

        let (last, button) = driver.surface().last().cloned().unwrap();
        assert_eq!(last.latest_value_text, "cannot start");
        assert_eq!(button, ButtonLabel::Start);
    }
}
