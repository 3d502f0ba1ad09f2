//! Workout session state machine.
//!
//! [`SessionController::handle`] is the whole transition function: it takes
//! one [`SessionEvent`], updates the controller's state and returns the
//! [`Effect`]s the driver must carry out. It never calls a provider itself,
//! so every path can be tested without a health store.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --start--> Starting --running--> Running --ended--> Ending --cancelled--> Ended
//!                    |                     |
//!                    +--creation error--> Failed <--stream failure (fail_session)
//! ```
//!
//! `Ended` and `Failed` are reset to `Idle` by the next start intent.

use crate::events::{Generation, SessionEvent};
use crate::presenter::ReadingPresenter;
use crate::stream::StreamHandle;
use crate::types::{
    Availability, ButtonLabel, DisplayState, FailureReason, Predicate, ProviderSessionId,
    ProviderSessionState, QuantityType, SampleBatch, SessionState, StatusText, Timestamp,
    WorkoutConfiguration,
};
use serde::{Deserialize, Serialize};

/// What to do when the sample query cannot be registered
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamFailurePolicy {
    /// End the provider session and enter `Failed`
    #[default]
    FailSession,
    /// Stay `Running` with no data flowing until the user stops
    KeepRunning,
}

/// Tunables for a controller
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    pub workout: WorkoutConfiguration,
    pub on_stream_failure: StreamFailurePolicy,
}

/// Side effects requested by a transition, executed in order by the driver
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    RequestAuthorization(Vec<QuantityType>),
    CreateSession(WorkoutConfiguration),
    BeginSession(ProviderSessionId),
    EndSession(ProviderSessionId),
    OpenSubscription {
        generation: Generation,
        predicate: Predicate,
    },
    CancelSubscription(StreamHandle),
    Render {
        display: DisplayState,
        button: ButtonLabel,
    },
}

/// The one workout attempt the controller is tracking
#[derive(Clone, Debug)]
struct ActiveSession {
    generation: Generation,
    /// Set once the provider has created the session
    id: Option<ProviderSessionId>,
    started_at: Option<Timestamp>,
}

/// Owns session, subscription and display state
#[derive(Debug)]
pub struct SessionController {
    options: ControllerOptions,
    presenter: ReadingPresenter,
    state: SessionState,
    availability: Availability,
    session: Option<ActiveSession>,
    subscription: Option<StreamHandle>,
    generation: Generation,
    workout_active: bool,
    display: DisplayState,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl SessionController {
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            options,
            presenter: ReadingPresenter::new(),
            state: SessionState::Idle,
            availability: Availability::Unknown,
            session: None,
            subscription: None,
            generation: Generation::default(),
            workout_active: false,
            display: DisplayState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn workout_active(&self) -> bool {
        self.workout_active
    }

    pub fn button_label(&self) -> ButtonLabel {
        if self.workout_active {
            ButtonLabel::Stop
        } else {
            ButtonLabel::Start
        }
    }

    /// Generation of the most recently started session
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn subscription(&self) -> Option<&StreamHandle> {
        self.subscription.as_ref()
    }

    pub fn session_id(&self) -> Option<ProviderSessionId> {
        self.session.as_ref().and_then(|s| s.id)
    }

    /// Date the provider reported the current session as running
    pub fn session_start(&self) -> Option<Timestamp> {
        self.session.as_ref().and_then(|s| s.started_at)
    }

    /// Apply one event and return the effects to execute
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::Activated {
                data_available,
                heart_rate_supported,
            } => self.on_activated(data_available, heart_rate_supported),
            SessionEvent::AuthorizationResolved { granted } => self.on_authorization(granted),
            SessionEvent::UserStart => self.start(),
            SessionEvent::UserStop => self.stop(),
            SessionEvent::Toggle => {
                if self.workout_active {
                    self.stop()
                } else {
                    self.start()
                }
            }
            SessionEvent::SessionCreated(id) => self.on_session_created(id),
            SessionEvent::SessionCreationFailed(reason) => self.on_session_creation_failed(reason),
            SessionEvent::ProviderStateChanged {
                session,
                from,
                to,
                date,
            } => self.on_provider_state(session, from, to, date),
            SessionEvent::ProviderFailed { session, reason } => {
                tracing::warn!("Workout session {} reported an error: {}", session, reason);
                Vec::new()
            }
            SessionEvent::SubscriptionOpened(stream) => self.on_subscription_opened(stream),
            SessionEvent::SubscriptionFailed { generation, reason } => {
                self.on_subscription_failed(generation, reason)
            }
            SessionEvent::SubscriptionCancelled { generation } => {
                self.on_subscription_cancelled(generation)
            }
            SessionEvent::BatchArrived { generation, batch } => self.on_batch(generation, &batch),
            SessionEvent::Shutdown => Vec::new(),
        }
    }

    fn on_activated(&mut self, data_available: bool, heart_rate_supported: bool) -> Vec<Effect> {
        if matches!(self.availability, Availability::Granted | Availability::Pending) {
            tracing::debug!("Already activated ({:?})", self.availability);
            return Vec::new();
        }

        if !data_available {
            tracing::warn!("Health data is not available on this device");
            self.availability = Availability::Unavailable;
            return vec![self.show_status(StatusText::NotAvailable)];
        }

        if !heart_rate_supported {
            tracing::warn!("Heart-rate quantity type is not supported");
            self.availability = Availability::Unsupported;
            return vec![self.show_status(StatusText::NotAllowed)];
        }

        self.availability = Availability::Pending;
        vec![Effect::RequestAuthorization(vec![QuantityType::HeartRate])]
    }

    fn on_authorization(&mut self, granted: bool) -> Vec<Effect> {
        if self.availability != Availability::Pending {
            tracing::debug!("Ignoring authorization reply in {:?}", self.availability);
            return Vec::new();
        }

        if granted {
            tracing::info!("Heart-rate read access granted");
            self.availability = Availability::Granted;
            Vec::new()
        } else {
            tracing::warn!("Heart-rate read access denied");
            self.availability = Availability::Denied;
            vec![self.show_status(StatusText::NotAllowed)]
        }
    }

    fn start(&mut self) -> Vec<Effect> {
        if self.availability != Availability::Granted {
            tracing::debug!("Start ignored: availability is {:?}", self.availability);
            return Vec::new();
        }

        if self.state.is_terminal() {
            tracing::debug!("Resetting {:?} to Idle", self.state);
            self.state = SessionState::Idle;
        }

        if self.state != SessionState::Idle {
            tracing::debug!("Start ignored: session already {:?}", self.state);
            return Vec::new();
        }

        self.generation = self.generation.next();
        self.session = Some(ActiveSession {
            generation: self.generation,
            id: None,
            started_at: None,
        });
        self.state = SessionState::Starting;
        self.workout_active = true;
        tracing::info!("Starting workout session {}", self.generation);

        // Clear any status left over from an earlier attempt
        vec![
            self.show_status(StatusText::Placeholder),
            Effect::CreateSession(self.options.workout.clone()),
        ]
    }

    fn stop(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Running || !self.workout_active {
            tracing::debug!("Stop ignored in {:?}", self.state);
            return Vec::new();
        }

        let Some(id) = self.session_id() else {
            return Vec::new();
        };

        tracing::info!("Ending workout session {}", id);
        self.workout_active = false;
        vec![self.render(), Effect::EndSession(id)]
    }

    fn on_session_created(&mut self, id: ProviderSessionId) -> Vec<Effect> {
        match self.session.as_mut() {
            Some(session) if self.state == SessionState::Starting && session.id.is_none() => {
                session.id = Some(id);
                tracing::debug!("Created workout session {}", id);
                vec![Effect::BeginSession(id)]
            }
            _ => {
                tracing::warn!("Ending unexpected workout session {} in {:?}", id, self.state);
                vec![Effect::EndSession(id)]
            }
        }
    }

    fn on_session_creation_failed(&mut self, reason: String) -> Vec<Effect> {
        if self.state != SessionState::Starting {
            return Vec::new();
        }

        tracing::error!("Unable to create the workout session: {}", reason);
        self.session = None;
        self.workout_active = false;
        self.state = SessionState::Failed(FailureReason::CreationError(reason));
        vec![self.show_status(StatusText::CannotStart)]
    }

    fn on_provider_state(
        &mut self,
        session: ProviderSessionId,
        from: ProviderSessionState,
        to: ProviderSessionState,
        date: Timestamp,
    ) -> Vec<Effect> {
        if self.session_id() != Some(session) {
            tracing::debug!(
                "Ignoring {:?} -> {:?} for session {} (not current)",
                from,
                to,
                session
            );
            return Vec::new();
        }

        match to {
            ProviderSessionState::Running => self.on_running(date),
            ProviderSessionState::Ended => self.on_ended(),
            other => {
                tracing::info!("Unexpected state {:?}", other);
                Vec::new()
            }
        }
    }

    fn on_running(&mut self, date: Timestamp) -> Vec<Effect> {
        if self.state != SessionState::Starting {
            tracing::debug!("Running reported while {:?}", self.state);
            return Vec::new();
        }

        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.started_at = Some(date);
        self.state = SessionState::Running;
        tracing::info!("Workout session {} running since {}", self.generation, date);

        vec![
            self.render(),
            Effect::OpenSubscription {
                generation: self.generation,
                predicate: Predicate::heart_rate_since(date),
            },
        ]
    }

    fn on_ended(&mut self) -> Vec<Effect> {
        if !matches!(self.state, SessionState::Running | SessionState::Starting) {
            tracing::debug!("Ended reported while {:?}", self.state);
            return Vec::new();
        }

        self.state = SessionState::Ending;
        self.workout_active = false;

        let mut effects = Vec::new();
        if let Some(stream) = self.subscription.take() {
            effects.push(Effect::CancelSubscription(stream));
        } else {
            self.finish_ending();
        }
        effects.push(self.show_status(StatusText::Placeholder));
        effects
    }

    fn finish_ending(&mut self) {
        self.session = None;
        self.state = SessionState::Ended;
        tracing::info!("Workout session {} ended", self.generation);
    }

    fn on_subscription_opened(&mut self, stream: StreamHandle) -> Vec<Effect> {
        let current = self.state == SessionState::Running
            && stream.generation == self.generation
            && self.subscription.is_none();
        if !current {
            tracing::warn!(
                "Cancelling stream {} opened for generation {} while {:?}",
                stream.handle,
                stream.generation,
                self.state
            );
            return vec![Effect::CancelSubscription(stream)];
        }

        self.subscription = Some(stream);
        Vec::new()
    }

    fn on_subscription_failed(&mut self, generation: Generation, reason: String) -> Vec<Effect> {
        if self.state != SessionState::Running || generation != self.generation {
            return Vec::new();
        }

        tracing::error!("Unable to stream heart rate: {}", reason);
        match self.options.on_stream_failure {
            StreamFailurePolicy::KeepRunning => vec![self.show_status(StatusText::CannotStart)],
            StreamFailurePolicy::FailSession => {
                let id = self.session_id();
                self.session = None;
                self.workout_active = false;
                self.state = SessionState::Failed(FailureReason::QueryCreationError(reason));

                let mut effects = vec![self.show_status(StatusText::CannotStart)];
                if let Some(id) = id {
                    effects.push(Effect::EndSession(id));
                }
                effects
            }
        }
    }

    fn on_subscription_cancelled(&mut self, generation: Generation) -> Vec<Effect> {
        let ending_current = self.state == SessionState::Ending
            && self.session.as_ref().map(|s| s.generation) == Some(generation);
        if !ending_current {
            return Vec::new();
        }

        self.finish_ending();
        vec![self.render()]
    }

    fn on_batch(&mut self, generation: Generation, batch: &SampleBatch) -> Vec<Effect> {
        let active = self.state == SessionState::Running
            && self.subscription.as_ref().map(|s| s.generation) == Some(generation);
        if !active {
            tracing::debug!(
                "Discarding stale batch of {} samples from generation {}",
                batch.len(),
                generation
            );
            return Vec::new();
        }

        match self.presenter.on_batch(batch) {
            Some(display) => {
                self.display = display;
                vec![Effect::Render {
                    display: self.display.clone(),
                    button: self.button_label(),
                }]
            }
            None => Vec::new(),
        }
    }

    fn show_status(&mut self, status: StatusText) -> Effect {
        self.display = self.display.with_status(status);
        self.render()
    }

    /// Re-render current state; only batches fire the pulse
    fn render(&mut self) -> Effect {
        self.display.pulse_trigger = false;
        Effect::Render {
            display: self.display.clone(),
            button: self.button_label(),
        }
    }
}
