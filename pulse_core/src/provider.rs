//! Traits for the external collaborators of the session core.
//!
//! The health store (authorization and session/query APIs) and the display
//! surface live outside this crate. The driver talks to them only through
//! these traits.

use crate::events::EventSender;
use crate::stream::BatchSink;
use crate::types::{
    ButtonLabel, DisplayState, Predicate, ProviderSessionId, QuantityType, SubscriptionHandle,
    WorkoutConfiguration,
};
use crate::Result;

/// Data-access permission and capability checks
pub trait AuthorizationProvider {
    /// Whether the platform has a health data store at all
    fn is_health_data_available(&self) -> bool;

    /// Whether the given quantity type is offered on this configuration
    fn supports(&self, quantity_type: QuantityType) -> bool;

    /// Ask for read access; the answer is posted to `reply` as
    /// [`crate::SessionEvent::AuthorizationResolved`]
    fn request_access(&mut self, types: &[QuantityType], reply: EventSender);
}

/// Workout session and sample query API of the health store
///
/// Session state changes and failures are reported asynchronously through
/// the delegate registered with [`HealthProvider::set_delegate`]. Sample
/// deliveries go to the [`BatchSink`] handed to `register_subscription`.
/// Implementations may call back synchronously from within any method.
pub trait HealthProvider {
    fn set_delegate(&mut self, delegate: EventSender);

    fn create_session(&mut self, config: &WorkoutConfiguration) -> Result<ProviderSessionId>;

    fn begin_session(&mut self, session: ProviderSessionId);

    fn end_session(&mut self, session: ProviderSessionId);

    /// Register an anchored, continuously updating query
    fn register_subscription(
        &mut self,
        predicate: &Predicate,
        sink: BatchSink,
    ) -> Result<SubscriptionHandle>;

    /// Stop deliveries for `handle`; unknown handles are ignored
    fn cancel_subscription(&mut self, handle: SubscriptionHandle);
}

/// Receives display updates
pub trait DisplaySurface {
    fn render(&mut self, display: &DisplayState, button: ButtonLabel);
}

/// Keeps every update, newest last
impl DisplaySurface for Vec<(DisplayState, ButtonLabel)> {
    fn render(&mut self, display: &DisplayState, button: ButtonLabel) {
        self.push((display.clone(), button));
    }
}
