//! Messages consumed by the session control loop.
//!
//! Provider delegate callbacks, sample deliveries and user intents all
//! become a [`SessionEvent`] sent through an [`EventSender`]. Senders are
//! cheap to clone and may be used from any thread; the receiving side is
//! drained by a single [`crate::driver::SessionDriver`].

use crate::stream::StreamHandle;
use crate::types::{ProviderSessionId, ProviderSessionState, SampleBatch, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// Counter bumped on every session start; stamps subscriptions and batches
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything that can happen to a session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Result of the activation checks
    Activated {
        data_available: bool,
        heart_rate_supported: bool,
    },
    /// Authorization reply for heart-rate read access
    AuthorizationResolved { granted: bool },
    UserStart,
    UserStop,
    /// Start/stop button tapped
    Toggle,
    SessionCreated(ProviderSessionId),
    SessionCreationFailed(String),
    /// Delegate: the provider session moved between states
    ProviderStateChanged {
        session: ProviderSessionId,
        from: ProviderSessionState,
        to: ProviderSessionState,
        date: Timestamp,
    },
    /// Delegate: the provider session reported an error
    ProviderFailed {
        session: ProviderSessionId,
        reason: String,
    },
    SubscriptionOpened(StreamHandle),
    SubscriptionFailed {
        generation: Generation,
        reason: String,
    },
    SubscriptionCancelled { generation: Generation },
    /// Initial results or an update from a subscription
    BatchArrived {
        generation: Generation,
        batch: SampleBatch,
    },
    /// Stop the control loop
    Shutdown,
}

/// Cloneable handle for posting events to the control loop
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<SessionEvent>,
}

/// Create a connected sender/receiver pair
pub fn channel() -> (EventSender, Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    /// Post an event; returns false if the control loop is gone
    pub fn send(&self, event: SessionEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::SendError(event)) => {
                tracing::debug!("Control loop has shut down, dropping {:?}", event);
                false
            }
        }
    }

    pub fn toggle(&self) -> bool {
        self.send(SessionEvent::Toggle)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionEvent::Shutdown)
    }

    pub fn authorization_resolved(&self, granted: bool) -> bool {
        self.send(SessionEvent::AuthorizationResolved { granted })
    }

    pub fn state_changed(
        &self,
        session: ProviderSessionId,
        from: ProviderSessionState,
        to: ProviderSessionState,
        date: Timestamp,
    ) -> bool {
        self.send(SessionEvent::ProviderStateChanged {
            session,
            from,
            to,
            date,
        })
    }

    pub fn session_failed(&self, session: ProviderSessionId, reason: impl Into<String>) -> bool {
        self.send(SessionEvent::ProviderFailed {
            session,
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_receiver_dropped_reports_false() {
        let (tx, rx) = channel();
        assert!(tx.toggle());
        drop(rx);
        assert!(!tx.toggle());
    }

    #[test]
    fn test_events_arrive_in_send_order_across_threads() {
        let (tx, rx) = channel();
        let worker = tx.clone();
        std::thread::spawn(move || {
            worker.send(SessionEvent::UserStart);
            worker.send(SessionEvent::UserStop);
        })
        .join()
        .unwrap();

        assert_eq!(rx.recv().unwrap(), SessionEvent::UserStart);
        assert_eq!(rx.recv().unwrap(), SessionEvent::UserStop);
    }
}
