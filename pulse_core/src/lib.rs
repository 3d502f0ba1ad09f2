#![forbid(unsafe_code)]

//! Core session logic for the Pulse heart-rate monitor.
//!
//! This crate provides:
//! - Domain types (samples, predicates, session and display state)
//! - The workout session state machine
//! - The heart-rate sample stream and reading presenter
//! - A single-threaded control loop driving external providers
//! - A simulated health store for running without a platform

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod events;
pub mod provider;
pub mod stream;
pub mod presenter;
pub mod controller;
pub mod driver;
pub mod simulated;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use events::{EventSender, Generation, SessionEvent};
pub use provider::{AuthorizationProvider, DisplaySurface, HealthProvider};
pub use stream::{BatchSink, StreamHandle};
pub use presenter::ReadingPresenter;
pub use controller::{ControllerOptions, Effect, SessionController, StreamFailurePolicy};
pub use driver::SessionDriver;
pub use simulated::{SensorProfile, SimulatedHealthStore, SimulatedSensor, SimulatedSettings};
