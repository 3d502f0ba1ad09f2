//! Configuration file support for Pulse.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pulse/config.toml`.

use crate::controller::{ControllerOptions, StreamFailurePolicy};
use crate::simulated::{SensorProfile, SimulatedSettings};
use crate::types::{ActivityType, LocationType, WorkoutConfiguration};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Workout session configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_activity_type")]
    pub activity_type: ActivityType,

    #[serde(default = "default_location_type")]
    pub location_type: LocationType,

    #[serde(default)]
    pub on_stream_failure: StreamFailurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activity_type: default_activity_type(),
            location_type: default_location_type(),
            on_stream_failure: StreamFailurePolicy::default(),
        }
    }
}

/// Simulated sensor and health store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_baseline_bpm")]
    pub baseline_bpm: f64,

    #[serde(default = "default_amplitude_bpm")]
    pub amplitude_bpm: f64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_true")]
    pub health_data_available: bool,

    #[serde(default = "default_true")]
    pub heart_rate_supported: bool,

    #[serde(default = "default_true")]
    pub grant_access: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            baseline_bpm: default_baseline_bpm(),
            amplitude_bpm: default_amplitude_bpm(),
            interval_ms: default_interval_ms(),
            health_data_available: true,
            heart_rate_supported: true,
            grant_access: true,
        }
    }
}

// Default value functions
fn default_activity_type() -> ActivityType {
    ActivityType::CrossTraining
}

fn default_location_type() -> LocationType {
    LocationType::Indoor
}

fn default_device_name() -> String {
    "Apple Watch".into()
}

fn default_baseline_bpm() -> f64 {
    72.0
}

fn default_amplitude_bpm() -> f64 {
    12.0
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("pulse").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values the simulator cannot run with
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulator;
        if sim.interval_ms == 0 {
            return Err(Error::Config("simulator.interval_ms must be positive".into()));
        }
        if !sim.baseline_bpm.is_finite() || sim.baseline_bpm < 0.0 {
            return Err(Error::Config(format!(
                "simulator.baseline_bpm must be a non-negative number, got {}",
                sim.baseline_bpm
            )));
        }
        if !sim.amplitude_bpm.is_finite() || sim.amplitude_bpm < 0.0 {
            return Err(Error::Config(format!(
                "simulator.amplitude_bpm must be a non-negative number, got {}",
                sim.amplitude_bpm
            )));
        }
        Ok(())
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            workout: WorkoutConfiguration {
                activity_type: self.session.activity_type,
                location_type: self.session.location_type,
            },
            on_stream_failure: self.session.on_stream_failure,
        }
    }

    pub fn simulated_settings(&self) -> SimulatedSettings {
        SimulatedSettings {
            health_data_available: self.simulator.health_data_available,
            heart_rate_supported: self.simulator.heart_rate_supported,
            grant_access: self.simulator.grant_access,
            ..SimulatedSettings::default()
        }
    }

    pub fn sensor_profile(&self) -> SensorProfile {
        SensorProfile {
            device_name: self.simulator.device_name.clone(),
            baseline_bpm: self.simulator.baseline_bpm,
            amplitude_bpm: self.simulator.amplitude_bpm,
            interval: Duration::from_millis(self.simulator.interval_ms),
        }
    }
}
