use clap::{Parser, Subcommand};
use pulse_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on waiting for the provider to confirm a state change
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Real-time heart-rate workout monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override config file location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workout against the simulated sensor (default)
    Monitor {
        /// How long the workout runs before it is stopped
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,

        /// Milliseconds between simulated samples
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Name reported as the sample source
        #[arg(long)]
        device: Option<String>,

        /// Simulate the user refusing heart-rate access
        #[arg(long)]
        deny_access: bool,

        /// Simulate a platform without a health data store
        #[arg(long)]
        unavailable: bool,

        /// Print display updates as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config path instead of printing
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    pulse_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config_path = cli.config.clone();
    let config = match &config_path {
        Some(path) if path.exists() => Config::load_from(path)?,
        Some(_) => Config::default(),
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Monitor {
            duration_secs,
            interval_ms,
            device,
            deny_access,
            unavailable,
            json,
        }) => {
            let mut config = config;
            if let Some(ms) = interval_ms {
                config.simulator.interval_ms = ms;
            }
            if let Some(name) = device {
                config.simulator.device_name = name;
            }
            if deny_access {
                config.simulator.grant_access = false;
            }
            if unavailable {
                config.simulator.health_data_available = false;
            }
            config.validate()?;
            cmd_monitor(&config, Duration::from_secs(duration_secs), json)
        }
        Some(Commands::Config { write }) => cmd_config(&config, config_path, write),
        None => cmd_monitor(&config, Duration::from_secs(30), false),
    }
}

fn cmd_monitor(config: &Config, duration: Duration, json: bool) -> Result<()> {
    let store = SimulatedHealthStore::new(config.simulated_settings());
    let surface = TerminalSurface::new(json);
    let mut driver = SessionDriver::new(store.clone(), surface, config.controller_options());

    driver.activate();
    let authorized = driver.run_until(SETTLE_TIMEOUT, |c| {
        c.availability() != Availability::Pending
    });
    if !authorized {
        tracing::warn!("No authorization reply within {:?}", SETTLE_TIMEOUT);
    }
    if let Err(e) = driver.controller().availability().check() {
        tracing::warn!("Heart-rate monitoring unavailable: {}", e);
        return Ok(());
    }

    // Start
    driver.toggle();
    let running = driver.run_until(SETTLE_TIMEOUT, |c| {
        c.state() != &SessionState::Starting
    });
    if !running || driver.controller().state() != &SessionState::Running {
        tracing::warn!("Workout did not start: {:?}", driver.controller().state());
        return Ok(());
    }

    let sensor = SimulatedSensor::spawn(store, config.sensor_profile());
    driver.run_for(duration);

    // Stop
    driver.toggle();
    let ended = driver.run_until(SETTLE_TIMEOUT, |c| c.state().is_terminal());
    let samples = sensor.stop();

    if !ended {
        tracing::warn!("Workout did not end cleanly: {:?}", driver.controller().state());
    }
    tracing::info!(
        "Workout finished after {} simulated samples ({} updates shown)",
        samples,
        driver.surface().updates()
    );
    Ok(())
}

fn cmd_config(config: &Config, path: Option<PathBuf>, write: bool) -> Result<()> {
    if write {
        let path = path.unwrap_or_else(Config::default_config_path);
        config.save_to(&path)?;
        println!("✓ Wrote config to {}", path.display());
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

/// Renders display updates as terminal lines
struct TerminalSurface {
    json: bool,
    updates: usize,
}

impl TerminalSurface {
    fn new(json: bool) -> Self {
        Self { json, updates: 0 }
    }

    fn updates(&self) -> usize {
        self.updates
    }

    fn write_line(&self, display: &DisplayState, button: ButtonLabel) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if self.json {
            let line = serde_json::json!({
                "latest_value_text": display.latest_value_text,
                "device_name_text": display.device_name_text,
                "pulse_trigger": display.pulse_trigger,
                "button": button.as_str(),
            });
            writeln!(out, "{}", line)?;
        } else {
            let pulse = if display.pulse_trigger { " ♥" } else { "" };
            if display.device_name_text.is_empty() {
                writeln!(out, "[{:<5}] {}{}", button, display.latest_value_text, pulse)?;
            } else {
                writeln!(
                    out,
                    "[{:<5}] {} ({}){}",
                    button, display.latest_value_text, display.device_name_text, pulse
                )?;
            }
        }
        out.flush()
    }
}

impl DisplaySurface for TerminalSurface {
    fn render(&mut self, display: &DisplayState, button: ButtonLabel) {
        self.updates += 1;
        if let Err(e) = self.write_line(display, button) {
            tracing::warn!("Failed to write display update: {}", e);
        }
    }
}
