//! Fixed-step frame scheduling.
//!
//! A frame loop calls [`Clock::advance`] with the elapsed wall time; the clock runs as many ticks
//! as the configured frequency allows, up to a per-frame cap.

use derive_builder::Builder;
use tracing::trace;

use crate::LogicSim;

/// Clock configuration.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ClockConfig {
    /// Ticks per second.
    #[builder(default = "60.0")]
    pub(crate) frequency: f64,
    /// Upper bound on ticks run by a single call to [`Clock::advance`].
    #[builder(default = "10")]
    pub(crate) max_ticks_per_frame: usize,
}

impl ClockConfig {
    /// Creates a new builder for the clock configuration.
    pub fn builder() -> ClockConfigBuilder {
        ClockConfigBuilder::default()
    }

    /// Returns the tick frequency.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Returns the per-frame tick cap.
    pub fn max_ticks_per_frame(&self) -> usize {
        self.max_ticks_per_frame
    }
}

impl ClockConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(frequency) = self.frequency {
            if !(frequency.is_finite() && frequency > 0.0) {
                return Err(format!("frequency must be positive, got {frequency}"));
            }
        }
        Ok(())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfigBuilder::default().build().unwrap()
    }
}

/// Accumulates frame time and turns it into simulation ticks.
#[derive(Debug, Clone)]
pub struct Clock {
    config: ClockConfig,
    acc: f64,
    paused: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

impl Clock {
    /// Creates a running clock.
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            acc: 0.0,
            paused: false,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Returns `true` if the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stops ticking until [`Clock::resume`] is called.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes ticking. Time spent paused is not caught up.
    pub fn resume(&mut self) {
        self.paused = false;
        self.acc = 0.0;
    }

    /// Runs exactly one tick, paused or not.
    pub fn step(&mut self, sim: &mut LogicSim) {
        sim.tick();
    }

    /// Advances by `dt` seconds and returns the number of ticks run.
    ///
    /// Time beyond the per-frame cap is dropped rather than carried into later frames.
    pub fn advance(&mut self, sim: &mut LogicSim, dt: f64) -> usize {
        if self.paused {
            return 0;
        }

        let period = 1.0 / self.config.frequency;
        self.acc += dt.max(0.0);

        let mut ticks = 0;
        while self.acc >= period && ticks < self.config.max_ticks_per_frame {
            sim.tick();
            self.acc -= period;
            ticks += 1;
        }
        if self.acc >= period {
            trace!(backlog = self.acc, "dropping tick backlog");
            self.acc %= period;
        }

        ticks
    }
}
