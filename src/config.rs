use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::integrator::{TimeGrid, Tolerances};
use crate::lorenz::{LorenzParameters, State};
use crate::monte_carlo::PiMethod;

/// Constants of the π estimation cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiConfig {
    pub trial_counts: Vec<u64>,
    pub radius: f64,
    pub methods: Vec<PiMethod>,
}

impl Default for PiConfig {
    fn default() -> Self {
        Self {
            trial_counts: vec![100_000, 1_000_000, 10_000_000],
            radius: 1.0,
            methods: PiMethod::ALL.to_vec(),
        }
    }
}

/// Constants of the Lorenz attractor cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorenzConfig {
    pub params: LorenzParameters,
    pub initial: [f64; 3],
    pub t_start: f64,
    pub t_end: f64,
    pub samples: usize,
    pub tolerances: Tolerances,
    /// Fixed step of the RK4 cell
    pub rk4_dt: f64,
}

impl Default for LorenzConfig {
    fn default() -> Self {
        Self {
            params: LorenzParameters::default(),
            initial: [1.0, 0.0, 0.0],
            t_start: 0.0,
            t_end: 100.0,
            samples: 10_001,
            tolerances: Tolerances::default(),
            rk4_dt: 1e-3,
        }
    }
}

impl LorenzConfig {
    pub fn initial_state(&self) -> State {
        State::from(self.initial)
    }

    pub fn grid(&self) -> Result<TimeGrid> {
        TimeGrid::linspace(self.t_start, self.t_end, self.samples)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub seed: u64,
    /// Timed runs per cell; the best is reported
    pub repeats: usize,
    pub pi: PiConfig,
    pub lorenz: LorenzConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            repeats: 3,
            pi: PiConfig::default(),
            lorenz: LorenzConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| KernelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repeats == 0 {
            return Err(KernelError::Config("repeats must be positive".to_string()));
        }
        if self.pi.trial_counts.iter().any(|&n| n == 0) {
            return Err(KernelError::ZeroTrials);
        }
        if !self.pi.radius.is_finite() || self.pi.radius <= 0.0 {
            return Err(KernelError::InvalidRadius(self.pi.radius));
        }
        if !self.lorenz.rk4_dt.is_finite() || self.lorenz.rk4_dt <= 0.0 {
            return Err(KernelError::InvalidTimeStep(self.lorenz.rk4_dt));
        }
        self.lorenz.tolerances.validate()?;
        self.lorenz.grid()?;
        Ok(())
    }
}
