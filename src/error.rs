use thiserror::Error;

/// Errors raised by the numerical kernels and the benchmark configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("trial count must be positive")]
    ZeroTrials,

    #[error("radius must be finite and positive, got {0}")]
    InvalidRadius(f64),

    #[error("time step must be finite and positive, got {0}")]
    InvalidTimeStep(f64),

    #[error("tolerances must be finite and positive (abs={abs}, rel={rel})")]
    InvalidTolerance { abs: f64, rel: f64 },

    #[error("invalid time grid: {0}")]
    InvalidTimeGrid(String),

    #[error("state became non-finite at t={t}")]
    NonFinite { t: f64 },

    #[error("step size underflow at t={t} (h={h:e})")]
    StepSizeUnderflow { t: f64, h: f64 },

    #[error("exceeded {steps} steps at t={t}")]
    MaxStepsExceeded { t: f64, steps: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
