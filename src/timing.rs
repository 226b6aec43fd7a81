use std::time::{Duration, Instant};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Wall-clock timings of repeated runs of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub runs: usize,
    pub best: Duration,
    pub mean: Duration,
}

impl Timing {
    pub fn best_ms(&self) -> f64 {
        self.best.as_secs_f64() * 1000.0
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean.as_secs_f64() * 1000.0
    }
}

/// Run `cell` `repeats` times (at least once) and keep the last output.
pub fn time_cell<T, F>(repeats: usize, mut cell: F) -> Result<(T, Timing)>
where
    F: FnMut() -> Result<T>,
{
    let runs = repeats.max(1);
    let mut measure = || -> Result<(T, Duration)> {
        let start = Instant::now();
        let value = cell()?;
        Ok((value, start.elapsed()))
    };

    let (mut output, first) = measure()?;
    let mut best = first;
    let mut total = first;

    for _ in 1..runs {
        let (value, elapsed) = measure()?;
        best = best.min(elapsed);
        total += elapsed;
        output = value;
    }

    let timing = Timing {
        runs,
        best,
        mean: total / runs as u32,
    };
    Ok((output, timing))
}

/// One printed benchmark line, also emitted as JSON on request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub section: String,
    pub cell: String,
    pub runs: usize,
    pub best_ms: f64,
    pub mean_ms: f64,
    pub result: serde_json::Value,
}

impl BenchmarkRecord {
    /// A result that fails to serialize is recorded as `null` with a warning.
    pub fn new<R: Serialize>(section: &str, cell: &str, timing: &Timing, result: &R) -> Self {
        let result = serde_json::to_value(result).unwrap_or_else(|e| {
            warn!("{}/{}: could not serialize result: {}", section, cell, e);
            serde_json::Value::Null
        });
        Self {
            section: section.to_string(),
            cell: cell.to_string(),
            runs: timing.runs,
            best_ms: timing.best_ms(),
            mean_ms: timing.mean_ms(),
            result,
        }
    }
}
