use log::debug;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Number of draws buffered at once by the vectorized estimator
pub const BATCH_SIZE: u64 = 1 << 16;

/// Trials handled by one parallel work item
pub const CHUNK_SIZE: u64 = 1 << 18;

/// Result of one Monte Carlo π estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiEstimate {
    pub estimate: f64,
    pub trials: u64,
    pub hits: u64,
    /// One-sigma standard error of `estimate`
    pub std_error: f64,
}

impl PiEstimate {
    pub(crate) fn from_hits(hits: u64, trials: u64) -> Self {
        let n = trials as f64;
        let p = hits as f64 / n;
        Self {
            estimate: 4.0 * p,
            trials,
            hits,
            std_error: 4.0 * (p * (1.0 - p) / n).sqrt(),
        }
    }

    pub fn error(&self) -> f64 {
        (self.estimate - std::f64::consts::PI).abs()
    }
}

/// Which estimator a benchmark cell runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiMethod {
    Naive,
    Vectorized,
    Parallel,
}

impl PiMethod {
    pub const ALL: [PiMethod; 3] = [PiMethod::Naive, PiMethod::Vectorized, PiMethod::Parallel];

    pub fn name(&self) -> &'static str {
        match self {
            PiMethod::Naive => "naive",
            PiMethod::Vectorized => "vectorized",
            PiMethod::Parallel => "parallel",
        }
    }

    pub fn run(&self, trials: u64, radius: f64, seed: u64) -> Result<PiEstimate> {
        match self {
            PiMethod::Naive => estimate_pi_naive(trials, radius, &mut StdRng::seed_from_u64(seed)),
            PiMethod::Vectorized => {
                estimate_pi_vectorized(trials, radius, &mut StdRng::seed_from_u64(seed))
            }
            PiMethod::Parallel => estimate_pi_parallel(trials, radius, seed),
        }
    }
}

fn validate(trials: u64, radius: f64) -> Result<()> {
    if trials == 0 {
        return Err(KernelError::ZeroTrials);
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(KernelError::InvalidRadius(radius));
    }
    Ok(())
}

/// Map a uniform draw in [0, 1) onto [-1, 1)
///
/// The hit fraction is independent of the radius, so points are tested in
/// unit coordinates and the radius is only validated.
#[inline]
fn to_unit_square(u: f64) -> f64 {
    2.0 * u - 1.0
}

fn count_hits<R: Rng + ?Sized>(trials: u64, rng: &mut R) -> u64 {
    let mut hits = 0;
    for _ in 0..trials {
        let x = to_unit_square(rng.gen::<f64>());
        let y = to_unit_square(rng.gen::<f64>());
        if x * x + y * y <= 1.0 {
            hits += 1;
        }
    }
    hits
}

/// Estimate π one point at a time
///
/// Points are drawn uniformly in the square [-r, r)², and the fraction that
/// falls inside the inscribed circle approximates π/4. The test runs on the
/// square rescaled to [-1, 1)².
pub fn estimate_pi_naive<R: Rng + ?Sized>(
    trials: u64,
    radius: f64,
    rng: &mut R,
) -> Result<PiEstimate> {
    validate(trials, radius)?;
    let hits = count_hits(trials, rng);
    Ok(PiEstimate::from_hits(hits, trials))
}

/// Estimate π by filling whole coordinate buffers before counting
pub fn estimate_pi_vectorized<R: Rng + ?Sized>(
    trials: u64,
    radius: f64,
    rng: &mut R,
) -> Result<PiEstimate> {
    validate(trials, radius)?;
    let mut hits = 0u64;
    let mut remaining = trials;

    while remaining > 0 {
        let n = BATCH_SIZE.min(remaining) as usize;
        let xs = DVector::from_fn(n, |_, _| to_unit_square(rng.gen::<f64>()));
        let ys = DVector::from_fn(n, |_, _| to_unit_square(rng.gen::<f64>()));

        let dist2 = xs.component_mul(&xs) + ys.component_mul(&ys);
        hits += dist2.iter().filter(|&&d| d <= 1.0).count() as u64;
        remaining -= n as u64;
    }

    Ok(PiEstimate::from_hits(hits, trials))
}

fn chunk_seed(seed: u64, chunk: u64) -> u64 {
    seed ^ (chunk + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Estimate π across the rayon pool
///
/// Work is split into fixed chunks with independently seeded generators, so
/// the result depends on `seed` only and not on the number of threads.
pub fn estimate_pi_parallel(trials: u64, radius: f64, seed: u64) -> Result<PiEstimate> {
    validate(trials, radius)?;
    let chunks = trials.div_ceil(CHUNK_SIZE);
    debug!(
        "parallel pi: {} trials in {} chunks on {} threads",
        trials,
        chunks,
        rayon::current_num_threads()
    );

    let hits: u64 = (0..chunks)
        .into_par_iter()
        .map(|chunk| {
            let n = CHUNK_SIZE.min(trials - chunk * CHUNK_SIZE);
            let mut rng = StdRng::seed_from_u64(chunk_seed(seed, chunk));
            count_hits(n, &mut rng)
        })
        .sum();

    Ok(PiEstimate::from_hits(hits, trials))
}
