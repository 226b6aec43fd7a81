use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::error::{KernelError, Result};
use crate::integrator::{solve, SolverStats, TimeGrid, Tolerances, TrajectorySummary};
use crate::lorenz::{lorenz_derivatives, LorenzParameters, LorenzSystem, State};
use crate::monte_carlo::estimate_pi_naive;

fn to_js(e: KernelError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Naive π estimate, the same loop the native cells time
#[wasm_bindgen(js_name = estimatePi)]
pub fn estimate_pi(trials: u32, radius: f64, seed: u32) -> std::result::Result<f64, JsValue> {
    let mut rng = StdRng::seed_from_u64(seed as u64);
    estimate_pi_naive(trials as u64, radius, &mut rng)
        .map(|est| est.estimate)
        .map_err(to_js)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LorenzRunJS {
    pub summary: TrajectorySummary,
    pub stats: SolverStats,
    pub times: Vec<f64>,
    pub points: Vec<(f64, f64, f64)>,
}

#[wasm_bindgen]
pub struct LorenzSolverWasm {
    system: LorenzSystem,
    tolerances: Tolerances,
}

impl LorenzSolverWasm {
    fn run(
        &self,
        initial: State,
        t0: f64,
        t1: f64,
        samples: usize,
    ) -> Result<LorenzRunJS> {
        let grid = TimeGrid::linspace(t0, t1, samples)?;
        let trajectory = solve(self.system, initial, &grid, self.tolerances)?;
        let summary = trajectory
            .summary()
            .ok_or_else(|| KernelError::InvalidTimeGrid("empty trajectory".to_string()))?;

        Ok(LorenzRunJS {
            summary,
            stats: trajectory.stats,
            points: trajectory.states.iter().map(|s| (s.x, s.y, s.z)).collect(),
            times: trajectory.times,
        })
    }
}

#[wasm_bindgen]
impl LorenzSolverWasm {
    #[wasm_bindgen(constructor)]
    pub fn new(
        sigma: f64,
        rho: f64,
        beta: f64,
        abs_tol: f64,
        rel_tol: f64,
    ) -> std::result::Result<LorenzSolverWasm, JsValue> {
        console_error_panic_hook::set_once();

        let tolerances = Tolerances::new(abs_tol, rel_tol).map_err(to_js)?;
        Ok(Self {
            system: LorenzSystem::new(LorenzParameters::new(sigma, rho, beta)),
            tolerances,
        })
    }

    #[wasm_bindgen]
    pub fn derivative(&self, x: f64, y: f64, z: f64) -> Vec<f64> {
        let d = lorenz_derivatives(&State::new(x, y, z), &self.system.params);
        vec![d.x, d.y, d.z]
    }

    #[wasm_bindgen]
    pub fn integrate(
        &self,
        x0: f64,
        y0: f64,
        z0: f64,
        t0: f64,
        t1: f64,
        samples: usize,
    ) -> std::result::Result<JsValue, JsValue> {
        let run = self
            .run(State::new(x0, y0, z0), t0, t1, samples)
            .map_err(to_js)?;

        serde_wasm_bindgen::to_value(&run)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> LorenzSolverWasm {
        LorenzSolverWasm {
            system: LorenzSystem::default(),
            tolerances: Tolerances::default(),
        }
    }

    #[test]
    fn test_derivative_matches_field() {
        let d = solver().derivative(1.0, 2.0, 3.0);
        assert_eq!(d.len(), 3);
        assert!((d[0] - 10.0).abs() < 1e-12);
        assert!((d[1] - 23.0).abs() < 1e-12);
    }

    #[test]
    fn test_run_reports_every_sample() {
        let run = solver().run(State::new(1.0, 1.0, 1.0), 0.0, 5.0, 51).unwrap();
        assert_eq!(run.points.len(), 51);
        assert_eq!(run.times.len(), 51);
        assert_eq!(run.summary.samples, 51);
        assert_eq!(run.points[0], (1.0, 1.0, 1.0));
        assert!(run.stats.accepted_steps > 0);
    }

    #[test]
    fn test_run_rejects_bad_grid() {
        assert!(solver().run(State::zeros(), 0.0, 1.0, 0).is_err());
    }
}
