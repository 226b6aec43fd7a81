use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::lorenz::{State, VectorField};

/// Ordered sample times at which a solver reports the state.
///
/// Times are finite and non-decreasing; the first entry is the time of the
/// initial condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TimeGrid {
    times: Vec<f64>,
}

impl TryFrom<Vec<f64>> for TimeGrid {
    type Error = KernelError;

    fn try_from(times: Vec<f64>) -> Result<Self> {
        Self::new(times)
    }
}

impl From<TimeGrid> for Vec<f64> {
    fn from(grid: TimeGrid) -> Self {
        grid.times
    }
}

impl TimeGrid {
    pub fn new(times: Vec<f64>) -> Result<Self> {
        if times.is_empty() {
            return Err(KernelError::InvalidTimeGrid("grid is empty".to_string()));
        }
        if let Some(t) = times.iter().find(|t| !t.is_finite()) {
            return Err(KernelError::InvalidTimeGrid(format!(
                "non-finite sample time {}",
                t
            )));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(KernelError::InvalidTimeGrid(format!(
                "time {} at index {} precedes {}",
                times[i + 1],
                i + 1,
                times[i]
            )));
        }
        Ok(Self { times })
    }

    /// `n` evenly spaced samples covering `[t0, t1]`, both ends included.
    pub fn linspace(t0: f64, t1: f64, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(KernelError::InvalidTimeGrid("zero samples".to_string()));
        }
        if n == 1 {
            return Self::new(vec![t0]);
        }
        let step = (t1 - t0) / (n - 1) as f64;
        let mut times: Vec<f64> = (0..n).map(|i| t0 + step * i as f64).collect();
        times[n - 1] = t1;
        Self::new(times)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn span(&self) -> (f64, f64) {
        (self.times[0], self.times[self.times.len() - 1])
    }
}

/// Absolute and relative error bounds for adaptive integration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub abs: f64,
    pub rel: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-8,
            rel: 1e-8,
        }
    }
}

impl Tolerances {
    pub fn new(abs: f64, rel: f64) -> Result<Self> {
        let tol = Self { abs, rel };
        tol.validate()?;
        Ok(tol)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.abs) && ok(self.rel) {
            Ok(())
        } else {
            Err(KernelError::InvalidTolerance {
                abs: self.abs,
                rel: self.rel,
            })
        }
    }

    /// Per-component error scale `abs + rel * max(|a|, |b|)`
    fn scale(&self, a: &State, b: &State) -> State {
        a.zip_map(b, |ai, bi| self.abs + self.rel * ai.abs().max(bi.abs()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    pub rhs_evals: usize,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
}

/// States reported at each time of a [`TimeGrid`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<State>,
    pub stats: SolverStats,
}

/// Compact description of a trajectory for console output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub samples: usize,
    pub final_time: f64,
    pub final_state: State,
    pub min: State,
    pub max: State,
}

impl Trajectory {
    fn with_capacity(n: usize) -> Self {
        Self {
            times: Vec::with_capacity(n),
            states: Vec::with_capacity(n),
            stats: SolverStats::default(),
        }
    }

    fn push(&mut self, t: f64, state: State) {
        self.times.push(t);
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn final_state(&self) -> Option<&State> {
        self.states.last()
    }

    pub fn summary(&self) -> Option<TrajectorySummary> {
        let first = *self.states.first()?;
        let (min, max) = self.states.iter().fold((first, first), |(lo, hi), s| {
            (lo.inf(s), hi.sup(s))
        });
        Some(TrajectorySummary {
            samples: self.states.len(),
            final_time: *self.times.last()?,
            final_state: *self.states.last()?,
            min,
            max,
        })
    }
}

fn check_finite(t: f64, state: &State) -> Result<()> {
    if state.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(KernelError::NonFinite { t })
    }
}

/// Runge-Kutta 4th order integrator with a fixed step
///
/// k1 = f(t, y)
/// k2 = f(t + h/2, y + h/2 * k1)
/// k3 = f(t + h/2, y + h/2 * k2)
/// k4 = f(t + h, y + h * k3)
///
/// y_{n+1} = y_n + h/6 * (k1 + 2k2 + 2k3 + k4)
pub struct Rk4Integrator<F> {
    pub field: F,
    pub dt: f64,
}

impl<F: VectorField> Rk4Integrator<F> {
    pub fn new(field: F, dt: f64) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(KernelError::InvalidTimeStep(dt));
        }
        Ok(Self { field, dt })
    }

    /// One RK4 step of length `h` from `(t, state)`
    pub fn step(&self, t: f64, state: &State, h: f64) -> State {
        let f = &self.field;
        let half = 0.5 * h;

        let k1 = f.eval(t, state);
        let k2 = f.eval(t + half, &(state + half * k1));
        let k3 = f.eval(t + half, &(state + half * k2));
        let k4 = f.eval(t + h, &(state + h * k3));

        state + (h / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
    }

    /// Integrate from `initial` at the first grid time, reporting the state at
    /// every grid time. The step before each sample is shortened to land on it.
    pub fn integrate(&self, initial: State, grid: &TimeGrid) -> Result<Trajectory> {
        let times = grid.times();
        let mut trajectory = Trajectory::with_capacity(times.len());
        let mut t = times[0];
        let mut state = initial;

        check_finite(t, &state)?;
        trajectory.push(t, state);

        for &target in &times[1..] {
            while t < target {
                let remaining = target - t;
                let last = remaining <= self.dt;
                let h = if last { remaining } else { self.dt };
                if !last && t + h == t {
                    return Err(KernelError::StepSizeUnderflow { t, h });
                }

                state = self.step(t, &state, h);
                trajectory.stats.rhs_evals += 4;
                trajectory.stats.accepted_steps += 1;

                t = if last { target } else { t + h };
                check_finite(t, &state)?;
            }
            trajectory.push(target, state);
        }

        debug!(
            "rk4: {} samples, {} steps (dt={})",
            trajectory.len(),
            trajectory.stats.accepted_steps,
            self.dt
        );
        Ok(trajectory)
    }
}

// Dormand-Prince 5(4) tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// difference between the 5th and embedded 4th order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

fn rms(v: &State) -> f64 {
    (v.norm_squared() / 3.0).sqrt()
}

/// Adaptive Dormand-Prince 5(4) solver
///
/// Step sizes follow the usual controller `h * 0.9 * err^(-1/5)`, clamped to
/// [0.2, 10]. Accepted steps reuse the last stage as the next first stage.
pub struct Dopri5<F> {
    pub field: F,
    pub tolerances: Tolerances,
    pub max_steps: usize,
    /// Initial step; estimated from the field when `None`
    pub initial_step: Option<f64>,
}

impl<F: VectorField> Dopri5<F> {
    pub const DEFAULT_MAX_STEPS: usize = 500_000;

    pub fn new(field: F, tolerances: Tolerances) -> Result<Self> {
        tolerances.validate()?;
        Ok(Self {
            field,
            tolerances,
            max_steps: Self::DEFAULT_MAX_STEPS,
            initial_step: None,
        })
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_initial_step(mut self, h: f64) -> Self {
        self.initial_step = Some(h);
        self
    }

    fn estimate_initial_step(&self, t: f64, y: &State, f0: &State, stats: &mut SolverStats) -> f64 {
        let sc = self.tolerances.scale(y, y);
        let d0 = rms(&y.component_div(&sc));
        let d1 = rms(&f0.component_div(&sc));

        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };

        let y1 = y + h0 * f0;
        let f1 = self.field.eval(t + h0, &y1);
        stats.rhs_evals += 1;
        let d2 = rms(&(f1 - f0).component_div(&sc)) / h0;

        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };

        (100.0 * h0).min(h1)
    }

    /// Integrate from `initial` at the first grid time, reporting the state at
    /// every grid time. Steps are clipped so that each sample time is hit.
    pub fn integrate(&self, initial: State, grid: &TimeGrid) -> Result<Trajectory> {
        let times = grid.times();
        let (t0, t_end) = grid.span();
        let mut trajectory = Trajectory::with_capacity(times.len());
        let mut t = t0;
        let mut y = initial;

        check_finite(t, &y)?;
        trajectory.push(t, y);
        if t_end <= t0 {
            for &target in &times[1..] {
                trajectory.push(target, y);
            }
            return Ok(trajectory);
        }

        let mut k1 = self.field.eval(t, &y);
        trajectory.stats.rhs_evals += 1;

        let mut h = match self.initial_step {
            Some(h) => h,
            None => self.estimate_initial_step(t, &y, &k1, &mut trajectory.stats),
        };
        if !h.is_finite() || h <= 0.0 {
            return Err(KernelError::InvalidTimeStep(h));
        }
        h = h.min(t_end - t0);

        let mut rejected_last = false;

        for &target in &times[1..] {
            while t < target {
                let stats = &mut trajectory.stats;
                if stats.accepted_steps + stats.rejected_steps >= self.max_steps {
                    return Err(KernelError::MaxStepsExceeded {
                        t,
                        steps: self.max_steps,
                    });
                }
                let min_step = 16.0 * f64::EPSILON * t.abs().max(1.0);
                if h < min_step {
                    return Err(KernelError::StepSizeUnderflow { t, h });
                }

                let remaining = target - t;
                let clipped = h >= remaining;
                let h_try = if clipped { remaining } else { h };

                let f = &self.field;
                let k2 = f.eval(t + C2 * h_try, &(y + h_try * (A21 * k1)));
                let k3 = f.eval(t + C3 * h_try, &(y + h_try * (A31 * k1 + A32 * k2)));
                let k4 = f.eval(
                    t + C4 * h_try,
                    &(y + h_try * (A41 * k1 + A42 * k2 + A43 * k3)),
                );
                let k5 = f.eval(
                    t + C5 * h_try,
                    &(y + h_try * (A51 * k1 + A52 * k2 + A53 * k3 + A54 * k4)),
                );
                let k6 = f.eval(
                    t + h_try,
                    &(y + h_try * (A61 * k1 + A62 * k2 + A63 * k3 + A64 * k4 + A65 * k5)),
                );
                let y_new = y + h_try * (A71 * k1 + A73 * k3 + A74 * k4 + A75 * k5 + A76 * k6);
                let k7 = f.eval(t + h_try, &y_new);
                stats.rhs_evals += 6;

                let err = h_try * (E1 * k1 + E3 * k3 + E4 * k4 + E5 * k5 + E6 * k6 + E7 * k7);
                let sc = self.tolerances.scale(&y, &y_new);
                let err_norm = rms(&err.component_div(&sc));

                if !err_norm.is_finite() {
                    // usually a blow-up inside the step; retry much smaller
                    stats.rejected_steps += 1;
                    rejected_last = true;
                    h = h_try * MIN_FACTOR;
                    continue;
                }

                if err_norm <= 1.0 {
                    let mut factor = if err_norm == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                    };
                    if rejected_last {
                        factor = factor.min(1.0);
                    }

                    t = if clipped { target } else { t + h_try };
                    y = y_new;
                    k1 = k7;
                    stats.accepted_steps += 1;
                    rejected_last = false;
                    check_finite(t, &y)?;

                    let proposal = h_try * factor;
                    h = if clipped { h.max(proposal) } else { proposal };
                } else {
                    stats.rejected_steps += 1;
                    rejected_last = true;
                    h = h_try * (SAFETY * err_norm.powf(-0.2)).max(MIN_FACTOR);
                    trace!("dopri5: rejected step at t={} (err={:.3e})", t, err_norm);
                }
            }
            trajectory.push(target, y);
        }

        debug!(
            "dopri5: {} samples, {} accepted, {} rejected, {} rhs evals",
            trajectory.len(),
            trajectory.stats.accepted_steps,
            trajectory.stats.rejected_steps,
            trajectory.stats.rhs_evals
        );
        Ok(trajectory)
    }
}

/// Integrate `field` from `initial` over `grid` with the adaptive solver.
pub fn solve<F: VectorField>(
    field: F,
    initial: State,
    grid: &TimeGrid,
    tolerances: Tolerances,
) -> Result<Trajectory> {
    Dopri5::new(field, tolerances)?.integrate(initial, grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorenz::{LorenzParameters, LorenzSystem};

    fn decay(_t: f64, s: &State) -> State {
        -s
    }

    #[test]
    fn test_grid_rejects_decreasing_times() {
        assert!(TimeGrid::new(vec![0.0, 1.0, 0.5]).is_err());
        assert!(TimeGrid::new(vec![]).is_err());
        assert!(TimeGrid::new(vec![0.0, f64::NAN]).is_err());
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_grid_deserialization_validates() {
        assert!(serde_json::from_str::<TimeGrid>("[]").is_err());
        assert!(serde_json::from_str::<TimeGrid>("[1.0, 0.0]").is_err());

        let grid: TimeGrid = serde_json::from_str("[0.0, 0.5, 1.0]").unwrap();
        assert_eq!(grid.span(), (0.0, 1.0));
        assert_eq!(serde_json::to_string(&grid).unwrap(), "[0.0,0.5,1.0]");
    }

    #[test]
    fn test_rk4_reports_step_that_cannot_advance() {
        let rk4 = Rk4Integrator::new(decay, 1e-3).unwrap();
        let grid = TimeGrid::new(vec![1e17, 1e17 + 1e3]).unwrap();

        match rk4.integrate(State::new(1.0, 0.0, 0.0), &grid) {
            Err(KernelError::StepSizeUnderflow { h, .. }) => assert_eq!(h, 1e-3),
            other => panic!("expected StepSizeUnderflow, got {:?}", other),
        }
    }

    #[test]
    fn test_linspace_endpoints() {
        let grid = TimeGrid::linspace(0.0, 10.0, 7).unwrap();
        assert_eq!(grid.len(), 7);
        assert_eq!(grid.span(), (0.0, 10.0));
        assert!(TimeGrid::linspace(0.0, 1.0, 0).is_err());
        assert!(TimeGrid::linspace(1.0, 0.0, 3).is_err());
    }

    #[test]
    fn test_tolerances_validated() {
        assert!(Tolerances::new(1e-6, 1e-6).is_ok());
        assert!(Tolerances::new(0.0, 1e-6).is_err());
        assert!(Tolerances::new(1e-6, f64::INFINITY).is_err());
    }

    #[test]
    fn test_rk4_rejects_bad_step() {
        assert!(Rk4Integrator::new(decay, 0.0).is_err());
        assert!(Rk4Integrator::new(decay, -0.1).is_err());
    }

    #[test]
    fn test_rk4_exponential_decay() {
        let rk4 = Rk4Integrator::new(decay, 1e-3).unwrap();
        let grid = TimeGrid::linspace(0.0, 2.0, 5).unwrap();
        let traj = rk4.integrate(State::new(1.0, 2.0, -3.0), &grid).unwrap();

        for (t, s) in traj.times.iter().zip(&traj.states) {
            let expected = State::new(1.0, 2.0, -3.0) * (-t).exp();
            assert!((s - expected).norm() < 1e-10, "t={} got {:?}", t, s);
        }
    }

    #[test]
    fn test_dopri5_exponential_decay() {
        let grid = TimeGrid::linspace(0.0, 3.0, 31).unwrap();
        let tol = Tolerances::new(1e-12, 1e-12).unwrap();
        let traj = solve(decay, State::new(1.0, 1.0, 1.0), &grid, tol).unwrap();

        assert_eq!(traj.len(), 31);
        for (t, s) in traj.times.iter().zip(&traj.states) {
            assert!((s.x - (-t).exp()).abs() < 1e-9, "t={} got {}", t, s.x);
        }
    }

    #[test]
    fn test_grid_times_hit_exactly() {
        let grid = TimeGrid::new(vec![0.0, 0.1, 0.1, 0.37, 1.0]).unwrap();
        let system = LorenzSystem::default();
        let traj = solve(system, State::new(1.0, 1.0, 1.0), &grid, Tolerances::default()).unwrap();

        assert_eq!(traj.times, grid.times().to_vec());
        assert_eq!(traj.states[1], traj.states[2]);
    }

    #[test]
    fn test_dopri5_matches_fine_rk4_on_lorenz() {
        let system = LorenzSystem::new(LorenzParameters::default());
        let grid = TimeGrid::linspace(0.0, 1.0, 11).unwrap();
        let initial = State::new(1.0, 1.0, 1.0);

        let rk4 = Rk4Integrator::new(system, 1e-4).unwrap();
        let reference = rk4.integrate(initial, &grid).unwrap();
        let adaptive = solve(system, initial, &grid, Tolerances::new(1e-10, 1e-10).unwrap()).unwrap();

        for (a, b) in reference.states.iter().zip(&adaptive.states) {
            assert!((a - b).norm() < 1e-6, "rk4 {:?} vs dopri5 {:?}", a, b);
        }
    }

    #[test]
    fn test_solver_is_deterministic() {
        let system = LorenzSystem::default();
        let grid = TimeGrid::linspace(0.0, 30.0, 3001).unwrap();
        let initial = State::new(1.0, 0.0, 0.0);

        let a = solve(system, initial, &grid, Tolerances::default()).unwrap();
        let b = solve(system, initial, &grid, Tolerances::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lorenz_stays_on_attractor() {
        let system = LorenzSystem::default();
        let grid = TimeGrid::linspace(0.0, 20.0, 2001).unwrap();
        let traj = solve(system, State::new(1.0, 1.0, 1.0), &grid, Tolerances::default()).unwrap();

        for state in &traj.states {
            assert!(state.norm() < 100.0);
        }
        let summary = traj.summary().unwrap();
        assert_eq!(summary.samples, 2001);
        assert!(summary.min.x < 0.0 && summary.max.x > 0.0);
        assert!(summary.max.z > 10.0);
    }

    #[test]
    fn test_max_steps_guard() {
        let system = LorenzSystem::default();
        let grid = TimeGrid::linspace(0.0, 100.0, 2).unwrap();
        let solver = Dopri5::new(system, Tolerances::default())
            .unwrap()
            .with_max_steps(10);

        match solver.integrate(State::new(1.0, 1.0, 1.0), &grid) {
            Err(KernelError::MaxStepsExceeded { steps, .. }) => assert_eq!(steps, 10),
            other => panic!("expected MaxStepsExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_blow_up_is_reported() {
        // y' = y^2 with y(0) = 1 blows up at t = 1
        let field = |_t: f64, s: &State| s.component_mul(s);
        let grid = TimeGrid::linspace(0.0, 2.0, 3).unwrap();
        let result = solve(field, State::new(1.0, 0.0, 0.0), &grid, Tolerances::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_single_point_grid() {
        let grid = TimeGrid::new(vec![5.0]).unwrap();
        let traj = solve(decay, State::new(2.0, 0.0, 0.0), &grid, Tolerances::default()).unwrap();
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.stats.rhs_evals, 0);
    }
}
