use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// State vector [x, y, z] in Lorenz phase space
pub type State = Vector3<f64>;

/// Parameters for the Lorenz system
///
/// - σ (sigma): Prandtl number
/// - ρ (rho): Rayleigh number
/// - β (beta): geometric factor of the convection cell
///
/// Classical chaos occurs at σ=10, ρ=28, β=8/3
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorenzParameters {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Default for LorenzParameters {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
        }
    }
}

impl LorenzParameters {
    pub fn new(sigma: f64, rho: f64, beta: f64) -> Self {
        Self { sigma, rho, beta }
    }
}

/// Compute the Lorenz system derivatives
///
/// The Lorenz equations:
/// dx/dt = σ(y - x)                   [rate of convection]
/// dy/dt = x(ρ - z) - y               [horizontal temperature variation]
/// dz/dt = xy - βz                    [vertical temperature variation]
///
/// Mathematical Properties:
/// 1. Volume contraction: div(F) = -σ - 1 - β < 0 for the classical parameters
///    → phase-space volumes shrink exponentially
/// 2. Symmetry: (x, y, z) → (-x, -y, z) preserves the equations
/// 3. Each parameter enters exactly one component, linearly, so F is affine
///    in (σ, ρ, β) for a fixed state
/// 4. The origin is a fixed point for every parameter set
pub fn lorenz_derivatives(state: &State, params: &LorenzParameters) -> State {
    let (x, y, z) = (state.x, state.y, state.z);
    State::new(
        params.sigma * (y - x),
        x * (params.rho - z) - y,
        x * y - params.beta * z,
    )
}

/// Divergence of the flow, constant over phase space: -σ - 1 - β
pub fn divergence(params: &LorenzParameters) -> f64 {
    -params.sigma - 1.0 - params.beta
}

/// Fixed points of the Lorenz system
///
/// For ρ > 1 there are three: the origin and C± = (±√(β(ρ-1)), ±√(β(ρ-1)), ρ-1).
pub fn fixed_points(params: &LorenzParameters) -> Vec<State> {
    if params.rho <= 1.0 {
        vec![State::zeros()]
    } else {
        let c = (params.beta * (params.rho - 1.0)).sqrt();
        vec![
            State::zeros(),
            State::new(c, c, params.rho - 1.0),
            State::new(-c, -c, params.rho - 1.0),
        ]
    }
}

/// Right-hand side of an autonomous or time-dependent 3-d ODE.
pub trait VectorField {
    fn eval(&self, t: f64, state: &State) -> State;
}

impl<F> VectorField for F
where
    F: Fn(f64, &State) -> State,
{
    fn eval(&self, t: f64, state: &State) -> State {
        self(t, state)
    }
}

/// The Lorenz vector field bound to one parameter set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LorenzSystem {
    pub params: LorenzParameters,
}

impl LorenzSystem {
    pub fn new(params: LorenzParameters) -> Self {
        Self { params }
    }
}

impl VectorField for LorenzSystem {
    #[inline]
    fn eval(&self, _t: f64, state: &State) -> State {
        lorenz_derivatives(state, &self.params)
    }
}
