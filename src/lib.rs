mod error;
pub use error::*;

mod lorenz;
pub use lorenz::*;

mod integrator;
pub use integrator::*;

mod monte_carlo;
pub use monte_carlo::*;

mod config;
pub use config::*;

mod timing;
pub use timing::*;

mod wasm;
pub use wasm::*;
