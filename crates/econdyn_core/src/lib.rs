//! The `econdyn_core` crate is the numerical engine behind the econdyn CLI and
//! the browser sliders. Everything is generic over the derivative function, so
//! hand-written closures and text-defined models go through the same paths.
//!
//! Key components:
//! - **Integrator**: fixed-step Euler (and RK4) producing a sampled `Trajectory`.
//! - **Sweep**: the slider harness. Clamps parameter changes, recomputes and renders.
//! - **Equation Engine**: a small bytecode VM for model equations typed as text.
//! - **Equilibrium / Phase**: Newton fixed points with stability, nullclines and
//!   vector fields for phase diagrams, using dual-number Jacobians.
//! - **Config**: JSON and TOML scenario files.
pub mod autodiff;
pub mod config;
pub mod equation_engine;
pub mod equilibrium;
pub mod integrator;
pub mod models;
pub mod params;
pub mod phase;
pub mod render;
pub mod solvers;
pub mod sweep;
pub mod traits;

pub use integrator::{integrate, integrate_with, IntegrateError, Sample, Trajectory};
pub use params::{ParameterDescriptor, ParameterError, ParameterSet};
pub use render::{Plot, Renderer, Series};
pub use solvers::Method;
pub use sweep::{ParameterChange, Sweep, SweepConfig, SweepError, View};
pub use traits::Derivative;
