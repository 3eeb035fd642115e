//! Fixed-step integration of a derivative function into a [`Trajectory`].

use crate::params::ParameterSet;
use crate::solvers::{Method, SolverType};
use crate::traits::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Quotients `horizon / step` this close to an integer are treated as that
/// integer, so `0.3 / 0.1` covers four samples rather than three.
const STEP_COUNT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum IntegrateError<E> {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Derivative returned {got} components for a state of length {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Error raised by the derivative function, passed through as-is.
    #[error("Derivative evaluation failed")]
    Derivative(E),
}

impl<E> IntegrateError<E> {
    /// Returns the derivative function's own error, if that is what failed.
    pub fn into_derivative(self) -> Option<E> {
        match self {
            IntegrateError::Derivative(e) => Some(e),
            _ => None,
        }
    }
}

/// One sample of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub state: Vec<f64>,
}

/// Ordered `(t, state)` samples on an evenly spaced grid starting at `t = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub step: f64,
    pub samples: Vec<Sample>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a trajectory built by [`integrate`].
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.samples.first().map_or(0, |s| s.state.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.samples.last().map(|s| s.state.as_slice())
    }

    /// `(t, x_index)` pairs for a time plot of one component.
    pub fn component(&self, index: usize) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .filter_map(|s| s.state.get(index).map(|&v| [s.t, v]))
            .collect()
    }

    /// `(x_x, x_y)` pairs for a phase-plane plot.
    pub fn phase(&self, x: usize, y: usize) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .filter_map(|s| match (s.state.get(x), s.state.get(y)) {
                (Some(&a), Some(&b)) => Some([a, b]),
                _ => None,
            })
            .collect()
    }
}

/// Number of steps taken for `horizon` at `step`; the trajectory holds one
/// more sample than this.
pub fn step_count(step: f64, horizon: f64) -> usize {
    let ratio = horizon / step;
    let nearest = ratio.round();
    if (ratio - nearest).abs() <= STEP_COUNT_TOLERANCE * nearest.max(1.0) {
        nearest as usize
    } else {
        ratio.floor() as usize
    }
}

fn validate<E>(initial: &[f64], step: f64, horizon: f64) -> Result<(), IntegrateError<E>> {
    if initial.is_empty() {
        return Err(IntegrateError::InvalidArgument(
            "initial state must not be empty".to_string(),
        ));
    }
    if !step.is_finite() || step <= 0.0 {
        return Err(IntegrateError::InvalidArgument(format!(
            "step size must be positive and finite, got {step}"
        )));
    }
    if !horizon.is_finite() || horizon < 0.0 {
        return Err(IntegrateError::InvalidArgument(format!(
            "horizon must be non-negative and finite, got {horizon}"
        )));
    }
    if !(horizon / step).is_finite() || horizon / step >= usize::MAX as f64 {
        return Err(IntegrateError::InvalidArgument(format!(
            "horizon {horizon} with step {step} needs too many samples"
        )));
    }
    Ok(())
}

/// Integrates `f` with forward Euler from `initial` at `t = 0`.
pub fn integrate<D: Derivative + ?Sized>(
    initial: &[f64],
    f: &D,
    step: f64,
    horizon: f64,
    params: &ParameterSet,
) -> Result<Trajectory, IntegrateError<D::Error>> {
    integrate_with(Method::Euler, initial, f, step, horizon, params)
}

/// Integrates `f` with the chosen fixed-step `method`.
///
/// All argument checks happen before the first derivative evaluation. Values
/// returned by `f` are not checked for NaN or overflow.
pub fn integrate_with<D: Derivative + ?Sized>(
    method: Method,
    initial: &[f64],
    f: &D,
    step: f64,
    horizon: f64,
    params: &ParameterSet,
) -> Result<Trajectory, IntegrateError<D::Error>> {
    validate(initial, step, horizon)?;

    let steps = step_count(step, horizon);
    let dim = initial.len();
    debug!(?method, dim, step, horizon, steps, "integrating");

    let mut solver = SolverType::new(method, dim);
    let mut samples = Vec::new();
    steps
        .checked_add(1)
        .and_then(|count| samples.try_reserve_exact(count).ok())
        .ok_or_else(|| {
            IntegrateError::InvalidArgument(format!(
                "horizon {horizon} with step {step} needs too many samples ({steps} steps)"
            ))
        })?;
    samples.push(Sample {
        t: 0.0,
        state: initial.to_vec(),
    });

    for k in 0..steps {
        let t = k as f64 * step;
        let current = &samples[k].state;
        let next = solver.step(f, t, current, step, params)?;
        samples.push(Sample {
            t: (k + 1) as f64 * step,
            state: next,
        });
    }

    Ok(Trajectory { step, samples })
}
