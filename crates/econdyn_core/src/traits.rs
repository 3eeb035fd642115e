use crate::params::ParameterSet;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Vector field with its parameters already bound.
///
/// Used wherever the same system has to be evaluated on both `f64` and
/// `Dual` (Jacobians, fixed points, nullclines).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates dx/dt at (t, x) into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// The derivative capability consumed by the integrator.
///
/// Maps `(state, time, parameters)` to a fresh derivative vector of the same
/// length as `state`. Failures are reported with the implementor's own error
/// type and reach the integrator's caller untouched.
pub trait Derivative {
    type Error;

    /// Names of the parameters this function reads. An empty slice means the
    /// function does not declare them, and any parameter set is accepted.
    fn parameter_names(&self) -> &[String] {
        &[]
    }

    fn derivative(
        &self,
        state: &[f64],
        t: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, Self::Error>;
}

impl<F, E> Derivative for F
where
    F: Fn(&[f64], f64, &ParameterSet) -> Result<Vec<f64>, E>,
{
    type Error = E;

    fn derivative(&self, state: &[f64], t: f64, params: &ParameterSet) -> Result<Vec<f64>, E> {
        self(state, t, params)
    }
}
