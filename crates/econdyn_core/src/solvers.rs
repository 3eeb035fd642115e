use crate::integrator::IntegrateError;
use crate::params::ParameterSet;
use crate::traits::Derivative;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A fixed-step scheme that produces the next state from the current one.
///
/// Steppers never mutate the incoming state; each call returns a new vector.
pub trait Stepper {
    fn step<D: Derivative + ?Sized>(
        &mut self,
        f: &D,
        t: f64,
        state: &[f64],
        dt: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, IntegrateError<D::Error>>;
}

/// Integration scheme selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// First-order forward Euler.
    #[default]
    Euler,
    /// Classic Runge-Kutta 4th order.
    Rk4,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euler" => Ok(Method::Euler),
            "rk4" => Ok(Method::Rk4),
            other => Err(format!("Unknown method: {other}")),
        }
    }
}

fn evaluate<D: Derivative + ?Sized>(
    f: &D,
    state: &[f64],
    t: f64,
    params: &ParameterSet,
) -> Result<Vec<f64>, IntegrateError<D::Error>> {
    let k = f
        .derivative(state, t, params)
        .map_err(IntegrateError::Derivative)?;
    if k.len() != state.len() {
        return Err(IntegrateError::DimensionMismatch {
            expected: state.len(),
            got: k.len(),
        });
    }
    Ok(k)
}

/// x_{n+1} = x_n + dt * f(x_n, t_n)
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardEuler;

impl Stepper for ForwardEuler {
    fn step<D: Derivative + ?Sized>(
        &mut self,
        f: &D,
        t: f64,
        state: &[f64],
        dt: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, IntegrateError<D::Error>> {
        let k = evaluate(f, state, t, params)?;
        Ok(state.iter().zip(&k).map(|(x, dx)| x + dt * dx).collect())
    }
}

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Clone, Default)]
pub struct Rk4 {
    tmp: Vec<f64>,
}

impl Rk4 {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![0.0; dim],
        }
    }

    fn offset(&mut self, state: &[f64], k: &[f64], scale: f64) -> &[f64] {
        self.tmp.clear();
        self.tmp
            .extend(state.iter().zip(k).map(|(x, dx)| x + scale * dx));
        &self.tmp
    }
}

impl Stepper for Rk4 {
    fn step<D: Derivative + ?Sized>(
        &mut self,
        f: &D,
        t: f64,
        state: &[f64],
        dt: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, IntegrateError<D::Error>> {
        let half = 0.5 * dt;

        // k1 = f(t, y)
        let k1 = evaluate(f, state, t, params)?;
        // k2 = f(t + dt/2, y + dt*k1/2)
        let k2 = evaluate(f, self.offset(state, &k1, half), t + half, params)?;
        // k3 = f(t + dt/2, y + dt*k2/2)
        let k3 = evaluate(f, self.offset(state, &k2, half), t + half, params)?;
        // k4 = f(t + dt, y + dt*k3)
        let k4 = evaluate(f, self.offset(state, &k3, dt), t + dt, params)?;

        let sixth = dt / 6.0;
        Ok((0..state.len())
            .map(|i| state[i] + sixth * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
            .collect())
    }
}

pub(crate) enum SolverType {
    Euler(ForwardEuler),
    Rk4(Rk4),
}

impl SolverType {
    pub(crate) fn new(method: Method, dim: usize) -> Self {
        match method {
            Method::Euler => SolverType::Euler(ForwardEuler),
            Method::Rk4 => SolverType::Rk4(Rk4::new(dim)),
        }
    }

    pub(crate) fn step<D: Derivative + ?Sized>(
        &mut self,
        f: &D,
        t: f64,
        state: &[f64],
        dt: f64,
        params: &ParameterSet,
    ) -> Result<Vec<f64>, IntegrateError<D::Error>> {
        match self {
            SolverType::Euler(s) => s.step(f, t, state, dt, params),
            SolverType::Rk4(s) => s.step(f, t, state, dt, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn linear(rate: f64) -> impl Fn(&[f64], f64, &ParameterSet) -> Result<Vec<f64>, Infallible> {
        move |x: &[f64], _t: f64, _p: &ParameterSet| Ok(x.iter().map(|v| rate * v).collect())
    }

    #[test]
    fn euler_step_matches_hand_computation() {
        let f = linear(-2.0);
        let next = ForwardEuler
            .step(&f, 0.0, &[1.0, 3.0], 0.1, &ParameterSet::new())
            .expect("step should succeed");
        assert!((next[0] - 0.8).abs() < 1e-12);
        assert!((next[1] - 2.4).abs() < 1e-12);
    }

    #[test]
    fn rk4_step_is_fourth_order_accurate() {
        let f = linear(-1.0);
        let dt = 0.1;
        let next = Rk4::new(1)
            .step(&f, 0.0, &[1.0], dt, &ParameterSet::new())
            .expect("step should succeed");
        let exact = (-dt).exp();
        assert!((next[0] - exact).abs() < 1e-6, "got {}", next[0]);
    }

    #[test]
    fn rk4_passes_stage_times_to_derivative() {
        let f = |_x: &[f64], t: f64, _p: &ParameterSet| -> Result<Vec<f64>, Infallible> {
            Ok(vec![t])
        };
        // Exact for polynomials up to degree 4: y(t) = t^2 / 2.
        let next = Rk4::new(1)
            .step(&f, 1.0, &[0.5], 0.5, &ParameterSet::new())
            .expect("step should succeed");
        assert!((next[0] - 1.125).abs() < 1e-12);
    }

    #[test]
    fn step_reports_wrong_derivative_length() {
        let f = |_x: &[f64], _t: f64, _p: &ParameterSet| -> Result<Vec<f64>, Infallible> {
            Ok(vec![0.0; 3])
        };
        let err = ForwardEuler
            .step(&f, 0.0, &[1.0, 2.0], 0.1, &ParameterSet::new())
            .expect_err("length mismatch should fail");
        assert!(matches!(
            err,
            IntegrateError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn method_parses_known_names() {
        assert_eq!("euler".parse::<Method>(), Ok(Method::Euler));
        assert_eq!("rk4".parse::<Method>(), Ok(Method::Rk4));
        assert!("tsit5".parse::<Method>().is_err());
    }
}
