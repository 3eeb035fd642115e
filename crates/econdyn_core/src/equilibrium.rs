use crate::{autodiff::Dual, traits::DynamicalSystem};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::linalg::SVD;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Real parts within this distance of zero count as zero when classifying.
const HYPERBOLIC_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenPair {
    pub value: ComplexNumber,
    pub vector: Vec<ComplexNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityKind {
    /// Every eigenvalue has negative real part.
    Stable,
    /// Every eigenvalue has positive real part.
    Unstable,
    /// Real parts of both signs.
    Saddle,
    /// At least one eigenvalue on the imaginary axis (centers included).
    NonHyperbolic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stability {
    pub kind: StabilityKind,
    /// True when some eigenvalue has a non-zero imaginary part.
    pub spiral: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumResult {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major `dim x dim` Jacobian at `state`.
    pub jacobian: Vec<f64>,
    pub eigenpairs: Vec<EigenPair>,
    pub stability: Stability,
}

/// Finds a fixed point of the flow `dx/dt = f(x)` near `initial_guess` with a
/// damped Newton iteration.
pub fn solve_equilibrium<S>(
    system: &S,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<EquilibriumResult>
where
    S: DynamicalSystem<f64> + DynamicalSystem<Dual>,
{
    let dim = DynamicalSystem::<f64>::dimension(system);
    if dim == 0 {
        bail!("System has zero dimension.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if !(settings.damping.is_finite() && settings.damping > 0.0) {
        bail!("damping must be positive and finite, got {}.", settings.damping);
    }
    if !(settings.tolerance.is_finite() && settings.tolerance > 0.0) {
        bail!("tolerance must be positive and finite, got {}.", settings.tolerance);
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    system.apply(0.0, &state, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    loop {
        if !residual_norm.is_finite() {
            bail!("Residual became non-finite after {} Newton steps.", iterations);
        }
        if residual_norm <= settings.tolerance {
            break;
        }

        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let jacobian = compute_jacobian(system, &state);
        let delta = solve_linear_system(dim, &jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;

        for (x, dx) in state.iter_mut().zip(&delta) {
            *x -= settings.damping * dx;
        }

        iterations += 1;
        system.apply(0.0, &state, &mut residual);
        residual_norm = l2_norm(&residual);
    }
    debug!(iterations, residual_norm, "newton converged");

    let jacobian = compute_jacobian(system, &state);
    let eigenpairs = compute_eigenpairs(dim, &jacobian)
        .context("Failed to compute eigenvalues/eigenvectors of Jacobian.")?;
    let stability = classify(&eigenpairs);

    Ok(EquilibriumResult {
        state,
        residual_norm,
        iterations,
        jacobian,
        eigenpairs,
        stability,
    })
}

/// Row-major Jacobian of `system` at `state`, one dual-number sweep per column.
pub fn compute_jacobian<S>(system: &S, state: &[f64]) -> Vec<f64>
where
    S: DynamicalSystem<Dual> + ?Sized,
{
    let dim = state.len();
    let mut jacobian = vec![0.0; dim * dim];
    let mut dual_state = vec![Dual::new(0.0, 0.0); dim];
    let mut dual_out = vec![Dual::new(0.0, 0.0); dim];
    let t_dual = Dual::new(0.0, 0.0);

    for j in 0..dim {
        for i in 0..dim {
            dual_state[i] = Dual::new(state[i], if i == j { 1.0 } else { 0.0 });
        }
        system.apply(t_dual, &dual_state, &mut dual_out);
        for i in 0..dim {
            jacobian[i * dim + j] = dual_out[i].eps;
        }
    }

    jacobian
}

pub fn classify(eigenpairs: &[EigenPair]) -> Stability {
    let negative = eigenpairs
        .iter()
        .filter(|p| p.value.re < -HYPERBOLIC_TOLERANCE)
        .count();
    let positive = eigenpairs
        .iter()
        .filter(|p| p.value.re > HYPERBOLIC_TOLERANCE)
        .count();
    let kind = if negative + positive < eigenpairs.len() {
        StabilityKind::NonHyperbolic
    } else if positive == 0 {
        StabilityKind::Stable
    } else if negative == 0 {
        StabilityKind::Unstable
    } else {
        StabilityKind::Saddle
    };
    let spiral = eigenpairs
        .iter()
        .any(|p| p.value.im.abs() > HYPERBOLIC_TOLERANCE);
    Stability { kind, spiral }
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

fn compute_eigenpairs(dim: usize, jacobian: &[f64]) -> Result<Vec<EigenPair>> {
    let matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let eigenvalues = matrix.complex_eigenvalues();
    let complex_matrix = matrix.map(|v| Complex::new(v, 0.0));

    let mut pairs = Vec::with_capacity(dim);
    for idx in 0..dim {
        let lambda = eigenvalues[idx];

        let mut shifted = complex_matrix.clone();
        for i in 0..dim {
            shifted[(i, i)] -= lambda;
        }

        let svd = SVD::new(shifted, true, true);
        let v_t = svd
            .v_t
            .ok_or_else(|| anyhow!("Failed to compute eigenvector for eigenvalue index {}", idx))?;
        let row_index = v_t.nrows().saturating_sub(1);
        // Rows of V^H are conjugated right-singular vectors.
        let mut vector: Vec<Complex<f64>> = v_t.row(row_index).iter().map(|c| c.conj()).collect();
        normalize_complex_vector(&mut vector);

        pairs.push(EigenPair {
            value: ComplexNumber::from(lambda),
            vector: vector.into_iter().map(ComplexNumber::from).collect(),
        });
    }
    Ok(pairs)
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn normalize_complex_vector(vec: &mut [Complex<f64>]) {
    let norm = vec.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for entry in vec {
            *entry /= norm;
        }
    }
}
