//! Phase-plane helpers: nullclines and sampled vector fields.

use crate::traits::DynamicalSystem;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub var_index: usize,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl AxisSpec {
    fn step(&self) -> f64 {
        (self.max - self.min) / (self.samples - 1) as f64
    }

    fn value(&self, i: usize) -> f64 {
        self.min + self.step() * i as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "geometry", rename_all = "snake_case")]
pub enum NullclineGeometry {
    /// Roots along a single axis.
    Points { roots: Vec<f64> },
    /// Line segments `[[x0, y0], [x1, y1]]` in the plane of the two axes.
    Segments { segments: Vec<[[f64; 2]; 2]> },
}

/// Zero set of `f_component` over the requested axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nullcline {
    pub component: usize,
    #[serde(flatten)]
    pub geometry: NullclineGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

fn validate_axes(dim: usize, axes: &[AxisSpec], frozen_state: &[f64]) -> Result<()> {
    if dim == 0 {
        bail!("System dimension must be positive.");
    }
    if frozen_state.len() != dim {
        bail!(
            "Frozen state length ({}) does not match system dimension ({}).",
            frozen_state.len(),
            dim
        );
    }
    if axes.is_empty() || axes.len() > 2 {
        bail!("Phase-plane helpers need 1 or 2 axes.");
    }
    if axes.len() == 2 && axes[0].var_index == axes[1].var_index {
        bail!("Axis variable indices must be unique.");
    }
    for axis in axes {
        if axis.var_index >= dim {
            bail!("Axis variable index {} out of range.", axis.var_index);
        }
        if !axis.min.is_finite() || !axis.max.is_finite() || axis.max <= axis.min {
            bail!("Each axis range must be finite with max > min.");
        }
        if axis.samples < 2 {
            bail!("Each axis needs at least 2 samples.");
        }
    }
    Ok(())
}

/// Evaluates the full vector field at every grid point; row-major with the
/// first axis varying fastest.
fn sample_grid<S: DynamicalSystem<f64> + ?Sized>(
    system: &S,
    x_axis: &AxisSpec,
    y_axis: Option<&AxisSpec>,
    frozen_state: &[f64],
) -> Vec<Vec<f64>> {
    let dim = frozen_state.len();
    let ny = y_axis.map_or(1, |a| a.samples);
    let mut state = frozen_state.to_vec();
    let mut values = Vec::with_capacity(x_axis.samples * ny);
    for iy in 0..ny {
        if let Some(axis) = y_axis {
            state[axis.var_index] = axis.value(iy);
        }
        for ix in 0..x_axis.samples {
            state[x_axis.var_index] = x_axis.value(ix);
            let mut out = vec![0.0; dim];
            system.apply(0.0, &state, &mut out);
            values.push(out);
        }
    }
    values
}

/// Nullclines of every component over one axis (roots) or two axes
/// (marching-squares segments). Coordinates not on an axis stay at
/// `frozen_state`.
pub fn nullclines<S: DynamicalSystem<f64> + ?Sized>(
    system: &S,
    axes: &[AxisSpec],
    frozen_state: &[f64],
) -> Result<Vec<Nullcline>> {
    let dim = system.dimension();
    validate_axes(dim, axes, frozen_state)?;

    let grid = sample_grid(system, &axes[0], axes.get(1), frozen_state);
    let nullclines = (0..dim)
        .map(|component| {
            let values: Vec<f64> = grid.iter().map(|v| v[component]).collect();
            let geometry = match axes {
                [axis] => NullclineGeometry::Points {
                    roots: roots_along_axis(axis, &values),
                },
                [x_axis, y_axis, ..] => NullclineGeometry::Segments {
                    segments: marching_squares(x_axis, y_axis, &values),
                },
                [] => NullclineGeometry::Points { roots: Vec::new() },
            };
            Nullcline {
                component,
                geometry,
            }
        })
        .collect();
    Ok(nullclines)
}

/// Samples `(dx, dy)` for the two axis components on a regular grid.
pub fn vector_field<S: DynamicalSystem<f64> + ?Sized>(
    system: &S,
    x_axis: &AxisSpec,
    y_axis: &AxisSpec,
    frozen_state: &[f64],
) -> Result<Vec<FieldSample>> {
    let axes = [x_axis.clone(), y_axis.clone()];
    validate_axes(system.dimension(), &axes, frozen_state)?;

    let grid = sample_grid(system, x_axis, Some(y_axis), frozen_state);
    let nx = x_axis.samples;
    Ok(grid
        .iter()
        .enumerate()
        .map(|(i, v)| FieldSample {
            x: x_axis.value(i % nx),
            y: y_axis.value(i / nx),
            dx: v[x_axis.var_index],
            dy: v[y_axis.var_index],
        })
        .collect())
}

fn roots_along_axis(axis: &AxisSpec, values: &[f64]) -> Vec<f64> {
    let zero_eps = 1e-10;
    let mut roots = Vec::new();
    for i in 0..values.len().saturating_sub(1) {
        let x0 = axis.value(i);
        let x1 = axis.value(i + 1);
        let v0 = values[i];
        let v1 = values[i + 1];
        if v0.abs() <= zero_eps {
            roots.push(x0);
        }
        if v1.abs() <= zero_eps {
            roots.push(x1);
        }
        if (v0 < 0.0 && v1 > 0.0) || (v0 > 0.0 && v1 < 0.0) {
            let t = interpolate_factor(v0, v1);
            roots.push(x0 + (x1 - x0) * t);
        }
    }

    roots.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-8 * (1.0 + a.abs().max(b.abs())));
    roots
}

fn marching_squares(x_axis: &AxisSpec, y_axis: &AxisSpec, values: &[f64]) -> Vec<[[f64; 2]; 2]> {
    let nx = x_axis.samples;
    let ny = y_axis.samples;
    let index = |ix: usize, iy: usize| -> usize { ix + iy * nx };

    let mut segments = Vec::new();
    for iy in 0..ny - 1 {
        let (y0, y1) = (y_axis.value(iy), y_axis.value(iy + 1));
        for ix in 0..nx - 1 {
            let (x0, x1) = (x_axis.value(ix), x_axis.value(ix + 1));
            let corners = [
                values[index(ix, iy)],
                values[index(ix + 1, iy)],
                values[index(ix + 1, iy + 1)],
                values[index(ix, iy + 1)],
            ];
            let case_index = corners
                .iter()
                .enumerate()
                .filter(|(_, v)| **v >= 0.0)
                .fold(0u8, |acc, (bit, _)| acc | (1 << bit));

            for (edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let a = interpolate_square_edge(*edge_a, [x0, x1, y0, y1], corners);
                let b = interpolate_square_edge(*edge_b, [x0, x1, y0, y1], corners);
                segments.push([a, b]);
            }
        }
    }
    segments
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        1 | 14 => &[(3, 0)],
        2 | 13 => &[(0, 1)],
        3 | 12 => &[(3, 1)],
        4 | 11 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 | 9 => &[(0, 2)],
        7 | 8 => &[(3, 2)],
        10 => &[(0, 3), (1, 2)],
        _ => &[],
    }
}

/// Edges: 0 bottom, 1 right, 2 top, 3 left; corners counter-clockwise from
/// bottom-left.
fn interpolate_square_edge(edge: u8, bounds: [f64; 4], v: [f64; 4]) -> [f64; 2] {
    let [x0, x1, y0, y1] = bounds;
    match edge {
        0 => [x0 + (x1 - x0) * interpolate_factor(v[0], v[1]), y0],
        1 => [x1, y0 + (y1 - y0) * interpolate_factor(v[1], v[2])],
        2 => [x1 + (x0 - x1) * interpolate_factor(v[2], v[3]), y1],
        _ => [x0, y1 + (y0 - y1) * interpolate_factor(v[3], v[0])],
    }
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::builtin;

    struct Rotation;

    impl DynamicalSystem<f64> for Rotation {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    fn axis(var_index: usize, min: f64, max: f64, samples: usize) -> AxisSpec {
        AxisSpec {
            var_index,
            min,
            max,
            samples,
        }
    }

    #[test]
    fn rejects_bad_axes() {
        let cases = [
            (vec![], "1 or 2 axes"),
            (vec![axis(0, 0.0, 1.0, 5), axis(0, 0.0, 1.0, 5)], "unique"),
            (vec![axis(2, 0.0, 1.0, 5)], "out of range"),
            (vec![axis(0, 1.0, 1.0, 5)], "max > min"),
            (vec![axis(0, 0.0, 1.0, 1)], "at least 2 samples"),
        ];
        for (axes, needle) in cases {
            let err = nullclines(&Rotation, &axes, &[0.0, 0.0]).expect_err("should fail");
            assert!(err.to_string().contains(needle), "{err} vs {needle}");
        }
        let err = nullclines(&Rotation, &[axis(0, 0.0, 1.0, 5)], &[0.0]).expect_err("short state");
        assert!(err.to_string().contains("Frozen state"));
    }

    #[test]
    fn linear_nullclines_pass_through_origin() {
        let axes = [axis(0, -1.0, 1.0, 20), axis(1, -1.0, 1.0, 20)];
        let result = nullclines(&Rotation, &axes, &[0.0, 0.0]).expect("computes");
        assert_eq!(result.len(), 2);

        // dx/dt = y vanishes on y = 0, dy/dt = -x on x = 0.
        for (nullcline, coord) in result.iter().zip([1usize, 0]) {
            match &nullcline.geometry {
                NullclineGeometry::Segments { segments } => {
                    assert!(!segments.is_empty());
                    for point in segments.iter().flatten() {
                        assert!(point[coord].abs() < 1e-9, "{point:?}");
                    }
                }
                other => panic!("expected segments, got {other:?}"),
            }
        }
    }

    #[test]
    fn solow_nullcline_is_the_steady_state() {
        let definition = builtin("solow").expect("solow exists");
        let mut system = definition.compile().expect("compiles");
        system
            .bind(&definition.default_parameters())
            .expect("binds");

        let result = nullclines(&system, &[axis(0, 0.5, 10.0, 400)], &[1.0]).expect("computes");
        let expected = (0.2f64 / 0.06).powf(1.0 / 0.67);
        match &result[0].geometry {
            NullclineGeometry::Points { roots } => {
                assert_eq!(roots.len(), 1, "{roots:?}");
                assert!((roots[0] - expected).abs() < 1e-2, "{} vs {expected}", roots[0]);
            }
            other => panic!("expected points, got {other:?}"),
        }
    }

    #[test]
    fn vector_field_samples_every_grid_point() {
        let field = vector_field(
            &Rotation,
            &axis(0, 0.0, 1.0, 3),
            &axis(1, 0.0, 2.0, 2),
            &[0.0, 0.0],
        )
        .expect("computes");
        assert_eq!(field.len(), 6);
        assert_eq!(
            field[4],
            FieldSample {
                x: 0.5,
                y: 2.0,
                dx: 2.0,
                dy: -0.5
            }
        );
    }
}
