//! Browser bindings for the econdyn parameter sweep.
//!
//! A `WasmSweep` owns the compiled model and a JS render callback. Slider
//! handlers call `set_param`; every accepted change invokes the callback with
//! one plot frame.

mod system;

use crate::system::{bound_system, build_sweep, builtin_sweep, js_error, to_js, JsRenderer};
use econdyn_core::equation_engine::EquationSystem;
use econdyn_core::equilibrium::{solve_equilibrium, NewtonSettings};
use econdyn_core::models::MODEL_NAMES;
use econdyn_core::phase::{nullclines, vector_field, AxisSpec};
use econdyn_core::{ParameterDescriptor, ParameterSet, Sweep, View};
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSweep {
    sweep: Sweep<EquationSystem>,
    renderer: JsRenderer,
}

#[wasm_bindgen]
impl WasmSweep {
    #[wasm_bindgen(constructor)]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        equations: Vec<String>,
        var_names: Vec<String>,
        descriptors: JsValue,
        initial_state: Vec<f64>,
        step: f64,
        horizon: f64,
        method: &str,
        on_render: js_sys::Function,
    ) -> Result<WasmSweep, JsValue> {
        console_error_panic_hook::set_once();

        let descriptors: Vec<ParameterDescriptor> = from_value(descriptors)
            .map_err(|e| JsValue::from_str(&format!("Invalid descriptors: {}", e)))?;
        let sweep = build_sweep(
            &equations,
            &var_names,
            descriptors,
            initial_state,
            step,
            horizon,
            method,
            View::TimeSeries,
        )
        .map_err(js_error)?;

        Ok(WasmSweep {
            sweep,
            renderer: JsRenderer::new(on_render),
        })
    }

    /// Sweep over one of the built-in classroom models.
    pub fn builtin(
        name: &str,
        step: f64,
        horizon: f64,
        method: &str,
        on_render: js_sys::Function,
    ) -> Result<WasmSweep, JsValue> {
        console_error_panic_hook::set_once();

        let sweep = builtin_sweep(name, step, horizon, method).map_err(js_error)?;
        Ok(WasmSweep {
            sweep,
            renderer: JsRenderer::new(on_render),
        })
    }

    pub fn initialize(&mut self) -> Result<(), JsValue> {
        self.sweep
            .initialize(&mut self.renderer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn set_param(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        self.sweep
            .set_parameter(name, value, &mut self.renderer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Replaces several values in one run, from a `{ name: value }` object.
    pub fn set_params(&mut self, values: JsValue) -> Result<(), JsValue> {
        let values: ParameterSet = from_value(values)
            .map_err(|e| JsValue::from_str(&format!("Invalid parameter set: {}", e)))?;
        self.sweep
            .set_parameters(&values, &mut self.renderer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// `{ kind: "time_series" }` or `{ kind: "phase", x, y }`.
    pub fn set_view(&mut self, view: JsValue) -> Result<(), JsValue> {
        let view: View =
            from_value(view).map_err(|e| JsValue::from_str(&format!("Invalid view: {}", e)))?;
        self.sweep
            .set_view(view, &mut self.renderer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn parameters(&self) -> Result<JsValue, JsValue> {
        to_js(self.sweep.parameters())
    }

    pub fn descriptors(&self) -> Result<JsValue, JsValue> {
        to_js(self.sweep.descriptors())
    }

    pub fn trajectory(&self) -> Result<JsValue, JsValue> {
        match self.sweep.trajectory() {
            Some(trajectory) => to_js(trajectory),
            None => Ok(JsValue::NULL),
        }
    }

    pub fn solve_equilibrium(
        &self,
        initial_guess: Vec<f64>,
        max_steps: u32,
        damping: f64,
    ) -> Result<JsValue, JsValue> {
        let settings = NewtonSettings {
            max_steps: max_steps as usize,
            damping,
            ..NewtonSettings::default()
        };
        let system = bound_system(&self.sweep).map_err(js_error)?;
        let result = solve_equilibrium(&system, &initial_guess, settings)
            .map_err(|e| JsValue::from_str(&format!("Equilibrium solve failed: {}", e)))?;
        to_js(&result)
    }

    /// `axes` is an array of one or two `{ var_index, min, max, samples }`.
    pub fn nullclines(&self, axes: JsValue, frozen_state: Vec<f64>) -> Result<JsValue, JsValue> {
        let axes: Vec<AxisSpec> =
            from_value(axes).map_err(|e| JsValue::from_str(&format!("Invalid axes: {}", e)))?;
        let system = bound_system(&self.sweep).map_err(js_error)?;
        let curves = nullclines(&system, &axes, &frozen_state)
            .map_err(|e| JsValue::from_str(&format!("Nullcline computation failed: {}", e)))?;
        to_js(&curves)
    }

    pub fn vector_field(
        &self,
        x_axis: JsValue,
        y_axis: JsValue,
        frozen_state: Vec<f64>,
    ) -> Result<JsValue, JsValue> {
        let x_axis: AxisSpec =
            from_value(x_axis).map_err(|e| JsValue::from_str(&format!("Invalid axis: {}", e)))?;
        let y_axis: AxisSpec =
            from_value(y_axis).map_err(|e| JsValue::from_str(&format!("Invalid axis: {}", e)))?;
        let system = bound_system(&self.sweep).map_err(js_error)?;
        let field = vector_field(&system, &x_axis, &y_axis, &frozen_state)
            .map_err(|e| JsValue::from_str(&format!("Vector field failed: {}", e)))?;
        to_js(&field)
    }
}

/// Names accepted by `WasmSweep.builtin`.
#[wasm_bindgen]
pub fn model_names() -> Vec<String> {
    MODEL_NAMES.iter().map(|name| name.to_string()).collect()
}
