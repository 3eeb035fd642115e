//! Sweep construction and low-level utilities shared by the bindings.
//!
//! Everything here reports errors as `String` so it can be exercised by
//! native tests; the bindings wrap them into `JsValue`.

use econdyn_core::equation_engine::EquationSystem;
use econdyn_core::models::builtin;
use econdyn_core::render::{Plot, Renderer};
use econdyn_core::{Method, ParameterDescriptor, Sweep, SweepConfig, View};
use serde::Serialize;
use tracing::warn;
use wasm_bindgen::prelude::*;

/// Calls a JS function with each frame as a plain object.
pub(crate) struct JsRenderer {
    callback: js_sys::Function,
}

impl JsRenderer {
    pub(crate) fn new(callback: js_sys::Function) -> Self {
        Self { callback }
    }

    /// Serializes `plot` and calls the callback, returning whatever the
    /// conversion or the callback threw.
    pub(crate) fn deliver(&self, plot: &Plot) -> Result<(), JsValue> {
        let value = to_js(plot)?;
        self.callback.call1(&JsValue::NULL, &value)?;
        Ok(())
    }
}

impl Renderer for JsRenderer {
    fn render(&mut self, plot: &Plot) {
        if let Err(err) = self.deliver(plot) {
            warn!(error = ?err, title = %plot.title, "render callback failed");
        }
    }
}

/// Serializes maps as plain objects rather than `Map`s.
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

pub(crate) fn js_error(message: String) -> JsValue {
    JsValue::from_str(&message)
}

pub(crate) fn parse_method(name: &str) -> Result<Method, String> {
    name.parse()
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn build_sweep(
    equations: &[String],
    var_names: &[String],
    descriptors: Vec<ParameterDescriptor>,
    initial_state: Vec<f64>,
    step: f64,
    horizon: f64,
    method: &str,
    view: View,
) -> Result<Sweep<EquationSystem>, String> {
    let param_names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
    let system = EquationSystem::compile(var_names, &param_names, equations)
        .map_err(|e| format!("Invalid equations: {}", e))?;
    if initial_state.len() != var_names.len() {
        return Err(format!(
            "Initial state has {} components, system has {}",
            initial_state.len(),
            var_names.len()
        ));
    }

    let config = SweepConfig::new(initial_state, step, horizon)
        .with_method(parse_method(method)?)
        .with_view(view);
    let sweep = Sweep::new(system, descriptors, config).map_err(|e| e.to_string())?;
    Ok(sweep.with_labels(var_names.to_vec()))
}

pub(crate) fn builtin_sweep(
    name: &str,
    step: f64,
    horizon: f64,
    method: &str,
) -> Result<Sweep<EquationSystem>, String> {
    let definition = builtin(name).ok_or_else(|| format!("Unknown model: {}", name))?;
    let sweep = build_sweep(
        &definition.equations,
        &definition.variables,
        definition.parameters.clone(),
        definition.initial_state.clone(),
        step,
        horizon,
        method,
        View::TimeSeries,
    )?;
    Ok(sweep.with_title(&definition.name))
}

/// A copy of the sweep's system with its current parameters bound, for the
/// Newton and phase-plane routines.
pub(crate) fn bound_system(sweep: &Sweep<EquationSystem>) -> Result<EquationSystem, String> {
    let mut system = sweep.derivative().clone();
    system
        .bind(sweep.parameters())
        .map_err(|e| format!("Failed to bind parameters: {}", e))?;
    Ok(system)
}
