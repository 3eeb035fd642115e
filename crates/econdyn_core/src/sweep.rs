//! Interactive parameter sweeps.
//!
//! A [`Sweep`] owns a derivative function, its slider descriptors and a fixed
//! initial condition. Every accepted parameter change recomputes the whole
//! trajectory from that initial condition and hands one [`Plot`] to the
//! renderer supplied with the call.

use crate::integrator::{integrate_with, IntegrateError, Trajectory};
use crate::params::{
    defaults, validate_descriptors, ParameterDescriptor, ParameterError, ParameterSet,
};
use crate::render::{Plot, Renderer, Series};
use crate::solvers::Method;
use crate::traits::Derivative;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// What a frame shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    /// Every state component against time.
    #[default]
    TimeSeries,
    /// Component `y` against component `x`.
    Phase { x: usize, y: usize },
}

/// A slider event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub name: String,
    pub value: f64,
}

impl ParameterChange {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum SweepError<E> {
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("Integration failed: {0}")]
    Integrate(IntegrateError<E>),
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("Invalid view: {0}")]
    InvalidView(String),
}

impl<E> SweepError<E> {
    /// Returns the derivative function's own error, if that is what failed.
    pub fn into_derivative(self) -> Option<E> {
        match self {
            SweepError::Integrate(err) => err.into_derivative(),
            _ => None,
        }
    }
}

fn default_step() -> f64 {
    0.01
}

fn default_horizon() -> f64 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub initial_state: Vec<f64>,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub view: View,
}

impl SweepConfig {
    pub fn new(initial_state: Vec<f64>, step: f64, horizon: f64) -> Self {
        Self {
            initial_state,
            step,
            horizon,
            method: Method::default(),
            view: View::default(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }
}

pub struct Sweep<D: Derivative> {
    derivative: D,
    descriptors: Vec<ParameterDescriptor>,
    config: SweepConfig,
    title: String,
    labels: Vec<String>,
    parameters: ParameterSet,
    trajectory: Option<Trajectory>,
}

impl<D: Derivative> Sweep<D> {
    /// Validates the descriptors against the names `derivative` declares and
    /// starts from the descriptor defaults. Nothing is integrated until
    /// [`Sweep::initialize`].
    pub fn new(
        derivative: D,
        descriptors: Vec<ParameterDescriptor>,
        config: SweepConfig,
    ) -> Result<Self, SweepError<D::Error>> {
        validate_descriptors(&descriptors, derivative.parameter_names())?;
        check_view(config.view, config.initial_state.len())?;
        let parameters = defaults(&descriptors);
        Ok(Self {
            derivative,
            descriptors,
            config,
            title: "trajectory".to_string(),
            labels: Vec::new(),
            parameters,
            trajectory: None,
        })
    }

    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Names the state components in rendered plots. Missing labels fall back
    /// to `x0`, `x1` and so on.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn derivative(&self) -> &D {
        &self.derivative
    }

    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.descriptors
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// The parameter set of the last successful run, or the defaults before
    /// the first one.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Runs once with the default values and renders the result.
    pub fn initialize<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        info!(title = %self.title, parameters = self.descriptors.len(), "initializing sweep");
        self.run(defaults(&self.descriptors), renderer)
    }

    /// Applies one slider movement: clamps `value`, recomputes and renders.
    pub fn set_parameter<R: Renderer + ?Sized>(
        &mut self,
        name: &str,
        value: f64,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| SweepError::UnknownParameter(name.to_string()))?;
        let clamped = descriptor.clamp(value);
        if !descriptor.contains(value) {
            warn!(name, value, clamped, "parameter value clamped to slider range");
        }

        let mut next = self.parameters.clone();
        next.insert(name, clamped);
        self.run(next, renderer)
    }

    pub fn handle<R: Renderer + ?Sized>(
        &mut self,
        change: &ParameterChange,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        self.set_parameter(&change.name, change.value, renderer)
    }

    /// Handles `events` in order and stops at the first failure. Returns the
    /// number of events applied.
    pub fn process<'a, I, R>(
        &mut self,
        events: I,
        renderer: &mut R,
    ) -> Result<usize, SweepError<D::Error>>
    where
        I: IntoIterator<Item = &'a ParameterChange>,
        R: Renderer + ?Sized,
    {
        let mut applied = 0;
        for change in events {
            self.handle(change, renderer)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Replaces the whole parameter set in one run. Names absent from
    /// `values` keep their current value.
    pub fn set_parameters<R: Renderer + ?Sized>(
        &mut self,
        values: &ParameterSet,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        if let Some(unknown) = values.names().find(|name| self.descriptor(name).is_none()) {
            return Err(SweepError::UnknownParameter(unknown.to_string()));
        }

        let next: ParameterSet = self
            .descriptors
            .iter()
            .map(|d| {
                let value = match values.get(&d.name) {
                    Some(v) => d.clamp(v),
                    None => self.parameters.get(&d.name).unwrap_or(d.default),
                };
                (d.name.clone(), value)
            })
            .collect();
        self.run(next, renderer)
    }

    /// Switches the view and redraws the current trajectory, if there is one.
    pub fn set_view<R: Renderer + ?Sized>(
        &mut self,
        view: View,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        check_view(view, self.config.initial_state.len())?;
        self.config.view = view;
        if let Some(trajectory) = &self.trajectory {
            renderer.render(&self.plot(trajectory, &self.parameters));
        }
        Ok(())
    }

    /// Builds the frame for `trajectory` under the current view.
    pub fn plot(&self, trajectory: &Trajectory, parameters: &ParameterSet) -> Plot {
        let (x_label, y_label, series) = match self.config.view {
            View::TimeSeries => {
                let series = (0..trajectory.dimension())
                    .map(|i| Series::new(&self.label(i), trajectory.component(i)))
                    .collect();
                ("t".to_string(), "value".to_string(), series)
            }
            View::Phase { x, y } => {
                let (x_label, y_label) = (self.label(x), self.label(y));
                let series = vec![Series::new(
                    &format!("{y_label} vs {x_label}"),
                    trajectory.phase(x, y),
                )];
                (x_label, y_label, series)
            }
        };
        Plot {
            title: self.title.clone(),
            x_label,
            y_label,
            parameters: parameters.clone(),
            series,
        }
    }

    fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("x{index}"))
    }

    // Commits parameters and trajectory only once integration succeeded.
    fn run<R: Renderer + ?Sized>(
        &mut self,
        parameters: ParameterSet,
        renderer: &mut R,
    ) -> Result<(), SweepError<D::Error>> {
        let trajectory = integrate_with(
            self.config.method,
            &self.config.initial_state,
            &self.derivative,
            self.config.step,
            self.config.horizon,
            &parameters,
        )
        .map_err(|err| {
            warn!(error = %err, "run failed, keeping previous state");
            SweepError::Integrate(err)
        })?;

        debug!(samples = trajectory.len(), "rendering frame");
        renderer.render(&self.plot(&trajectory, &parameters));
        self.parameters = parameters;
        self.trajectory = Some(trajectory);
        Ok(())
    }
}

fn check_view<E>(view: View, dimension: usize) -> Result<(), SweepError<E>> {
    match view {
        View::TimeSeries => Ok(()),
        View::Phase { x, y } if x < dimension && y < dimension => Ok(()),
        View::Phase { x, y } => Err(SweepError::InvalidView(format!(
            "phase axes ({x}, {y}) out of range for dimension {dimension}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::integrate;
    use crate::models::builtin;
    use crate::render::RecordingRenderer;

    fn decay(x: &[f64], _t: f64, p: &ParameterSet) -> Result<Vec<f64>, String> {
        let k = p.get("k").ok_or_else(|| "k missing".to_string())?;
        Ok(vec![-k * x[0]])
    }

    fn fragile(x: &[f64], _t: f64, p: &ParameterSet) -> Result<Vec<f64>, String> {
        let k = p.get("k").ok_or_else(|| "k missing".to_string())?;
        if k > 2.0 {
            return Err("blew up".to_string());
        }
        Ok(vec![-k * x[0]])
    }

    fn k_descriptor() -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::new("k", 0.0, 5.0, 0.01, 1.0)]
    }

    type DerivativeFn = fn(&[f64], f64, &ParameterSet) -> Result<Vec<f64>, String>;

    fn sweep(f: DerivativeFn, descriptors: Vec<ParameterDescriptor>) -> Sweep<DerivativeFn> {
        Sweep::new(f, descriptors, SweepConfig::new(vec![1.0], 0.1, 1.0)).expect("valid sweep")
    }

    #[test]
    fn initialize_renders_defaults() {
        let mut s = sweep(decay, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        s.initialize(&mut renderer).expect("runs");

        assert_eq!(renderer.frames.len(), 1);
        let frame = &renderer.frames[0];
        assert_eq!(frame.parameters.get("k"), Some(1.0));
        assert_eq!(frame.series.len(), 1);
        assert_eq!(frame.series[0].name, "x0");
        assert_eq!(frame.series[0].points.len(), 11);
        assert_eq!(s.trajectory().map(|t| t.len()), Some(11));
    }

    #[test]
    fn out_of_range_value_matches_clamped_run() {
        let descriptors = vec![ParameterDescriptor::new("k", 0.0, 2.0, 0.01, 1.0)];
        let mut s = sweep(decay, descriptors);
        let mut renderer = RecordingRenderer::new();
        s.initialize(&mut renderer).expect("runs");
        s.set_parameter("k", 10.0, &mut renderer).expect("clamped run");

        assert_eq!(s.parameters().get("k"), Some(2.0));
        let direct = integrate(&[1.0], &decay, 0.1, 1.0, &ParameterSet::new().with("k", 2.0))
            .expect("direct run");
        assert_eq!(s.trajectory(), Some(&direct));
    }

    #[test]
    fn nan_slider_value_falls_back_to_default() {
        let mut s = sweep(decay, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        s.set_parameter("k", 3.0, &mut renderer).expect("runs");
        s.set_parameter("k", f64::NAN, &mut renderer).expect("runs");
        assert_eq!(s.parameters().get("k"), Some(1.0));
        assert_eq!(renderer.frames.len(), 2);
    }

    #[test]
    fn failed_run_keeps_previous_state_and_skips_render() {
        let mut s = sweep(fragile, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        s.initialize(&mut renderer).expect("runs");
        let before = s.trajectory().cloned();

        let err = s
            .set_parameter("k", 3.0, &mut renderer)
            .expect_err("derivative fails above 2");
        assert_eq!(err.into_derivative(), Some("blew up".to_string()));
        assert_eq!(renderer.frames.len(), 1);
        assert_eq!(s.parameters().get("k"), Some(1.0));
        assert_eq!(s.trajectory().cloned(), before);
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut s = sweep(decay, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        let err = s
            .set_parameter("z", 1.0, &mut renderer)
            .expect_err("z is not a slider");
        assert!(matches!(err, SweepError::UnknownParameter(name) if name == "z"));
        assert!(renderer.frames.is_empty());
        assert!(s.trajectory().is_none());
    }

    #[test]
    fn events_are_applied_in_order() {
        let mut s = sweep(decay, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        let events = vec![
            ParameterChange::new("k", 0.5),
            ParameterChange::new("k", 1.5),
            ParameterChange::new("k", 0.25),
        ];
        let applied = s.process(&events, &mut renderer).expect("all apply");

        assert_eq!(applied, 3);
        let seen: Vec<Option<f64>> = renderer
            .frames
            .iter()
            .map(|f| f.parameters.get("k"))
            .collect();
        assert_eq!(seen, vec![Some(0.5), Some(1.5), Some(0.25)]);
        assert_eq!(s.parameters().get("k"), Some(0.25));
    }

    #[test]
    fn process_stops_at_first_failure() {
        let mut s = sweep(fragile, k_descriptor());
        let mut renderer = RecordingRenderer::new();
        let events = vec![
            ParameterChange::new("k", 0.5),
            ParameterChange::new("k", 4.0),
            ParameterChange::new("k", 0.25),
        ];
        assert!(s.process(&events, &mut renderer).is_err());
        assert_eq!(renderer.frames.len(), 1);
        assert_eq!(s.parameters().get("k"), Some(0.5));
    }

    #[test]
    fn set_parameters_replaces_wholesale() {
        let descriptors = vec![
            ParameterDescriptor::new("k", 0.0, 5.0, 0.01, 1.0),
            ParameterDescriptor::new("m", 0.0, 1.0, 0.01, 0.5),
        ];
        let mut s = sweep(decay, descriptors);
        let mut renderer = RecordingRenderer::new();
        s.initialize(&mut renderer).expect("runs");

        s.set_parameters(&ParameterSet::new().with("k", 9.0), &mut renderer)
            .expect("runs");
        assert_eq!(s.parameters().get("k"), Some(5.0));
        assert_eq!(s.parameters().get("m"), Some(0.5));

        let err = s
            .set_parameters(&ParameterSet::new().with("q", 1.0), &mut renderer)
            .expect_err("q is unknown");
        assert!(matches!(err, SweepError::UnknownParameter(_)));
        assert_eq!(renderer.frames.len(), 2);
    }

    #[test]
    fn descriptors_must_cover_declared_names() {
        let definition = builtin("logistic").expect("logistic exists");
        let system = definition.compile().expect("compiles");
        let config = SweepConfig::new(definition.initial_state.clone(), 0.1, 1.0);
        let partial = vec![definition.parameters[0].clone()];

        let err = Sweep::new(system, partial, config)
            .err()
            .expect("K has no descriptor");
        assert!(matches!(
            err,
            SweepError::Parameter(ParameterError::Undescribed(name)) if name == "K"
        ));
    }

    #[test]
    fn phase_view_plots_one_component_against_another() {
        let definition = builtin("lotka_volterra").expect("lotka_volterra exists");
        let system = definition.compile().expect("compiles");
        let config = SweepConfig::new(definition.initial_state.clone(), 0.01, 1.0)
            .with_method(Method::Rk4)
            .with_view(View::Phase { x: 0, y: 1 });
        let mut s = Sweep::new(system, definition.parameters.clone(), config)
            .expect("valid sweep")
            .with_title("lotka_volterra")
            .with_labels(definition.variables.clone());
        let mut renderer = RecordingRenderer::new();
        s.initialize(&mut renderer).expect("runs");

        let frame = renderer.last().expect("one frame");
        assert_eq!(frame.x_label, "R");
        assert_eq!(frame.y_label, "P");
        assert_eq!(frame.series.len(), 1);
        assert_eq!(frame.series[0].points.len(), 101);
        assert_eq!(frame.series[0].points[0], [40.0, 9.0]);

        s.set_view(View::TimeSeries, &mut renderer).expect("valid view");
        assert_eq!(renderer.frames.len(), 2);
        assert_eq!(renderer.frames[1].series.len(), 2);
        assert_eq!(renderer.frames[1].series[1].name, "P");
    }

    #[test]
    fn phase_axes_must_exist() {
        let config = SweepConfig::new(vec![1.0], 0.1, 1.0).with_view(View::Phase { x: 0, y: 2 });
        let err = Sweep::new(decay as DerivativeFn, k_descriptor(), config)
            .err()
            .expect("axis 2 does not exist");
        assert!(matches!(err, SweepError::InvalidView(_)));
    }

    #[test]
    fn view_deserializes_from_tagged_json() {
        let view: View = serde_json::from_str(r#"{"kind":"phase","x":1,"y":0}"#).expect("parses");
        assert_eq!(view, View::Phase { x: 1, y: 0 });
        let config: SweepConfig = serde_json::from_str(r#"{"initial_state":[1.0]}"#).expect("parses");
        assert_eq!(config.step, 0.01);
        assert_eq!(config.horizon, 10.0);
        assert_eq!(config.view, View::TimeSeries);
    }
}
