//! The classroom models, written as equation text.

use crate::equation_engine::{EngineError, EquationSystem};
use crate::params::{defaults, ParameterDescriptor, ParameterSet};
use serde::{Deserialize, Serialize};

/// A model as a student would write it down: state variables, one right-hand
/// side per variable, slider descriptors and a starting point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub variables: Vec<String>,
    pub equations: Vec<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub initial_state: Vec<f64>,
}

impl ModelDefinition {
    pub fn compile(&self) -> Result<EquationSystem, EngineError> {
        let param_names: Vec<String> = self.parameters.iter().map(|p| p.name.clone()).collect();
        EquationSystem::compile(&self.variables, &param_names, &self.equations)
    }

    pub fn default_parameters(&self) -> ParameterSet {
        defaults(&self.parameters)
    }
}

pub const MODEL_NAMES: &[&str] = &[
    "exponential_decay",
    "logistic",
    "solow",
    "solow_human_capital",
    "lotka_volterra",
    "kaldor",
];

fn model(
    name: &str,
    variables: &[&str],
    equations: &[&str],
    parameters: Vec<ParameterDescriptor>,
    initial_state: &[f64],
) -> ModelDefinition {
    ModelDefinition {
        name: name.to_string(),
        variables: variables.iter().map(|s| s.to_string()).collect(),
        equations: equations.iter().map(|s| s.to_string()).collect(),
        parameters,
        initial_state: initial_state.to_vec(),
    }
}

type P = ParameterDescriptor;

/// Looks up a built-in model by name.
pub fn builtin(name: &str) -> Option<ModelDefinition> {
    let definition = match name {
        "exponential_decay" => model(
            name,
            &["y"],
            &["-k*y"],
            vec![P::new("k", 0.0, 5.0, 0.01, 1.0)],
            &[10.0],
        ),
        "logistic" => model(
            name,
            &["x"],
            &["r*x*(1 - x/K)"],
            vec![
                P::new("r", 0.0, 3.0, 0.01, 0.5),
                P::new("K", 1.0, 1000.0, 1.0, 100.0),
            ],
            &[10.0],
        ),
        "solow" => model(
            name,
            &["k"],
            &["s*k^alpha - (n + delta)*k"],
            vec![
                P::new("s", 0.0, 1.0, 0.01, 0.2),
                P::new("alpha", 0.01, 0.99, 0.01, 0.33),
                P::new("n", 0.0, 0.1, 0.001, 0.01),
                P::new("delta", 0.0, 0.2, 0.001, 0.05),
            ],
            &[1.0],
        ),
        // Mankiw-Romer-Weil: physical and human capital per effective worker.
        "solow_human_capital" => model(
            name,
            &["k", "h"],
            &[
                "s_k*k^alpha*h^beta - (n + g + delta)*k",
                "s_h*k^alpha*h^beta - (n + g + delta)*h",
            ],
            vec![
                P::new("s_k", 0.0, 1.0, 0.01, 0.2),
                P::new("s_h", 0.0, 1.0, 0.01, 0.1),
                P::new("alpha", 0.01, 0.99, 0.01, 0.3),
                P::new("beta", 0.01, 0.99, 0.01, 0.3),
                P::new("n", 0.0, 0.1, 0.001, 0.01),
                P::new("g", 0.0, 0.1, 0.001, 0.02),
                P::new("delta", 0.0, 0.2, 0.001, 0.05),
            ],
            &[1.0, 1.0],
        ),
        // Resource R harvested by producers P.
        "lotka_volterra" => model(
            name,
            &["R", "P"],
            &["a*R - b*R*P", "c*R*P - d*P"],
            vec![
                P::new("a", 0.0, 3.0, 0.01, 1.0),
                P::new("b", 0.0, 1.0, 0.001, 0.1),
                P::new("c", 0.0, 1.0, 0.001, 0.02),
                P::new("d", 0.0, 3.0, 0.01, 0.5),
            ],
            &[40.0, 9.0],
        ),
        // Output Y adjusts to excess investment; capital K accumulates net
        // investment. Investment is S-shaped in Y around ybar with width w.
        "kaldor" => model(
            name,
            &["Y", "K"],
            &[
                "alpha*((i0 + gamma*tanh((Y - ybar)/w) - beta*K) - s*Y)",
                "(i0 + gamma*tanh((Y - ybar)/w) - beta*K) - delta*K",
            ],
            vec![
                P::new("alpha", 0.0, 10.0, 0.1, 2.0),
                P::new("s", 0.01, 1.0, 0.01, 0.2),
                P::new("delta", 0.0, 1.0, 0.01, 0.1),
                P::new("beta", 0.0, 1.0, 0.01, 0.2),
                P::new("gamma", 0.0, 50.0, 0.5, 9.0),
                P::new("w", 1.0, 100.0, 1.0, 20.0),
                P::new("i0", 0.0, 100.0, 0.5, 30.0),
                P::new("ybar", 0.0, 200.0, 1.0, 50.0),
            ],
            &[55.0, 100.0],
        ),
        _ => return None,
    };
    Some(definition)
}

/// Every built-in model, in [`MODEL_NAMES`] order.
pub fn builtins() -> Vec<ModelDefinition> {
    MODEL_NAMES.iter().filter_map(|name| builtin(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::validate_descriptors;
    use crate::traits::Derivative;

    #[test]
    fn every_builtin_compiles_and_is_consistent() {
        let models = builtins();
        assert_eq!(models.len(), MODEL_NAMES.len());
        for definition in models {
            let system = definition
                .compile()
                .unwrap_or_else(|err| panic!("{} failed to compile: {err}", definition.name));
            assert_eq!(definition.initial_state.len(), definition.variables.len());
            validate_descriptors(&definition.parameters, system.parameter_names())
                .unwrap_or_else(|err| panic!("{}: {err}", definition.name));
            let d = system
                .derivative(&definition.initial_state, 0.0, &definition.default_parameters())
                .expect("derivative evaluates at the initial state");
            assert!(d.iter().all(|v| v.is_finite()), "{}: {d:?}", definition.name);
        }
    }

    #[test]
    fn unknown_model_is_none() {
        assert!(builtin("ramsey").is_none());
    }

    #[test]
    fn kaldor_default_fixed_point_is_stationary() {
        let definition = builtin("kaldor").expect("kaldor exists");
        let system = definition.compile().expect("compiles");
        let d = system
            .derivative(&[50.0, 100.0], 0.0, &definition.default_parameters())
            .expect("evaluates");
        assert!(d.iter().all(|v| v.abs() < 1e-12), "{d:?}");
    }

    #[test]
    fn solow_grows_below_steady_state() {
        let definition = builtin("solow").expect("solow exists");
        let system = definition.compile().expect("compiles");
        let d = system
            .derivative(&[1.0], 0.0, &definition.default_parameters())
            .expect("evaluates");
        // 0.2 * 1 - 0.06 * 1
        assert!((d[0] - 0.14).abs() < 1e-12);
    }
}
