//! econdyn: run a scenario file and stream plot frames as JSON lines.
//!
//! Usage: `econdyn <scenario.(json|toml)> [--equilibrium]` or
//! `econdyn --list-models`. Logs go to stderr; `RUST_LOG` sets the level.

use anyhow::{bail, Context, Result};
use econdyn_core::config::ScenarioConfig;
use econdyn_core::equilibrium::{solve_equilibrium, NewtonSettings};
use econdyn_core::models::MODEL_NAMES;
use econdyn_core::render::JsonLinesRenderer;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq)]
enum Command {
    Run { scenario: PathBuf, equilibrium: bool },
    ListModels,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command> {
    let mut scenario = None;
    let mut equilibrium = false;
    for arg in args {
        match arg.as_str() {
            "--equilibrium" => equilibrium = true,
            "--list-models" => return Ok(Command::ListModels),
            flag if flag.starts_with("--") => bail!("Unknown flag: {flag}"),
            path => {
                if scenario.replace(PathBuf::from(path)).is_some() {
                    bail!("Expected a single scenario file");
                }
            }
        }
    }
    match scenario {
        Some(scenario) => Ok(Command::Run {
            scenario,
            equilibrium,
        }),
        None => bail!("Usage: econdyn <scenario.(json|toml)> [--equilibrium]"),
    }
}

fn run(scenario: PathBuf, equilibrium: bool) -> Result<()> {
    let config = ScenarioConfig::load(&scenario)
        .with_context(|| format!("Failed to load scenario {}", scenario.display()))?;
    let definition = config.definition()?;
    let mut sweep = config.build()?;
    tracing::info!(model = %definition.name, overrides = config.overrides.len(), "running scenario");

    let stdout = std::io::stdout();
    let mut renderer = JsonLinesRenderer::new(stdout.lock());
    sweep.initialize(&mut renderer)?;
    let applied = sweep
        .process(&config.overrides, &mut renderer)
        .context("Failed to apply parameter overrides")?;
    tracing::debug!(applied, "overrides applied");

    if equilibrium {
        let guess = match (&config.equilibrium_guess, sweep.trajectory()) {
            (Some(guess), _) => guess.clone(),
            (None, Some(trajectory)) => trajectory
                .final_state()
                .map(<[f64]>::to_vec)
                .context("Trajectory is empty")?,
            (None, None) => bail!("No trajectory to start the equilibrium search from"),
        };

        let mut system = sweep.derivative().clone();
        system.bind(sweep.parameters())?;
        let result = solve_equilibrium(&system, &guess, NewtonSettings::default())
            .context("Equilibrium solve failed")?;
        tracing::info!(
            state = ?result.state,
            stability = ?result.stability.kind,
            "equilibrium found"
        );

        let mut out = renderer.into_inner();
        serde_json::to_writer(&mut out, &serde_json::json!({ "equilibrium": result }))?;
        writeln!(out)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match parse_args(std::env::args().skip(1))? {
        Command::ListModels => {
            for name in MODEL_NAMES {
                println!("{name}");
            }
            Ok(())
        }
        Command::Run {
            scenario,
            equilibrium,
        } => run(scenario, equilibrium),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_scenario_and_flag_in_any_order() {
        let expected = Command::Run {
            scenario: PathBuf::from("kaldor.toml"),
            equilibrium: true,
        };
        assert_eq!(parse_args(args(&["kaldor.toml", "--equilibrium"])).ok(), Some(expected));
        assert_eq!(
            parse_args(args(&["--equilibrium", "kaldor.toml"])).ok(),
            Some(Command::Run {
                scenario: PathBuf::from("kaldor.toml"),
                equilibrium: true,
            })
        );
    }

    #[test]
    fn rejects_missing_or_extra_arguments() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
        assert!(parse_args(args(&["a.json", "--verbose"])).is_err());
    }

    #[test]
    fn list_models_needs_no_scenario() {
        assert_eq!(parse_args(args(&["--list-models"])).ok(), Some(Command::ListModels));
    }
}
