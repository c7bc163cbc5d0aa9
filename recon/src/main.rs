//! `recon`: run a steering file through the event-processing pipeline.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use recon::exit_codes;
use recon::io::config::load_steering;
use recon::launch::{Overrides, parse_var, print_path, run_steering};
use recon::logging;
use recon::modules::default_registry;
use recon::runner::{RunError, format_wall_time};

#[derive(Parser)]
#[command(
    name = "recon",
    version,
    about = "Sequential event-processing pipeline for reconstruction runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process events as configured by a steering file.
    Run {
        steering: PathBuf,
        /// Override `run.max_events`.
        #[arg(long)]
        max_events: Option<u64>,
        /// Override `run.skip_events`.
        #[arg(long)]
        skip_events: Option<u64>,
        /// Set a file-name template variable (`key=value`, repeatable).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Print the module path a steering file describes.
    PrintPath { steering: PathBuf },
    /// List the registered module identifiers.
    Modules,
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            steering,
            max_events,
            skip_events,
            vars,
        } => cmd_run(&steering, max_events, skip_events, &vars),
        Command::PrintPath { steering } => report(cmd_print_path(&steering)),
        Command::Modules => report(cmd_modules()),
    };
    std::process::exit(code);
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    }
}

fn cmd_run(
    steering: &Path,
    max_events: Option<u64>,
    skip_events: Option<u64>,
    vars: &[String],
) -> i32 {
    let mut cfg = match load_steering(steering) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };
    let overrides = vars
        .iter()
        .map(|raw| parse_var(raw))
        .collect::<Result<Vec<_>>>()
        .map(|vars| Overrides {
            max_events,
            skip_events,
            vars,
        })
        .and_then(|overrides| overrides.apply(&mut cfg));
    if let Err(err) = overrides {
        eprintln!("{err:#}");
        return exit_codes::INVALID;
    }
    if let Err(err) = logging::init(&cfg.logging) {
        eprintln!("{err:#}");
        return exit_codes::INVALID;
    }

    match run_steering(&cfg) {
        Ok(report) => {
            print!("{}", report.statistics.render_table());
            println!(
                "wall time: {}",
                format_wall_time(report.statistics.wall_time_us)
            );
            for path in &report.outputs.written {
                println!("wrote {}", path.display());
            }
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{err:#}");
            match err.downcast_ref::<RunError>() {
                Some(run_err) => {
                    if let Some(statistics) = run_err.statistics() {
                        eprint!("{}", statistics.render_table());
                    }
                    match run_err {
                        RunError::Initialization { .. } | RunError::Processing { .. } => {
                            exit_codes::ABORTED
                        }
                        _ => exit_codes::INVALID,
                    }
                }
                None => exit_codes::INVALID,
            }
        }
    }
}

fn cmd_print_path(steering: &Path) -> Result<()> {
    let cfg = load_steering(steering)?;
    print!("{}", print_path(&cfg)?);
    Ok(())
}

fn cmd_modules() -> Result<()> {
    for (id, description) in default_registry().list() {
        println!("{id:<14} {description}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "recon",
            "run",
            "steering.toml",
            "--max-events",
            "1000",
            "--var",
            "iteration=3",
            "--var",
            "tag=x",
        ])
        .expect("parse");
        match cli.command {
            Command::Run {
                steering,
                max_events,
                skip_events,
                vars,
            } => {
                assert_eq!(steering, PathBuf::from("steering.toml"));
                assert_eq!(max_events, Some(1000));
                assert_eq!(skip_events, None);
                assert_eq!(vars, vec!["iteration=3", "tag=x"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_print_path_and_modules() {
        let cli = Cli::try_parse_from(["recon", "print-path", "s.toml"]).expect("parse");
        assert!(matches!(cli.command, Command::PrintPath { .. }));
        let cli = Cli::try_parse_from(["recon", "modules"]).expect("parse");
        assert!(matches!(cli.command, Command::Modules));
    }
}
