//! Runs a saved chip library from the command line.

use std::{fs, path::PathBuf, process};

use chipsim_core::{Chip, Clock, ClockConfig, DocumentError, LogicSim, PartId, StateLoc};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Frame length used when running for a wall-clock duration.
const FRAME_SECONDS: f64 = 1.0 / 60.0;

#[derive(Debug, Parser)]
#[clap(author, version, about = "Simulate a chip from a saved library")]
struct Args {
    /// Library document (JSON).
    path: PathBuf,
    /// Chip to run instead of the one the document was viewing.
    #[clap(short, long)]
    chip: Option<String>,
    /// Number of ticks to run.
    #[clap(short, long, default_value_t = 1)]
    ticks: usize,
    /// Simulated seconds to run through the frame clock, instead of a fixed tick count.
    #[clap(long, conflicts_with = "ticks")]
    seconds: Option<f64>,
    /// Clock frequency in ticks per second, used with `--seconds`.
    #[clap(long, default_value_t = 60.0)]
    frequency: f64,
    /// Force an input pin, as `PIN=0` or `PIN=1`. PIN is a part name or an input index.
    #[clap(short, long = "set", value_parser = parse_assignment)]
    set: Vec<Assignment>,
    /// Print every tick, not just the final state.
    #[clap(long)]
    trace: bool,
    /// Increase log verbosity. Overridden by `RUST_LOG`.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, PartialEq)]
struct Assignment {
    pin: String,
    value: bool,
}

fn parse_assignment(s: &str) -> Result<Assignment, String> {
    let (pin, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PIN=VALUE, got \"{s}\""))?;
    let value = match value.trim() {
        "0" | "false" => false,
        "1" | "true" => true,
        other => return Err(format!("invalid pin value \"{other}\"")),
    };
    let pin = pin.trim();
    if pin.is_empty() {
        return Err("pin must not be empty".to_string());
    }

    Ok(Assignment {
        pin: pin.to_string(),
        value,
    })
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid library: {0}")]
    Document(#[from] DocumentError),
    #[error("no saved chip named \"{0}\"")]
    UnknownChip(String),
    #[error("chip has no input pin \"{0}\"")]
    UnknownPin(String),
    #[error("invalid clock configuration: {0}")]
    Clock(String),
}

/// Finds an input pin by part name, falling back to its index.
fn find_input(chip: &Chip, pin: &str) -> Option<PartId> {
    chip.inputs()
        .iter()
        .copied()
        .find(|id| chip.part(*id).name.as_deref() == Some(pin))
        .or_else(|| {
            pin.parse::<usize>()
                .ok()
                .and_then(|idx| chip.inputs().get(idx).copied())
        })
}

fn pin_label(chip: &Chip, id: PartId, idx: usize) -> String {
    chip.part(id)
        .name
        .clone()
        .unwrap_or_else(|| idx.to_string())
}

fn print_outputs(sim: &LogicSim, tick: usize) {
    let chip = sim.viewed();
    let values: Vec<String> = chip
        .outputs()
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            let value = sim
                .state_at(&StateLoc::part(*id))
                .map_or(false, |(cur, _)| cur);
            format!("{}={}", pin_label(chip, *id, idx), u8::from(value))
        })
        .collect();

    println!("{tick:>6}  {}", values.join(" "));
}

fn run(args: &Args) -> Result<(), CliError> {
    let json = fs::read_to_string(&args.path).map_err(|source| CliError::Read {
        path: args.path.clone(),
        source,
    })?;

    let mut sim = LogicSim::from_json(&json)?;
    info!(path = %args.path.display(), chips = sim.saved_chips().len(), "loaded library");

    if let Some(name) = &args.chip {
        let id = sim
            .find_chip(name)
            .ok_or_else(|| CliError::UnknownChip(name.clone()))?;
        sim.view_chip(id);
    }

    for assignment in &args.set {
        let pin = find_input(sim.viewed(), &assignment.pin)
            .ok_or_else(|| CliError::UnknownPin(assignment.pin.clone()))?;
        debug!(pin = %assignment.pin, value = assignment.value, "forcing input");
        sim.force(StateLoc::part(pin), assignment.value);
    }

    let mut ticks = 0;
    match args.seconds {
        Some(seconds) => {
            let config = ClockConfig::builder()
                .frequency(args.frequency)
                .build()
                .map_err(|err| CliError::Clock(err.to_string()))?;
            let mut clock = Clock::new(config);

            let mut elapsed = 0.0;
            while elapsed < seconds {
                let ran = clock.advance(&mut sim, FRAME_SECONDS);
                ticks += ran;
                elapsed += FRAME_SECONDS;
                if args.trace && ran > 0 {
                    print_outputs(&sim, ticks);
                }
            }
        }
        None => {
            for _ in 0..args.ticks {
                sim.tick();
                ticks += 1;
                if args.trace {
                    print_outputs(&sim, ticks);
                }
            }
        }
    }

    if !args.trace {
        print_outputs(&sim, ticks);
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&args) {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipsim_core::{chip::Placement, gate::Primitive};

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("carry=1"),
            Ok(Assignment {
                pin: "carry".to_string(),
                value: true,
            })
        );
        assert_eq!(
            parse_assignment(" 0 = false"),
            Ok(Assignment {
                pin: "0".to_string(),
                value: false,
            })
        );
        assert!(parse_assignment("carry").is_err());
        assert!(parse_assignment("carry=2").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn test_find_input() {
        let mut sim = LogicSim::new();
        let chip = sim.viewed_chip();
        let a = sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
        let b = sim.add_part(chip, Primitive::InputPin.into(), Placement::default());
        sim.set_part_name(chip, b, Some("enable".to_string()));

        assert_eq!(find_input(sim.viewed(), "0"), Some(a));
        assert_eq!(find_input(sim.viewed(), "enable"), Some(b));
        assert_eq!(find_input(sim.viewed(), "1"), Some(b));
        assert_eq!(find_input(sim.viewed(), "2"), None);
    }

    #[test]
    fn test_args() {
        let args =
            Args::try_parse_from(["chipsim", "lib.json", "-t", "4", "-s", "a=1", "-vv"]).unwrap();

        assert_eq!(args.ticks, 4);
        assert_eq!(args.verbose, 2);
        assert_eq!(
            args.set,
            vec![Assignment {
                pin: "a".to_string(),
                value: true,
            }]
        );
    }
}
