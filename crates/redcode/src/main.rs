//! CLI entry point for the `mars` binary: assemble warriors, fight rounds.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use mars_core::{Mars, NullTracer, RecordingTracer, SimConfig, Tracer};
use redcode::assemble;

#[cfg(test)]
use tempfile as _;

const HELP_TEXT: &str = "\
Usage: mars <warrior.red>... [options]

Options:
  --coresize <n>   core size (default 8000)
  --cycles <n>     cycle cap per round (default 80000)
  --rounds <n>     number of rounds to fight (default 1)
  --seed <n>       placement seed (default 0)
  --trace <file>   write the last round's trace CSV to <file>
  --help           show this help";

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    warriors: Vec<PathBuf>,
    core_size: Option<u32>,
    max_cycles: Option<u32>,
    rounds: u32,
    seed: u64,
    trace: Option<PathBuf>,
}

#[derive(Debug)]
enum ParsedArgs {
    Args(CliArgs),
    Help,
}

fn numeric(args: &mut dyn Iterator<Item = OsString>, flag: &str) -> Result<u64, String> {
    let value = args
        .next()
        .ok_or_else(|| format!("missing value for {flag}"))?;
    value
        .to_string_lossy()
        .parse::<u64>()
        .map_err(|_| format!("invalid value for {flag}"))
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParsedArgs, String> {
    let mut warriors = Vec::new();
    let mut core_size = None;
    let mut max_cycles = None;
    let mut rounds = 1;
    let mut seed = 0;
    let mut trace = None;

    while let Some(arg) = args.next() {
        if arg == "--help" {
            return Ok(ParsedArgs::Help);
        }
        if arg == "--coresize" {
            let value = u32::try_from(numeric(&mut args, "--coresize")?)
                .map_err(|_| String::from("invalid value for --coresize"))?;
            core_size = Some(value);
            continue;
        }
        if arg == "--cycles" {
            max_cycles = Some(u32::try_from(numeric(&mut args, "--cycles")?)
                .map_err(|_| String::from("invalid value for --cycles"))?);
            continue;
        }
        if arg == "--rounds" {
            rounds = u32::try_from(numeric(&mut args, "--rounds")?)
                .map_err(|_| String::from("invalid value for --rounds"))?;
            continue;
        }
        if arg == "--seed" {
            seed = numeric(&mut args, "--seed")?;
            continue;
        }
        if arg == "--trace" {
            let value = args
                .next()
                .ok_or_else(|| String::from("missing value for --trace"))?;
            trace = Some(PathBuf::from(value));
            continue;
        }
        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }
        warriors.push(PathBuf::from(arg));
    }

    if warriors.is_empty() {
        return Err(String::from("no warrior files given"));
    }
    Ok(ParsedArgs::Args(CliArgs {
        warriors,
        core_size,
        max_cycles,
        rounds,
        seed,
        trace,
    }))
}

fn run_match(args: &CliArgs) -> Result<(), String> {
    let core_size = args.core_size.unwrap_or(mars_core::DEFAULT_CORE_SIZE);
    let config = SimConfig {
        core_size,
        max_cycles: args.max_cycles.unwrap_or(mars_core::DEFAULT_MAX_CYCLES),
        read_limit: core_size,
        write_limit: core_size,
        ..SimConfig::default()
    };
    config.validate().map_err(|error| error.to_string())?;

    let mut programs = Vec::with_capacity(args.warriors.len());
    for path in &args.warriors {
        let file = path.display().to_string();
        let source =
            fs::read_to_string(path).map_err(|error| format!("{file}: {error}"))?;
        let program =
            assemble(&source, &file, &config).map_err(|error| error.format_for_stderr())?;
        programs.push(program);
    }

    let mut wins = vec![0_u32; programs.len()];
    let mut draws = 0_u32;

    for round in 0..args.rounds {
        let mut mars = Mars::new(config.clone()).map_err(|error| error.to_string())?;
        mars.load_all(&programs, args.seed.wrapping_add(u64::from(round)))
            .map_err(|error| error.to_string())?;

        let last_round = round + 1 == args.rounds;
        let mut recorder = RecordingTracer::new();
        let mut null = NullTracer;
        let tracer: &mut dyn Tracer = if args.trace.is_some() && last_round {
            &mut recorder
        } else {
            &mut null
        };

        let outcome = mars.run_round(tracer);
        match outcome.winner {
            Some(pid) => {
                let warrior = &mars.warriors()[pid.0 as usize - 1];
                wins[pid.0 as usize - 1] += 1;
                println!(
                    "round {}: {} wins after {} cycles",
                    round + 1,
                    warrior.name,
                    outcome.cycles
                );
            }
            None => {
                draws += 1;
                println!("round {}: draw after {} cycles", round + 1, outcome.cycles);
            }
        }

        if let (Some(path), true) = (&args.trace, last_round) {
            fs::write(path, recorder.to_csv())
                .map_err(|error| format!("{}: {error}", path.display()))?;
        }
    }

    println!("--");
    for (index, program) in programs.iter().enumerate() {
        let name = program
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| format!("warrior {}", index + 1));
        println!("{name}: {} wins", wins[index]);
    }
    println!("draws: {draws}");
    Ok(())
}

fn main() -> ExitCode {
    match parse_args(env::args_os().skip(1)) {
        Ok(ParsedArgs::Help) => {
            println!("{HELP_TEXT}");
            ExitCode::SUCCESS
        }
        Ok(ParsedArgs::Args(args)) => match run_match(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        },
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{HELP_TEXT}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::Write as _;
    use std::path::PathBuf;

    use super::{parse_args, run_match, CliArgs, ParsedArgs};

    fn args(words: &[&str]) -> Result<ParsedArgs, String> {
        parse_args(words.iter().map(OsString::from))
    }

    #[test]
    fn parses_warrior_paths() {
        let result = args(&["imp.red", "dwarf.red"]).expect("parses");
        let ParsedArgs::Args(parsed) = result else {
            panic!("expected args");
        };
        assert_eq!(
            parsed,
            CliArgs {
                warriors: vec![PathBuf::from("imp.red"), PathBuf::from("dwarf.red")],
                core_size: None,
                max_cycles: None,
                rounds: 1,
                seed: 0,
                trace: None,
            }
        );
    }

    #[test]
    fn parses_options() {
        let result = args(&[
            "imp.red", "--coresize", "400", "--cycles", "1000", "--rounds", "5", "--seed", "7",
            "--trace", "out.csv",
        ])
        .expect("parses");
        let ParsedArgs::Args(parsed) = result else {
            panic!("expected args");
        };
        assert_eq!(parsed.core_size, Some(400));
        assert_eq!(parsed.max_cycles, Some(1000));
        assert_eq!(parsed.rounds, 5);
        assert_eq!(parsed.seed, 7);
        assert_eq!(parsed.trace, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn help_short_circuits() {
        assert!(matches!(args(&["--help"]), Ok(ParsedArgs::Help)));
        assert!(matches!(
            args(&["imp.red", "--help"]),
            Ok(ParsedArgs::Help)
        ));
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(args(&[]).is_err());
        assert!(args(&["--rounds", "2"]).is_err());
    }

    #[test]
    fn unknown_option_is_an_error() {
        assert!(args(&["imp.red", "--frobnicate"]).is_err());
    }

    #[test]
    fn missing_option_value_is_an_error() {
        assert!(args(&["imp.red", "--rounds"]).is_err());
        assert!(args(&["imp.red", "--rounds", "many"]).is_err());
    }

    #[test]
    fn runs_a_short_match_from_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let imp_path = dir.path().join("imp.red");
        let mut file = std::fs::File::create(&imp_path).expect("create");
        writeln!(file, ";name Imp\nMOV.I $0, $1").expect("write");

        let cli = CliArgs {
            warriors: vec![imp_path],
            core_size: Some(400),
            max_cycles: Some(100),
            rounds: 1,
            seed: 1,
            trace: None,
        };
        run_match(&cli).expect("match runs");
    }

    #[test]
    fn assembly_failure_surfaces_the_location() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad_path = dir.path().join("bad.red");
        std::fs::write(&bad_path, "MOV.QQ $0, $1\n").expect("write");

        let cli = CliArgs {
            warriors: vec![bad_path.clone()],
            core_size: None,
            max_cycles: None,
            rounds: 1,
            seed: 0,
            trace: None,
        };
        let error = run_match(&cli).expect_err("must fail");
        assert!(error.contains("bad.red:1:"));
        assert!(error.contains("bad modifier"));
    }
}
