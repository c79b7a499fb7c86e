//! BenchRunner CLI Entry Point
//!
//! Provides the command-line interface for running benchmark sweeps and
//! aggregating measurement logs.
//!
//! # Usage
//!
//! ```bash
//! # Run the full sweep and aggregate afterwards
//! benchrunner bench.yaml
//!
//! # With a stop-flag file checked between runs
//! benchrunner bench.yaml /tmp/stop.flag
//!
//! # Preview launch commands without executing
//! benchrunner bench.yaml --dry-run
//!
//! # Only rebuild the summary tables from existing logs
//! benchrunner bench.yaml --aggregate-only
//!
//! # Override the measurements directory
//! benchrunner bench.yaml --measurements-dir /data/measurements
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use colored::Colorize;
use log::{error, info};

use benchrunner::aggregate::Aggregator;
use benchrunner::config::{format_value, load_config, LaunchSpec};
use benchrunner::sweep::ExperimentSweep;
use benchrunner::{APP_NAME, VERSION};

/// Default configuration file used when none is specified.
const DEFAULT_CONFIG: &str = "bench.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    config_path: String,
    stop_flag_path: Option<String>,
    dry_run: bool,
    aggregate_only: bool,
    measurements_dir: Option<PathBuf>,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG.to_string(),
            stop_flag_path: None,
            dry_run: false,
            aggregate_only: false,
            measurements_dir: None,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Concurrency Model Benchmark Driver");
    println!("Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: benchrunner [OPTIONS] <CONFIG_FILE> [STOP_FLAG_PATH]");
    println!();
    println!("Arguments:");
    println!("  <CONFIG_FILE>     Path to benchmark YAML (or JSON) file");
    println!("  [STOP_FLAG_PATH]  Optional stop-flag file checked between runs");
    println!();
    println!("Options:");
    println!("  --dry-run               Preview launch commands without execution");
    println!("  --aggregate-only        Rebuild summary tables from existing logs");
    println!("  --measurements-dir DIR  Override the measurements directory");
    println!("  --verbose               Enable debug logging");
    println!("  --help                  Show this help message");
    println!("  --version               Show version information");
    println!();
    println!("Examples:");
    println!("  benchrunner bench.yaml");
    println!("  benchrunner bench.yaml --dry-run");
    println!("  benchrunner bench.yaml --aggregate-only --measurements-dir /data/measurements");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--aggregate-only" => {
                config.aggregate_only = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--measurements-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--measurements-dir requires a path argument".to_string());
                }
                config.measurements_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.config_path = arg.clone(),
                    1 => config.stop_flag_path = Some(arg.clone()),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Prints the materialized launch plan of every run without executing.
fn print_dry_run(bench: &benchrunner::BenchConfig) {
    for value in bench.parameter.expand() {
        let value_str = format_value(value);
        println!();
        println!("[DRY RUN] {} = {}", bench.parameter.name, value_str);

        if let Some(ref generator) = bench.data_generator {
            println!("  Data generator: {} {:?}", generator.program, generator.args);
        }

        for algorithm in &bench.algorithms {
            match &algorithm.launch {
                LaunchSpec::Process { program, args, env } => {
                    println!("  Algorithm: {}", algorithm.id);
                    println!("    Process: {}", program);
                    println!(
                        "    Args: {:?}",
                        args.iter()
                            .map(|a| a.replace("{value}", &value_str))
                            .collect::<Vec<_>>()
                    );
                    if !env.is_empty() {
                        println!("    Env: {:?}", env);
                    }
                }
                LaunchSpec::Container {
                    image, container, ..
                } => {
                    println!("  Algorithm: {}", algorithm.id);
                    println!("    Image: {}", image);
                    println!("    Container: {}", container);
                }
            }
        }
    }
    println!();
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    // Load benchmark definition
    info!("Loading benchmark config: {}", config.config_path);
    let mut bench = load_config(&config.config_path).map_err(|e| {
        error!("Failed to load config: {}", e);
        format!(
            "Could not load benchmark config from '{}': {}",
            config.config_path, e
        )
    })?;

    if let Some(dir) = config.measurements_dir {
        bench.measurements_dir = dir;
    }

    info!(
        "Benchmark loaded: {} algorithms, {} parameter values, logs in {}",
        bench.algorithms.len(),
        bench.parameter.expand().len(),
        bench.measurements_dir.display()
    );

    if config.dry_run {
        info!("Mode: DRY RUN (targets will not be launched)");
        print_dry_run(&bench);
        return Ok(());
    }

    let algorithms: Vec<String> = bench.algorithms.iter().map(|a| a.id.clone()).collect();
    let parameter_name = bench.parameter.name.clone();
    let measurements_dir = bench.measurements_dir.clone();

    if !config.aggregate_only {
        if let Some(ref path) = config.stop_flag_path {
            info!("Stop control: {}", path);
        }

        let mut sweep = ExperimentSweep::new(bench);
        if let Some(path) = config.stop_flag_path {
            sweep.set_stop_flag_path(path);
        }
        sweep.execute()?;
    }

    let written = Aggregator::new(measurements_dir, parameter_name, algorithms).aggregate()?;

    println!();
    println!("{}", "Benchmark complete".green().bold());
    for table in written {
        println!("  {}", table.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
