/// Preview: run a pattern and print every output channel.
///
/// Usage: preview (<file> | -e <pattern>) [--seed <n>] [--config <file.ron>] [--runs <n>]
///
/// Each run after the first uses the next seed. Set RUST_LOG to see the
/// engine's tracing output.

use pattern_engine::core::engine::Engine;
use pattern_engine::core::output::Output;
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn print_usage() {
    println!("Usage: preview (<file> | -e <pattern>) [--seed <n>] [--config <file.ron>] [--runs <n>]");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    init_logging();

    let mut source = None;
    let mut name = String::from("inline");
    let mut seed = None;
    let mut config_path = None;
    let mut runs: u64 = 1;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-e" if i + 1 < args.len() => {
                i += 1;
                source = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = Some(args[i].parse().unwrap_or_else(|_| {
                    eprintln!("Invalid seed: {}", args[i]);
                    process::exit(1);
                }));
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--runs" if i + 1 < args.len() => {
                i += 1;
                runs = args[i].parse().unwrap_or(1).max(1);
            }
            path if !path.starts_with('-') && source.is_none() => {
                match std::fs::read_to_string(path) {
                    Ok(text) => source = Some(text),
                    Err(e) => {
                        eprintln!("ERROR: Failed to read '{}': {}", path, e);
                        process::exit(1);
                    }
                }
                name = path.to_string();
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(source) = source else {
        print_usage();
        process::exit(1);
    };

    let mut builder = Engine::builder();
    if let Some(path) = config_path {
        builder = builder.config_file(path);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let pattern = match Engine::compile(&name, &source) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let base_seed = engine.config().seed;
    for run in 0..runs {
        let seed = base_seed.wrapping_add(run);
        match engine.run_with_seed(&pattern, seed) {
            Ok(output) => print_output(seed, runs > 1, &output),
            Err(e) => {
                eprintln!("ERROR (seed {}): {}", seed, e);
                process::exit(1);
            }
        }
    }
}

fn print_output(seed: u64, show_seed: bool, output: &Output) {
    if show_seed {
        println!("--- seed {} ---", seed);
    }
    for (channel, text) in output.iter() {
        if channel == "main" {
            println!("{}", text);
        } else {
            println!("[{}] {}", channel, text);
        }
    }
}
