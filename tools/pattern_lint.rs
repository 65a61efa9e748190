/// Pattern Linter: checks pattern files for scope errors, unknown tags and
/// argument count mismatches without running them.
///
/// Usage: pattern_lint <file-or-dir>...

use pattern_engine::core::engine::Engine;
use pattern_engine::core::lint::{self, Severity};
use std::path::Path;
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: pattern_lint <file-or-dir>...");
        process::exit(0);
    }

    init_logging();

    let mut files = Vec::new();
    for arg in &args[1..] {
        let path = Path::new(arg);
        if path.is_file() {
            files.push(path.to_path_buf());
        } else if path.is_dir() {
            collect_patterns(path, &mut files);
        } else {
            eprintln!("ERROR: Path '{}' does not exist", arg);
            process::exit(1);
        }
    }

    let mut errors = 0;
    let mut warnings = 0;
    for file in &files {
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                println!("{}: ERROR: {}", file.display(), e);
                errors += 1;
                continue;
            }
        };
        let name = file.display().to_string();
        let pattern = match Engine::compile(&name, &source) {
            Ok(pattern) => pattern,
            Err(e) => {
                println!("{}: ERROR: {}", name, e);
                errors += 1;
                continue;
            }
        };
        for diagnostic in lint::check(&pattern) {
            match diagnostic.severity {
                Severity::Error => errors += 1,
                Severity::Warning => warnings += 1,
            }
            println!("{}: {}", name, diagnostic);
        }
    }

    println!(
        "\nChecked {} files: {} errors, {} warnings",
        files.len(),
        errors,
        warnings
    );

    if errors > 0 {
        process::exit(1);
    }
}

/// Every `.pattern` or `.txt` file under `dir`.
fn collect_patterns(dir: &Path, files: &mut Vec<std::path::PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_patterns(&path, files);
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("pattern") | Some("txt")
            ) {
                files.push(path);
            }
        }
    }
}
