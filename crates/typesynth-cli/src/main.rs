//! typesynth command line.
//!
//! Provides the `typesynth` binary. `synth` loads package descriptions
//! (JSON files holding `{"package": ..., "types": [...]}`), runs the full
//! synthesis pipeline and prints the emitted definitions with the run
//! report as JSON. `check` stops after analysis and prints the synthesis
//! order, the per-type plans and every failure.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use typesynth_check::{analyze, PlannedUnit, SynthesisPlan};
use typesynth_codegen::{
    synthesize, Definition, Family, SynthOptions, SynthesisReport, VecEmitter,
};
use typesynth_core::error::{CoreError, FailureLog};
use typesynth_core::types::TypeEntry;
use typesynth_core::universe::{PackageLoader, StaticPackage, Universe, UniverseBuilder};

/// Structural transformation synthesizer.
#[derive(Parser)]
#[command(name = "typesynth", about = "Synthesize clone, plain, patch and validator definitions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Synthesize definitions for every type of the given packages.
    Synth {
        #[command(flatten)]
        input: Input,

        /// JSON file with synthesis options.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Families to synthesize (repeatable); overrides the config file.
        #[arg(short, long, value_parser = parse_family)]
        family: Vec<Family>,

        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze packages and report order, plans and failures.
    Check {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(clap::Args)]
struct Input {
    /// Package description file (repeatable).
    #[arg(short, long = "package", required = true)]
    packages: Vec<PathBuf>,

    /// Worker threads for loading and synthesis (default: one per CPU).
    #[arg(short, long, env = "TYPESYNTH_WORKERS")]
    workers: Option<usize>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
}

/// A package description read from a JSON file.
struct FilePackage {
    path: PathBuf,
    label: String,
}

impl FilePackage {
    fn new(path: &Path) -> Self {
        FilePackage {
            path: path.to_path_buf(),
            label: path.display().to_string(),
        }
    }
}

impl PackageLoader for FilePackage {
    fn package(&self) -> &str {
        &self.label
    }

    fn load(&self) -> Result<Vec<TypeEntry>, CoreError> {
        let failed = |reason: String| CoreError::PackageLoad {
            package: self.label.clone(),
            reason,
        };
        let text = fs::read_to_string(&self.path).map_err(|e| failed(e.to_string()))?;
        let package: StaticPackage =
            serde_json::from_str(&text).map_err(|e| failed(e.to_string()))?;
        tracing::debug!(file = %self.label, package = %package.package, "parsed package file");
        package.load()
    }
}

#[derive(Serialize)]
struct SynthOutput<'a> {
    definitions: &'a [Definition],
    report: &'a SynthesisReport,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    units: &'a [PlannedUnit],
    plans: Vec<&'a SynthesisPlan>,
    failures: &'a FailureLog,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Synth {
            input,
            config,
            family,
            output,
        } => run_synth(&input, config.as_deref(), family, output.as_deref()),
        Commands::Check { input } => run_check(&input),
    };
    process::exit(exit_code);
}

/// Execute the synth subcommand.
///
/// Returns exit code: 0 = success, 1 = input or option error,
/// 2 = some types failed (their definitions are missing from the output).
fn run_synth(
    input: &Input,
    config: Option<&Path>,
    families: Vec<Family>,
    output: Option<&Path>,
) -> i32 {
    let mut options = match config {
        Some(path) => match load_options(path) {
            Ok(o) => o,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return 1;
            }
        },
        None => SynthOptions::default(),
    };
    if !families.is_empty() {
        options.families = families;
    }
    if let Some(workers) = input.workers {
        options.workers = workers;
    }

    let universe = match load_universe(input) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut emitter = VecEmitter::new();
    let report = match synthesize(&universe, &options, &mut emitter) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let result = SynthOutput {
        definitions: &emitter.definitions,
        report: &report,
    };
    if let Err(msg) = write_json(&result, input.pretty, output) {
        eprintln!("Error: {}", msg);
        return 1;
    }

    if report.is_success() {
        0
    } else {
        print_failures(&report.failures);
        2
    }
}

/// Execute the check subcommand. Exit codes as for `synth`.
fn run_check(input: &Input) -> i32 {
    let universe = match load_universe(input) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let analysis = analyze(&universe);
    let classification = &analysis.classification;
    let result = CheckOutput {
        units: &classification.units,
        plans: classification.plans.values().collect(),
        failures: &classification.failures,
    };
    if let Err(msg) = write_json(&result, input.pretty, None) {
        eprintln!("Error: {}", msg);
        return 1;
    }

    if classification.failures.is_empty() {
        0
    } else {
        print_failures(&classification.failures);
        2
    }
}

fn load_universe(input: &Input) -> Result<Universe, CoreError> {
    let loaders: Vec<Box<dyn PackageLoader>> = input
        .packages
        .iter()
        .map(|p| Box::new(FilePackage::new(p)) as Box<dyn PackageLoader>)
        .collect();
    let builder = match input.workers {
        Some(n) if n > 0 => UniverseBuilder::new(n),
        _ => UniverseBuilder::default(),
    };
    let universe = builder.load_all(&loaders)?;
    tracing::info!(packages = loaders.len(), types = universe.len(), "universe loaded");
    Ok(universe)
}

fn load_options(path: &Path) -> Result<SynthOptions, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("invalid config '{}': {}", path.display(), e))
}

fn write_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<(), String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| format!("failed to serialize result: {}", e))?;

    match output {
        Some(path) => fs::write(path, json + "\n")
            .map_err(|e| format!("failed to write '{}': {}", path.display(), e)),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

fn print_failures(failures: &FailureLog) {
    eprintln!("{} type(s) failed:", failures.len());
    for (name, errors) in failures.iter() {
        for err in errors {
            eprintln!("  - {}: {}", name, err);
        }
    }
}

/// Parse a family name as used on the command line and in config files.
fn parse_family(s: &str) -> Result<Family, String> {
    match s {
        "clone" => Ok(Family::Clone),
        "plain" => Ok(Family::Plain),
        "patch" => Ok(Family::Patch),
        "validator" | "validate" => Ok(Family::Validator),
        _ => Err(format!(
            "invalid family '{}', expected clone/plain/patch/validator",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesynth_core::id::QualifiedName;

    #[test]
    fn family_names_parse() {
        assert_eq!(parse_family("clone"), Ok(Family::Clone));
        assert_eq!(parse_family("validate"), Ok(Family::Validator));
        assert!(parse_family("copy").is_err());
    }

    #[test]
    fn file_package_reads_json() {
        let path = std::env::temp_dir().join(format!("typesynth-cli-{}.json", process::id()));
        fs::write(
            &path,
            r#"{"package": "m", "types": [
                {"name": {"package": "m", "name": "Point"},
                 "kind": {"record": {"fields": [{"name": "x", "ty": {"scalar": "int"}}]}}}
            ]}"#,
        )
        .unwrap();
        let loaded = FilePackage::new(&path).load();
        fs::remove_file(&path).unwrap();
        let entries = loaded.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, QualifiedName::new("m", "Point"));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let loader = FilePackage::new(Path::new("/nonexistent/typesynth.json"));
        assert!(matches!(loader.load(), Err(CoreError::PackageLoad { .. })));
    }
}
