//! param-schema CLI
//!
//! Command-line interface for resolving payloads against schema declarations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use param_schema::{lint, load_json, load_schema, FileStatus, PolicyRegistry, Schema, Severity};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "param-schema")]
#[command(about = "Validate and coerce JSON payloads against declarative schemas")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a payload against one or more schema declarations
    Resolve {
        /// Payload file (a JSON object)
        payload: PathBuf,

        /// Schema declaration: file path or URL. Repeat to layer declarations,
        /// later ones merged over earlier ones.
        #[arg(long, short, required = true)]
        schema: Vec<String>,

        /// Print {"value": ..., "errors": [...]} instead of the bare value
        #[arg(long)]
        json: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the field structure of one or more merged declarations
    Structure {
        /// Schema declaration: file path or URL (repeatable)
        #[arg(long, short, required = true)]
        schema: Vec<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint declaration files (syntax, shape, unknown policies, bad arguments)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut registry = PolicyRegistry::with_builtins();
    registry.seal();

    let result = match cli.command {
        Commands::Resolve {
            payload,
            schema,
            json,
            output,
            pretty,
        } => run_resolve(&registry, &payload, &schema, json, output, pretty),

        Commands::Structure { schema, pretty } => run_structure(&registry, &schema, pretty),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&registry, &path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Initialize logging to stderr; `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("param_schema={}", level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load every declaration and merge them in order.
fn load_layers(registry: &PolicyRegistry, sources: &[String]) -> Result<Schema, u8> {
    let mut merged = Schema::empty();
    for source in sources {
        let layer = load_schema(source, registry).map_err(|e| {
            eprintln!("Error loading schema {}: {}", source, e);
            e.exit_code() as u8
        })?;
        merged = merged.merge(&layer);
    }
    debug!(layers = sources.len(), fields = merged.len(), "schema layers merged");
    Ok(merged)
}

fn to_json(value: &serde_json::Value, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn write_output(output: Option<&Path>, content: &str) -> Result<(), u8> {
    match output {
        Some(path) => std::fs::write(path, content).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

fn run_resolve(
    registry: &PolicyRegistry,
    payload_path: &Path,
    sources: &[String],
    json_output: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let schema = load_layers(registry, sources)?;

    let payload = load_json(payload_path).map_err(|e| {
        eprintln!("Error loading payload: {}", e);
        e.exit_code() as u8
    })?;
    let Some(payload) = payload.as_object() else {
        eprintln!(
            "Error: payload must be a JSON object, got {}",
            param_schema::json_type_name(&payload)
        );
        return Err(2);
    };

    let resolution = schema.resolve(payload);

    let rendered = if json_output {
        serde_json::to_value(&resolution).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?
    } else {
        serde_json::Value::Object(resolution.value.clone())
    };
    write_output(output.as_deref(), &to_json(&rendered, pretty)?)?;

    if resolution.is_valid() {
        Ok(())
    } else {
        eprintln!("Validation failed:");
        for error in &resolution.errors {
            eprintln!("  {}", error);
        }
        Err(1)
    }
}

fn run_structure(registry: &PolicyRegistry, sources: &[String], pretty: bool) -> Result<(), u8> {
    let schema = load_layers(registry, sources)?;
    write_output(None, &to_json(&schema.structure(), pretty)?)
}

fn run_lint(
    registry: &PolicyRegistry,
    path: &Path,
    format: &str,
    strict: bool,
    quiet: bool,
) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, registry, strict);

    if format == "json" {
        let rendered = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", rendered);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
