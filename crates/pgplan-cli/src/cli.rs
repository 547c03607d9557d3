//! pgplan - analyze PostgreSQL EXPLAIN output from the terminal
//!
//! Reads a plan from a file or stdin, runs the analyzer and prints either
//! a human-readable report or the JSON report.

mod logging;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pgplan_analyzer::{
    AnalyzerConfig, AnalyzerError, ErrorResponse, FormatHint, Language, PlanAnalyzer,
    parse_explain, render_explain_json,
};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Exit codes
mod exit_codes {
    /// Analysis finished
    pub const SUCCESS: i32 = 0;

    /// I/O, configuration or internal failure
    pub const FAILURE: i32 = 1;

    /// The plan itself was rejected
    pub const INPUT_ERROR: i32 = 2;
}

const CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "pgplan")]
#[command(version)]
#[command(about = "Analyze PostgreSQL EXPLAIN plans", long_about = None)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Analyzer config file (defaults to <config dir>/pgplan/config.toml)
    #[arg(long, global = true, env = "PGPLAN_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Format of the log lines on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a plan and print recommendations
    Analyze {
        /// EXPLAIN output file; reads stdin when omitted or "-"
        file: Option<PathBuf>,

        /// Input format: auto, json or text
        #[arg(short, long, default_value_t = FormatHint::Auto)]
        format: FormatHint,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputMode::Human)]
        output: OutputMode,

        /// Language of the human report: en or zh
        #[arg(long, default_value_t = Language::En)]
        lang: Language,
    },

    /// Parse a plan and print it as EXPLAIN (FORMAT JSON)
    Convert {
        /// EXPLAIN output file; reads stdin when omitted or "-"
        file: Option<PathBuf>,

        /// Input format: auto, json or text
        #[arg(short, long, default_value_t = FormatHint::Auto)]
        format: FormatHint,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn logging_config(verbose: bool, format: LogFormat) -> logging::LoggingConfig {
    let config = if verbose {
        logging::LoggingConfig::verbose()
    } else {
        logging::LoggingConfig::default()
    };
    config.with_json(format == LogFormat::Json)
}

fn main() {
    let cli = Cli::parse();

    let logging = logging_config(cli.verbose, cli.log_format);
    if let Err(e) = logging::init(&logging) {
        eprintln!("Warning: failed to initialize logging: {e:#}");
    }

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_codes::FAILURE
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Analyze {
            file,
            format,
            output,
            lang,
        } => {
            let config = resolve_config(cli.config.as_deref(), dirs::config_dir().as_deref())?;
            let input = read_input(file.as_deref())?;
            let analyzer = PlanAnalyzer::with_config(config);

            match analyzer.analyze_str(&input, format) {
                Ok(report) => {
                    match output {
                        OutputMode::Human => print!("{}", render::render_report(&report, lang)),
                        OutputMode::Json => println!("{}", report.to_json_pretty()?),
                    }
                    Ok(exit_codes::SUCCESS)
                }
                Err(err) => report_error(&err, output, lang),
            }
        }
        Commands::Convert { file, format } => {
            let input = read_input(file.as_deref())?;
            match parse_explain(&input, format) {
                Ok(plan) => {
                    let json = serde_json::to_string_pretty(&render_explain_json(&plan))
                        .context("Failed to serialize plan")?;
                    println!("{}", json);
                    Ok(exit_codes::SUCCESS)
                }
                Err(err) => report_error(&err, OutputMode::Human, Language::En),
            }
        }
    }
}

/// Prints an analyzer error and returns the matching exit code
fn report_error(err: &AnalyzerError, output: OutputMode, language: Language) -> Result<i32> {
    let response = ErrorResponse::from_error(err);
    match output {
        OutputMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialize error")?
        ),
        OutputMode::Human => eprintln!("Error: {}", response.error.get(language)),
    }
    Ok(exit_code_for(err))
}

fn exit_code_for(err: &AnalyzerError) -> i32 {
    if err.is_input_error() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::FAILURE
    }
}

/// Picks the analyzer config: explicit path, then the user config file, then defaults
fn resolve_config(explicit: Option<&Path>, config_dir: Option<&Path>) -> Result<AnalyzerConfig> {
    if let Some(path) = explicit {
        return AnalyzerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    if let Some(path) = config_dir.map(|dir| dir.join("pgplan").join(CONFIG_FILE))
        && path.is_file()
    {
        tracing::debug!(path = %path.display(), "using user config");
        return AnalyzerConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    Ok(AnalyzerConfig::default())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan from {}", path.display())),
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read plan from stdin")?;
            Ok(input)
        }
    }
}
