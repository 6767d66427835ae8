//! calcsql — SAP HANA Calculation View to SQL converter
//!
//! # Usage
//!
//! ```bash
//! # Convert one view, writing CV_COST.sql next to it
//! calcsql CV_COST.calculationview
//!
//! # Convert a whole package tree into a mirrored output directory
//! calcsql models/ --recursive --output sql/
//!
//! # Show what was extracted from a view
//! calcsql explain CV_COST.calculationview --json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use calcsql::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calcsql")]
#[command(version)]
#[command(about = "Convert SAP HANA Calculation Views into SQL WITH scripts", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_help = "EXAMPLES:
    calcsql CV_COST.calculationview
    calcsql models/ --recursive --output sql/
    calcsql explain CV_COST.calculationview")]
struct Cli {
    /// Calculation view file (.xml, .calculationview) or directory
    input: Option<PathBuf>,

    /// Output file, or output directory when converting a directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Descend into subdirectories (directory input only)
    #[arg(short, long)]
    recursive: bool,

    /// Configuration file (default: ./calcsql.toml)
    #[arg(short, long, env = "CALCSQL_CONFIG")]
    config: Option<PathBuf>,

    /// SQL expression substituted for "today" in filters
    #[arg(long)]
    date_function: Option<String>,

    /// Remove the comma after the last WITH block
    #[arg(long)]
    strip_trailing_comma: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the model extracted from a calculation view
    Explain {
        /// The calculation view file
        file: PathBuf,

        /// Print the model as JSON
        #[arg(long)]
        json: bool,

        /// Configuration file (default: ./calcsql.toml)
        #[arg(short, long, env = "CALCSQL_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Some(Commands::Explain { file, json, config }) => {
            explain(file, *json, config.as_deref()).map(|_| true)
        }
        None => match &cli.input {
            Some(input) => run(input, &cli),
            None => {
                println!("{}", "calcsql — Calculation View to SQL".cyan().bold());
                println!();
                println!("Usage: calcsql <INPUT> [OPTIONS]");
                println!();
                println!("Try: calcsql --help");
                Ok(true)
            }
        },
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "calcsql=debug" } else { "calcsql=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(date_function) = &cli.date_function {
        config.date_function = date_function.clone();
    }
    if cli.strip_trailing_comma {
        config.strip_trailing_comma = true;
    }
    Ok(config)
}

/// Convert every planned file. Returns `false` if any file failed.
fn run(input: &Path, cli: &Cli) -> Result<bool> {
    let config = load_config(cli)?;
    let jobs = calcsql::batch::plan(input, cli.output.as_deref(), cli.recursive, &config)?;

    if jobs.is_empty() {
        println!(
            "{} No {} files found in {}",
            "⚠".yellow(),
            config.extension_list(),
            input.display()
        );
        return Ok(true);
    }

    let mut summary = Summary::default();
    for job in &jobs {
        let outcome = calcsql::batch::run_job(job, &config);
        report(job, &outcome);
        summary.add(&outcome);
    }

    if jobs.len() > 1 {
        println!();
        println!(
            "{} converted, {} skipped, {} failed",
            summary.converted.to_string().green(),
            summary.skipped.to_string().yellow(),
            summary.failed.to_string().red()
        );
    }

    Ok(summary.failed == 0)
}

fn report(job: &Job, outcome: &FileOutcome) {
    let input = job.input.display().to_string();
    match outcome {
        FileOutcome::Written { diagnostics } => {
            let warnings = if diagnostics.is_empty() {
                String::new()
            } else {
                format!(" ({} warning(s))", diagnostics.len()).yellow().to_string()
            };
            println!(
                "{} {} → {}{}",
                "✓".green(),
                input,
                job.output.display().to_string().cyan(),
                warnings
            );
        }
        FileOutcome::Skipped { diagnostics } => {
            let reason = diagnostics
                .iter()
                .find(|d| d.view.is_none())
                .map(|d| d.kind.to_string())
                .unwrap_or_else(|| "nothing to convert".to_string());
            println!("{} {} skipped: {}", "⚠".yellow(), input, reason.dimmed());
        }
        FileOutcome::Failed(e) => {
            println!("{} {} {}", "✗".red(), input, e.to_string().red());
        }
    }
}

fn explain(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).context("failed to load configuration")?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let conversion = calcsql::convert(&content, &config)?;

    if json {
        let value = serde_json::json!({
            "model": conversion.model,
            "diagnostics": conversion.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let model = &conversion.model;
    println!("{} {}", "Calculation view:".cyan().bold(), file.display());
    println!();

    println!("{}", "Data sources:".green().bold());
    if model.data_sources.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (id, table) in model.data_sources.iter() {
        println!("  {} {} {}", id.white(), "→".dimmed(), table.yellow());
    }
    println!();

    println!("{}", "Nodes:".green().bold());
    for node in &model.nodes {
        match node {
            CalculationNode::Join(join) => {
                println!(
                    "  {} {} [{}]",
                    "Join".cyan(),
                    join.id.white().bold(),
                    join.join_kind().as_sql().yellow()
                );
                for input in &join.inputs {
                    print_input(input);
                }
                if !join.join_attributes.is_empty() {
                    println!("    {} {}", "on:".dimmed(), join.join_attributes.join(", "));
                }
            }
            CalculationNode::Projection(projection) => {
                println!("  {} {}", "Projection".cyan(), projection.id.white().bold());
                if let Some(input) = &projection.input {
                    print_input(input);
                }
                if let Some(filter) = &projection.filter {
                    println!("    {} {}", "filter:".dimmed(), filter.yellow());
                }
                for (id, formula) in &projection.calculated_attributes {
                    println!("    {} {} = {}", "calc:".dimmed(), id.white(), formula.dimmed());
                }
            }
        }
    }

    if !conversion.diagnostics.is_empty() {
        println!();
        println!("{}", "Diagnostics:".yellow().bold());
        for diagnostic in &conversion.diagnostics {
            let marker = match diagnostic.severity() {
                Severity::Skipped => "skipped".red(),
                Severity::Warning => "warning".yellow(),
            };
            println!("  [{}] {}", marker, diagnostic);
        }
    }

    if let Some(script) = &conversion.script {
        println!();
        println!("{}", "Generated SQL:".green().bold());
        println!("{}", script.white());
    }

    Ok(())
}

fn print_input(input: &NodeInput) {
    println!("    {} {}", input.alias.yellow(), input.source_ref.white());
    for mapping in &input.mappings {
        println!("      {} {} {}", mapping.source, "→".dimmed(), mapping.target);
    }
}
