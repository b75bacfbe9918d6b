use anyhow::{Context, bail};
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use serde_json::{Map, Value, json};
use std::io::{Read, stdout};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wildsense::knowledge::InMemoryKnowledgeStore;
use wildsense::schema::{IdentificationReport, ThreatReport};
use wildsense::threat::ThreatLevel;
use wildsense::{DetectionEngine, EngineConfig, Ruleset};

const LOG_ENV: &str = "WILDSENSE_LOG";

#[derive(Parser)]
#[command(
    name = "wildsense",
    about = "Threat assessment and species consensus over detector output",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess the threat level of recorded detections
    Assess(AssessArgs),
    /// Fuse per-source predictions into a ranked identification
    Identify(IdentifyArgs),
    /// Print the JSON Schema of both reports
    Schema,
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct AssessArgs {
    /// Detections as JSON; reads stdin when omitted
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output JSON (stable schema)
    #[arg(long)]
    json: bool,

    /// Comma-separated top-level keys to include in JSON output
    #[arg(long, value_name = "list", requires = "json")]
    fields: Option<String>,
}

#[derive(Args, Clone)]
struct IdentifyArgs {
    /// Predictions as JSON; reads stdin when omitted
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Knowledge store as a JSON array of records
    #[arg(long, value_name = "STORE")]
    store: Option<PathBuf>,

    /// Number of ranked results to keep
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Output JSON (stable schema)
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Print the config file location only
    #[arg(long)]
    path: bool,
}

fn init_tracing(verbose: bool, color: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .try_init();
}

fn read_payload(input: Option<&Path>) -> anyhow::Result<Value> {
    let content = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    if content.trim().is_empty() {
        bail!("no input: expected a JSON detection payload");
    }
    serde_json::from_str(&content).context("input is not valid JSON")
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_path(path)?),
        None => Ok(EngineConfig::load()),
    }
}

fn filter_json_fields(value: Value, fields: &str) -> Result<Value, String> {
    let requested: Vec<&str> = fields
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let obj = value
        .as_object()
        .ok_or_else(|| "expected object".to_string())?;
    let mut map = Map::new();
    for k in requested {
        if let Some(v) = obj.get(k) {
            map.insert(k.to_string(), v.clone());
        } else {
            return Err(format!("unknown field: {}", k));
        }
    }
    Ok(Value::Object(map))
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_string()
    }
}

fn colorize_level(level: ThreatLevel, color: bool) -> String {
    let label = level.as_str().to_uppercase();
    if !color {
        return label;
    }
    match level {
        ThreatLevel::Critical => label.red().bold().to_string(),
        ThreatLevel::High => label.red().to_string(),
        ThreatLevel::Medium => label.yellow().to_string(),
        ThreatLevel::Low => label.blue().to_string(),
        ThreatLevel::None => label.green().to_string(),
    }
}

fn push_list(out: &mut String, title: &str, items: &[String], color: bool) {
    if items.is_empty() {
        return;
    }
    out.push('\n');
    out.push_str(&heading(title, color));
    for item in items {
        out.push_str("\n  - ");
        out.push_str(item);
    }
}

fn render_threat(report: &ThreatReport, color: bool) -> String {
    let mut out = format!(
        "{} {} (score {:.2})\n{} {}",
        heading("Threat level:", color),
        colorize_level(report.threat_level, color),
        report.threat_score,
        heading("Evidence:", color),
        report.evidence_description
    );
    push_list(&mut out, "Activities:", &report.detected_activities, color);
    push_list(&mut out, "Suspicious objects:", &report.suspicious_objects, color);
    push_list(&mut out, "Recommendations:", &report.recommendations, color);
    out
}

fn render_identification(report: &IdentificationReport, color: bool) -> String {
    let consensus = &report.consensus;
    let mut out = format!(
        "{} {} ({:.0}% agreement; sources: {})",
        heading("Consensus:", color),
        format!("{:?}", consensus.consensus_level).to_uppercase(),
        consensus.agreement * 100.0,
        if consensus.responding_sources.is_empty() {
            "none".to_string()
        } else {
            consensus.responding_sources.join(", ")
        }
    );

    if report.results.is_empty() {
        out.push_str("\nNo identification");
    }
    for (rank, record) in report.results.iter().enumerate() {
        let result = &record.result;
        let name = if color {
            result.entity_name.bold().to_string()
        } else {
            result.entity_name.clone()
        };
        let sources: Vec<&str> = result.contributing_sources.iter().map(String::as_str).collect();
        out.push_str(&format!(
            "\n{}. {} {:.0}% (votes: {}; {})",
            rank + 1,
            name,
            result.confidence * 100.0,
            result.vote_count,
            sources.join(", ")
        ));
        let details = &record.details;
        if details.enriched {
            out.push_str(&format!(
                "\n   {} - {}",
                details.scientific_name, details.conservation_status
            ));
        } else {
            out.push_str(&format!("\n   {}", details.scientific_name));
        }
    }

    out.push('\n');
    out.push_str(&heading("Notes:", color));
    out.push(' ');
    out.push_str(&consensus.verification_notes);

    let failures: Vec<String> = report
        .failed_sources
        .iter()
        .map(|f| f.reason.clone())
        .collect();
    push_list(&mut out, "Failed sources:", &failures, color);
    out
}

fn print_json(value: &Value) -> Result<(), i32> {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            Ok(())
        }
        Err(_) => Err(3),
    }
}

fn run_assess(
    args: AssessArgs,
    config: &EngineConfig,
    color: bool,
) -> Result<(), i32> {
    let report = (|| -> anyhow::Result<ThreatReport> {
        let payload = read_payload(args.input.as_deref())?;
        let engine = DetectionEngine::new(Ruleset::shared(config)?);
        Ok(engine.assess_payload(&payload)?)
    })()
    .map_err(|e| {
        eprintln!("{:#}", e);
        2
    })?;

    if args.json {
        let mut v = serde_json::to_value(&report).map_err(|_| 3)?;
        if let Some(f) = args.fields.as_deref() {
            v = filter_json_fields(v, f).map_err(|e| {
                eprintln!("{}", e);
                2
            })?;
        }
        print_json(&v)
    } else {
        println!("{}", render_threat(&report, color));
        Ok(())
    }
}

fn run_identify(
    args: IdentifyArgs,
    config: &EngineConfig,
    color: bool,
) -> Result<(), i32> {
    let report = (|| -> anyhow::Result<IdentificationReport> {
        let payload = read_payload(args.input.as_deref())?;
        let mut engine = DetectionEngine::new(Ruleset::shared(config)?);
        if let Some(path) = args.store.as_deref() {
            match InMemoryKnowledgeStore::from_json_file(path) {
                Ok(store) => engine = engine.with_knowledge_store(store),
                Err(e) => warn!(error = %e, "knowledge store unavailable, results will not be enriched"),
            }
        }
        if args.top == Some(0) {
            bail!("--top must be at least 1");
        }
        Ok(engine.identify_payload(&payload, args.top)?)
    })()
    .map_err(|e| {
        eprintln!("{:#}", e);
        2
    })?;

    if args.json {
        let v = serde_json::to_value(&report).map_err(|_| 3)?;
        print_json(&v)
    } else {
        println!("{}", render_identification(&report, color));
        Ok(())
    }
}

fn run_schema() -> Result<(), i32> {
    let v = json!({
        "threatReport": schemars::schema_for!(ThreatReport),
        "identificationReport": schemars::schema_for!(IdentificationReport),
    });
    print_json(&v)
}

fn run_config(args: ConfigArgs, config: &EngineConfig, explicit: Option<&Path>) -> Result<(), i32> {
    if args.path {
        match explicit.map(Path::to_path_buf).or_else(EngineConfig::config_file_path) {
            Some(path) => println!("{}", path.display()),
            None => {
                eprintln!("no config directory available");
                return Err(2);
            }
        }
        return Ok(());
    }
    match toml::to_string_pretty(config) {
        Ok(s) => {
            print!("{}", s);
            Ok(())
        }
        Err(_) => Err(3),
    }
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn main() {
    let color = detect_color_choice();
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let want_color = !cli.no_color
        && !matches!(color, ColorChoice::Never)
        && stdout().is_terminal()
        && supports_color::on(supports_color::Stream::Stdout).is_some();
    let stderr_color = !matches!(color, ColorChoice::Never) && std::io::stderr().is_terminal();
    init_tracing(cli.verbose, stderr_color);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    };

    let outcome = match cli.command {
        Some(Commands::Assess(args)) => run_assess(args, &config, want_color),
        Some(Commands::Identify(args)) => run_identify(args, &config, want_color),
        Some(Commands::Schema) => run_schema(),
        Some(Commands::Config(args)) => run_config(args, &config, cli.config.as_deref()),
        None => Ok(()),
    };
    if let Err(code) = outcome {
        std::process::exit(code);
    }
}
