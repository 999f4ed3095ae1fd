use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rehabtech_core::advisor::{recommend_with_fallback, AdviceSubject, RemoteAdvisor, TemplateAdvisor};
use rehabtech_core::analyzer::{analyze_samples, persist_analysis};
use rehabtech_core::comparison::{compare_sessions, within_window};
use rehabtech_core::config::{load_config, CoreConfig};
use rehabtech_core::device::SimulatedSensorDevice;
use rehabtech_core::export::{export_samples, ExportFormat};
use rehabtech_core::json_api::{parse_rows, parse_samples};
use rehabtech_core::models::{TestType, UserProfile};
use rehabtech_core::storage::{load_profile, JsonlAnalysisStore};
use rehabtech_core::types::{AnalysisReport, Outcome};
use rehabtech_core::{metrics, session};

#[derive(Parser, Debug)]
#[command(name = "rehabtech")]
#[command(version)]
#[command(about = "Rehabilitation telemetry analysis: statistics, trends, clusters and scores", long_about = None)]
struct Cli {
    /// Config-fil (JSON); mangler den, brukes standardverdier
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mer logging (debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full analyse av én økt
    Analyze {
        #[arg(long, value_name = "SAMPLES_JSON")]
        input: PathBuf,
        #[arg(long)]
        session_id: Option<String>,
        /// Legg resultatet til i en JSONL-logg
        #[arg(long, value_name = "PATH")]
        persist: Option<PathBuf>,
        /// Lag anbefaling (fjerntjeneste, ellers mal)
        #[arg(long)]
        advise: bool,
        #[arg(long, value_name = "PATH")]
        profile: Option<PathBuf>,
    },
    /// Historisk sammenligning for en bruker
    Compare {
        #[arg(long, value_name = "ROWS_JSON")]
        input: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long)]
        advise: bool,
        #[arg(long, value_name = "PATH")]
        profile: Option<PathBuf>,
    },
    /// Skriv simulerte samples som JSON
    Simulate {
        #[arg(long, value_parser = parse_test_type)]
        test_type: TestType,
        #[arg(long, default_value_t = 100)]
        count: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Eksporter samples som csv eller json
    Export {
        #[arg(long, value_name = "SAMPLES_JSON")]
        input: PathBuf,
        #[arg(long, default_value = "csv")]
        format: String,
    },
    /// Prometheus-tellere for denne prosessen
    Metrics,
}

fn parse_test_type(s: &str) -> Result<TestType, String> {
    s.parse()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // fmt().init() kobler også log-fasaden inn (tracing-log)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("kunne ikke lese {}", path.display()))
}

fn profile_or_default(path: Option<&PathBuf>) -> Result<UserProfile> {
    match path {
        Some(p) => load_profile(p).with_context(|| format!("profil {}", p.display())),
        None => Ok(UserProfile::default()),
    }
}

fn advisor(cfg: &CoreConfig) -> Option<RemoteAdvisor> {
    match RemoteAdvisor::from_env(cfg.advisor.clone()) {
        Ok(r) => Some(r),
        Err(e) => {
            log::warn!("{e} – bruker malbaserte anbefalinger");
            None
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match &cli.config {
        Some(p) => load_config(p)?,
        None => CoreConfig::default(),
    };

    match cli.command {
        Command::Analyze { input, session_id, persist, advise, profile } => {
            let samples = parse_samples(&read_input(&input)?)?;
            let session_id = session_id.unwrap_or_else(|| session::new_session_id(Utc::now()));
            let report = analyze_samples(&session_id, &samples, &cfg.analysis, Utc::now());
            println!("{}", serde_json::to_string_pretty(&report)?);

            let AnalysisReport::Complete(analysis) = &report else {
                return Ok(());
            };

            if let Some(path) = persist {
                // best-effort: analysen over er allerede skrevet ut
                persist_analysis(&JsonlAnalysisStore::new(path), analysis);
            }

            if advise {
                let profile = profile_or_default(profile.as_ref())?;
                let remote = advisor(&cfg);
                let rec = match &remote {
                    Some(r) => recommend_with_fallback(r, &TemplateAdvisor, AdviceSubject::Session(analysis), &profile),
                    None => recommend_with_fallback(&TemplateAdvisor, &TemplateAdvisor, AdviceSubject::Session(analysis), &profile),
                };
                println!("{}", serde_json::to_string_pretty(&rec)?);
            }
        }
        Command::Compare { input, user, days, advise, profile } => {
            let rows = within_window(parse_rows(&read_input(&input)?)?, days, Utc::now());
            let report = compare_sessions(&user, days, &rows);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let (true, Outcome::Ready(comparison)) = (advise, &report) {
                let profile = profile_or_default(profile.as_ref())?;
                let remote = advisor(&cfg);
                let rec = match &remote {
                    Some(r) => recommend_with_fallback(r, &TemplateAdvisor, AdviceSubject::Comparison(comparison), &profile),
                    None => recommend_with_fallback(&TemplateAdvisor, &TemplateAdvisor, AdviceSubject::Comparison(comparison), &profile),
                };
                println!("{}", serde_json::to_string_pretty(&rec)?);
            }
        }
        Command::Simulate { test_type, count, seed } => {
            let mut device = SimulatedSensorDevice::new(seed);
            let interval = chrono::Duration::milliseconds(cfg.collector.interval_ms as i64);
            let samples = device.samples(test_type, count, Utc::now(), interval);
            println!("{}", serde_json::to_string_pretty(&samples)?);
        }
        Command::Export { input, format } => {
            let format: ExportFormat = format.parse()?;
            let samples = parse_samples(&read_input(&input)?)?;
            print!("{}", export_samples(&samples, format)?);
        }
        Command::Metrics => match metrics::global() {
            Some(m) => print!("{}", m.render()),
            None => anyhow::bail!("metrics-registeret er ikke tilgjengelig"),
        },
    }
    Ok(())
}
