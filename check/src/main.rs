use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use elvis::analysis::analyzer::{AnalysisReport, AnalyzerConfig, Harness};
use elvis::message::Category;
use elvis::profile::SimProfile;
use log::{info, warn};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(version, about = "Analyse a dissected LTE attach for compliance and attack indicators")]
struct Args {
    /// JSON trace: an array of dissected messages in capture order
    trace: PathBuf,

    /// srsRAN user_db.csv holding the subscriber's key material
    #[arg(long)]
    sim: Option<PathBuf>,

    /// TOML config with an [analyzers] table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only analyse the first LIMIT messages
    #[arg(long)]
    limit: Option<usize>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Only print warnings and errors from the log
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    analyzers: AnalyzerConfig,
}

fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse config {}", path.display()))
}

fn load_profile(path: &Path) -> Result<SimProfile> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    SimProfile::from_user_db(file).with_context(|| format!("failed to load subscriber profile from {}", path.display()))
}

/// Writes one block per analysed message that scored above zero.
fn print_analysis(report: &AnalysisReport, out: &mut impl Write) -> io::Result<()> {
    for msg in &report.messages {
        if msg.severity() == 0 || !msg.has_category(Category::Analysed) {
            continue;
        }
        let id = msg.id();
        writeln!(out, "Packet summary: {}", msg.summary())?;
        writeln!(out, "------------ANALYSIS RESULTS FOR PACKET {id} START------------")?;
        for finding in msg.findings() {
            writeln!(out, "{finding}")?;
        }
        writeln!(out, "------------ANALYSIS RESULTS FOR PACKET {id} STOP------------")?;
        writeln!(out)?;
    }
    let categories: Vec<&str> = report.categories.iter().map(Category::as_str).collect();
    writeln!(out, "Categories: {}", categories.join(", "))?;
    writeln!(
        out,
        "Total severity: {} ({} messages flagged)",
        report.total_severity(),
        report.flagged().count()
    )?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    elvis::init_logging(level);

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let profile = match &args.sim {
        Some(path) => Some(load_profile(path)?),
        None => {
            warn!("no subscriber profile given, authentication will not be verified");
            None
        }
    };

    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open trace {}", args.trace.display()))?;
    let mut messages = elvis::read_trace(BufReader::new(file))
        .with_context(|| format!("failed to parse trace {}", args.trace.display()))?;
    if let Some(limit) = args.limit {
        messages.truncate(limit);
    }
    info!("loaded {} messages from {}", messages.len(), args.trace.display());

    let mut harness = Harness::new_with_config(&config.analyzers).with_sim_profile(profile);
    let report = harness.analyze(messages).context("analysis failed")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        print_analysis(&report, &mut out)?;
    }
    Ok(())
}
