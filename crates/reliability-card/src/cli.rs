use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    classifier::CalibrationMethod,
    config::PipelineConfig,
    pipeline::{self, RunSummary},
};

#[derive(Parser, Debug)]
#[command(name = "reliability-card")]
#[command(about = "Reliability report card for human / AI / post-edited text detectors", long_about = None)]
pub struct Cli {
    /// Labeled CSV with a text column and a label column
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Directory for metrics, policy, predictions and coverage artifacts
    #[arg(long, value_name = "DIR", default_value = "outputs")]
    pub out: PathBuf,

    /// Directory for plot data
    #[arg(long, value_name = "DIR", default_value = "reports/figures")]
    pub figures: PathBuf,

    /// Seed for the train/val/test split [default: 42]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probability calibration method [default: sigmoid]
    #[arg(long, value_enum)]
    pub calibration: Option<CalibrationMethod>,

    /// Fraction of test rows the recommended threshold should auto-decide [default: 0.7]
    #[arg(long)]
    pub target_coverage: Option<f64>,

    /// JSON config file; command-line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Text column name (auto-detected when omitted)
    #[arg(long)]
    pub text_column: Option<String>,

    /// Label column name (auto-detected when omitted)
    #[arg(long)]
    pub label_column: Option<String>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Log debug detail
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn default_directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (_, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }

    /// The config file (or defaults) with command-line flags laid on top.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(calibration) = self.calibration {
            config = config.with_calibration(calibration);
        }
        if let Some(target) = self.target_coverage {
            config = config.with_target_coverage(target);
        }
        if self.text_column.is_some() {
            config = config.with_text_column(self.text_column.clone());
        }
        if self.label_column.is_some() {
            config = config.with_label_column(self.label_column.clone());
        }
        Ok(config)
    }
}

fn init_tracing(verbosity: Verbosity) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.default_directive()));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_summary(summary: &RunSummary, verbosity: Verbosity) {
    let policy = &summary.policy;
    if verbosity == Verbosity::Quiet {
        println!("{:.4}", policy.recommended_threshold);
        return;
    }
    println!();
    println!("Done! Reliability report card created.");
    println!("Outputs: {}", summary.out_dir.display());
    println!("Figures: {}", summary.figures_dir.display());
    println!("Labels: {}", summary.labels.join(", "));
    println!("Primary model: {}", summary.primary_model);
    println!(
        "Recommended threshold: {:.2} (coverage≈{:.2}, accuracy≈{:.2})",
        policy.recommended_threshold, policy.estimated_coverage, policy.estimated_accuracy
    );
    println!(
        "Policy abstains on {} of {} test rows",
        summary.test_abstentions, summary.n_test
    );
    if !policy.meets_target() {
        println!(
            "Warning: target coverage {:.2} was not reached; the recommended threshold is the highest one with defined metrics",
            policy.target_coverage
        );
    }
    println!();
}

pub fn run(cli: &Cli) -> Result<()> {
    let verbosity = cli.verbosity();
    init_tracing(verbosity);

    let config = cli.pipeline_config()?;
    let summary = pipeline::run(&cli.input, &cli.out, &cli.figures, &config)?;
    print_summary(&summary, verbosity);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["reliability-card", "--input", "data.csv"]).unwrap();
        assert_eq!(cli.out, PathBuf::from("outputs"));
        assert_eq!(cli.figures, PathBuf::from("reports/figures"));
        assert_eq!(cli.verbosity(), Verbosity::Normal);
        assert_eq!(cli.pipeline_config().unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"split": {"seed": 1}, "policy": {"target_coverage": 0.9}}"#)
            .unwrap();

        let cli = Cli::try_parse_from([
            "reliability-card",
            "--input",
            "data.csv",
            "--config",
            path.to_str().unwrap(),
            "--seed",
            "9",
            "--calibration",
            "isotonic",
            "--text-column",
            "body",
        ])
        .unwrap();
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.split.seed, 9);
        assert_eq!(config.model.calibration, CalibrationMethod::Isotonic);
        assert!((config.policy.target_coverage - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.text_column.as_deref(), Some("body"));
    }

    #[test]
    fn test_input_is_required_and_verbosity_flags_conflict() {
        assert!(Cli::try_parse_from(["reliability-card"]).is_err());
        assert!(Cli::try_parse_from(["reliability-card", "--input", "x.csv", "-q", "-v"]).is_err());
        let cli = Cli::try_parse_from(["reliability-card", "--input", "x.csv", "-v"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Verbose);
    }

    #[test]
    fn test_rejects_unknown_calibration() {
        assert!(Cli::try_parse_from([
            "reliability-card",
            "--input",
            "x.csv",
            "--calibration",
            "temperature"
        ])
        .is_err());
    }
}
