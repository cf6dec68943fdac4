//! End-to-end report card: load, split, train both models, evaluate the
//! primary on test, sweep coverage, pick a policy, write artifacts.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    classifier::{CalibratedClassifier, LinearTextClassifier, ProbabilisticClassifier},
    config::PipelineConfig,
    coverage::{coverage_curve, CoverageCurvePoint},
    data::{load_dataset, split_dataset, LabeledDataset, Splits, SplitsSummary},
    ensemble::{DualModelEnsemble, DualPrediction},
    error::Result,
    labels::LabelSpace,
    metrics::{self, HistogramBin, OverallMetrics, ReliabilityBin},
    policy::{select_policy, AbstentionPolicy},
    sink::{ArtifactSink, DirectorySink, Table},
};

pub const METRICS_FILE: &str = "metrics_overall.json";
pub const POLICY_FILE: &str = "abstention_policy.json";
pub const PREDICTIONS_FILE: &str = "test_predictions.csv";
pub const COVERAGE_FILE: &str = "coverage_curve.csv";
pub const SPLITS_FILE: &str = "splits_summary.json";
pub const RELIABILITY_FILE: &str = "reliability_diagram.csv";
pub const HISTOGRAM_FILE: &str = "confidence_histogram.csv";
pub const CONFUSION_FILE: &str = "confusion_matrix.csv";

pub const WORD_MODEL: &str = "word";
pub const CHAR_MODEL: &str = "char";

/// Test-set metrics of the primary model plus the model comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub overall: OverallMetrics,
    pub primary_model: String,
    pub val_macro_f1_word: f64,
    pub val_macro_f1_char: f64,
}

/// Everything a run computes, before it is written anywhere.
#[derive(Debug, Clone)]
pub struct ReportCard {
    pub labels: LabelSpace,
    pub metrics: MetricsReport,
    pub curve: Vec<CoverageCurvePoint>,
    pub policy: AbstentionPolicy,
    pub splits: SplitsSummary,
    pub test: LabeledDataset,
    pub prediction: DualPrediction,
    pub reliability: Vec<ReliabilityBin>,
    pub histogram: Vec<HistogramBin>,
}

impl ReportCard {
    /// Test rows the policy would route to review.
    pub fn test_abstentions(&self) -> usize {
        self.prediction
            .primary
            .confidences()
            .into_iter()
            .zip(&self.prediction.disagreement)
            .filter(|&(confidence, &disagree)| self.policy.decide(confidence, disagree).is_abstain())
            .count()
    }
}

/// What the CLI reports after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub out_dir: PathBuf,
    pub figures_dir: PathBuf,
    pub primary_model: String,
    pub labels: Vec<String>,
    pub policy: AbstentionPolicy,
    pub n_test: usize,
    pub test_abstentions: usize,
}

/// The word and char models, calibrated per the config.
pub fn build_models(
    config: &PipelineConfig,
) -> Result<(
    CalibratedClassifier<LinearTextClassifier>,
    CalibratedClassifier<LinearTextClassifier>,
)> {
    let model = &config.model;
    let word = LinearTextClassifier::from_config(WORD_MODEL, config.features.word_params()?, model);
    let chars = LinearTextClassifier::from_config(CHAR_MODEL, config.features.char_params()?, model);
    Ok((
        CalibratedClassifier::new(word, model.calibration).with_cv(model.cv_folds),
        CalibratedClassifier::new(chars, model.calibration).with_cv(model.cv_folds),
    ))
}

/// Train both models on `splits.train`, pick the primary on `splits.val` and
/// evaluate it on `splits.test`.
///
/// The label space comes from the training split; a validation or test label
/// outside it is an error.
pub fn evaluate<W, C>(splits: &Splits, word: W, chars: C, config: &PipelineConfig) -> Result<ReportCard>
where
    W: ProbabilisticClassifier,
    C: ProbabilisticClassifier,
{
    config.validate()?;
    let labels = LabelSpace::from_labels(splits.train.labels());
    let y_train = labels.encode(splits.train.labels())?;
    let y_val = labels.encode(splits.val.labels())?;
    let y_test = labels.encode(splits.test.labels())?;
    info!(labels = %labels, "Built label space from training split");

    let mut ensemble = DualModelEnsemble::new(word, chars);
    info!(n_train = y_train.len(), "Training models");
    ensemble.fit(splits.train.texts(), &y_train, labels.len())?;
    let validation = ensemble.select_primary(splits.val.texts(), &y_val)?;

    let prediction = ensemble.predict(splits.test.texts())?;
    let proba = &prediction.primary;
    let overall = metrics::evaluate(&y_test, proba, &labels, config.policy.ece_bins)?;
    info!(
        accuracy = overall.accuracy,
        macro_f1 = overall.macro_f1,
        ece = overall.ece,
        brier = overall.brier,
        "Evaluated primary model on test"
    );

    let curve = coverage_curve(&y_test, proba, &labels, &config.policy.thresholds())?;
    let policy = select_policy(&curve, config.policy.target_coverage)?;
    if policy.meets_target() {
        info!(
            threshold = policy.recommended_threshold,
            coverage = policy.estimated_coverage,
            accuracy = policy.estimated_accuracy,
            "Selected abstention policy"
        );
    } else {
        warn!(
            target = policy.target_coverage,
            coverage = policy.estimated_coverage,
            threshold = policy.recommended_threshold,
            "No threshold reaches the target coverage, falling back to the highest valid threshold"
        );
    }

    let primary_model = ensemble.primary_name().to_owned();

    Ok(ReportCard {
        metrics: MetricsReport {
            overall,
            primary_model,
            val_macro_f1_word: validation.first,
            val_macro_f1_char: validation.second,
        },
        reliability: metrics::reliability_bins(&y_test, proba, config.policy.ece_bins),
        histogram: metrics::confidence_histogram(&proba.confidences(), config.policy.histogram_bins),
        splits: splits.summary(labels.labels()),
        test: splits.test.clone(),
        curve,
        policy,
        prediction,
        labels,
    })
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn predictions_table(card: &ReportCard) -> Result<Table> {
    let labels = card.labels.labels();
    let mut table = Table::new(
        ["text", "label"]
            .into_iter()
            .map(str::to_owned)
            .chain(labels.iter().map(|l| format!("p_{l}")))
            .chain(["pred_label", "confidence", "disagree_word_char"].map(str::to_owned)),
    );

    let proba = &card.prediction.primary;
    let predicted = card.labels.decode(&proba.predictions())?;
    let confidences = proba.confidences();
    for (row, ((text, label), pred)) in card
        .test
        .texts()
        .iter()
        .zip(card.test.labels())
        .zip(predicted)
        .enumerate()
    {
        let mut cells = vec![text.clone(), label.clone()];
        cells.extend(proba.row(row).iter().map(f64::to_string));
        cells.push(pred);
        cells.push(confidences[row].to_string());
        cells.push(u8::from(card.prediction.disagreement[row]).to_string());
        table.push_row(cells)?;
    }
    Ok(table)
}

fn coverage_table(curve: &[CoverageCurvePoint]) -> Result<Table> {
    let mut table = Table::new(["threshold", "coverage", "accuracy", "macro_f1"]);
    for point in curve {
        table.push_row(vec![
            point.threshold.to_string(),
            point.coverage.to_string(),
            optional_cell(point.accuracy),
            optional_cell(point.macro_f1),
        ])?;
    }
    Ok(table)
}

fn reliability_table(bins: &[ReliabilityBin]) -> Result<Table> {
    let mut table = Table::new(["lower", "upper", "count", "mean_confidence", "accuracy", "gap"]);
    for bin in bins {
        table.push_row(vec![
            bin.lower.to_string(),
            bin.upper.to_string(),
            bin.count.to_string(),
            bin.mean_confidence.to_string(),
            bin.accuracy.to_string(),
            bin.gap.to_string(),
        ])?;
    }
    Ok(table)
}

fn histogram_table(bins: &[HistogramBin]) -> Result<Table> {
    let mut table = Table::new(["lower", "upper", "count"]);
    for bin in bins {
        table.push_row(vec![
            bin.lower.to_string(),
            bin.upper.to_string(),
            bin.count.to_string(),
        ])?;
    }
    Ok(table)
}

fn confusion_table(labels: &LabelSpace, matrix: &[Vec<usize>]) -> Result<Table> {
    let mut table = Table::new(
        std::iter::once("true_label".to_owned()).chain(labels.labels().iter().cloned()),
    );
    for (label, counts) in labels.labels().iter().zip(matrix) {
        let mut cells = vec![label.clone()];
        cells.extend(counts.iter().map(usize::to_string));
        table.push_row(cells)?;
    }
    Ok(table)
}

/// Write the report artifacts to `outputs` and the plot data to `figures`.
pub fn write_report<O, F>(card: &ReportCard, outputs: &mut O, figures: &mut F) -> Result<()>
where
    O: ArtifactSink + ?Sized,
    F: ArtifactSink + ?Sized,
{
    outputs.put_record(METRICS_FILE, &serde_json::to_value(&card.metrics)?)?;
    outputs.put_record(POLICY_FILE, &serde_json::to_value(&card.policy)?)?;
    outputs.put_record(SPLITS_FILE, &serde_json::to_value(&card.splits)?)?;
    outputs.put_table(PREDICTIONS_FILE, &predictions_table(card)?)?;
    outputs.put_table(COVERAGE_FILE, &coverage_table(&card.curve)?)?;

    figures.put_table(RELIABILITY_FILE, &reliability_table(&card.reliability)?)?;
    figures.put_table(HISTOGRAM_FILE, &histogram_table(&card.histogram)?)?;
    figures.put_table(
        CONFUSION_FILE,
        &confusion_table(&card.labels, &card.metrics.overall.confusion_matrix)?,
    )?;
    Ok(())
}

/// Run the whole report card from a CSV file.
pub fn run(
    input: &Path,
    out_dir: &Path,
    figures_dir: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<RunSummary> {
    config.validate().context("Invalid configuration")?;

    let dataset = load_dataset(
        input,
        config.text_column.as_deref(),
        config.label_column.as_deref(),
    )
    .with_context(|| format!("Failed to load labeled data from {}", input.display()))?;
    let splits = split_dataset(&dataset, &config.split).context("Failed to split dataset")?;

    let (word, chars) = build_models(config).context("Failed to build models")?;
    let card = evaluate(&splits, word, chars, config).context("Failed to evaluate models")?;

    let mut outputs = DirectorySink::create(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let mut figures = DirectorySink::create(figures_dir)
        .with_context(|| format!("Failed to create figures directory {}", figures_dir.display()))?;
    write_report(&card, &mut outputs, &mut figures).context("Failed to write artifacts")?;
    info!(out_dir = %out_dir.display(), figures_dir = %figures_dir.display(), "Wrote report card");

    Ok(RunSummary {
        out_dir: out_dir.to_path_buf(),
        figures_dir: figures_dir.to_path_buf(),
        primary_model: card.metrics.primary_model.clone(),
        labels: card.labels.labels().to_vec(),
        n_test: card.test.len(),
        test_abstentions: card.test_abstentions(),
        policy: card.policy,
    })
}
