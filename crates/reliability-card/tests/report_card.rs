use std::{fs, path::Path, process::Command};

use reliability_card::{
    config::{ModelConfig, PipelineConfig},
    pipeline::{self, COVERAGE_FILE, METRICS_FILE, POLICY_FILE, PREDICTIONS_FILE, SPLITS_FILE},
    CalibrationMethod,
};

const WORDS: [(&str, [&str; 4]); 3] = [
    ("ai", ["delve", "tapestry", "furthermore", "leverage"]),
    ("edited", ["tweaked", "revised", "polished", "reworded"]),
    ("human", ["honestly", "gonna", "yeah", "kinda"]),
];

fn write_corpus(path: &Path, per_class: usize) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(["id", "content", "human_or_ai"]).unwrap();
    let mut id = 0;
    for i in 0..per_class {
        for (label, words) in WORDS {
            let text = format!(
                "the post {} {} about {} and {}, item {i}",
                words[i % 4],
                words[(i + 1) % 4],
                words[(i + 2) % 4],
                words[(i + 3) % 4]
            );
            // mixed-case labels with padding are normalized on load
            let label = if i % 5 == 0 { format!(" {} ", label.to_uppercase()) } else { label.to_owned() };
            writer.write_record([id.to_string(), text, label]).unwrap();
            id += 1;
        }
    }
    writer.flush().unwrap();
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::default().with_model(
        ModelConfig::default()
            .with_max_iter(100)
            .with_cv_folds(2)
            .with_calibration(CalibrationMethod::Isotonic),
    )
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_run_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("labeled.csv");
    write_corpus(&input, 20);
    let out = dir.path().join("outputs");
    let figures = dir.path().join("reports/figures");

    let summary = pipeline::run(&input, &out, &figures, &fast_config()).unwrap();
    assert_eq!(summary.labels, vec!["ai", "edited", "human"]);
    assert_eq!(summary.n_test, 12);

    for name in [METRICS_FILE, POLICY_FILE, PREDICTIONS_FILE, COVERAGE_FILE, SPLITS_FILE] {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert_eq!(fs::read_dir(&figures).unwrap().count(), 3);

    let policy = read_json(&out.join(POLICY_FILE));
    let threshold = policy["recommended_threshold"].as_f64().unwrap();
    assert!((0.0..=0.99).contains(&threshold));
    assert!(policy["abstain_rule"].as_str().unwrap().contains("disagree_across_models"));

    let splits = read_json(&out.join(SPLITS_FILE));
    assert_eq!(splits["n_total"], 60);
    assert_eq!(splits["label_counts_total"]["ai"], 20);

    let mut coverage = csv::Reader::from_path(out.join(COVERAGE_FILE)).unwrap();
    let headers: Vec<String> = coverage.headers().unwrap().iter().map(str::to_owned).collect();
    assert_eq!(headers, vec!["threshold", "coverage", "accuracy", "macro_f1"]);
    assert_eq!(coverage.records().count(), 40);

    let mut predictions = csv::Reader::from_path(out.join(PREDICTIONS_FILE)).unwrap();
    for record in predictions.records() {
        let record = record.unwrap();
        let total: f64 = (2..5).map(|i| record[i].parse::<f64>().unwrap()).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_run_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline::run(
        &dir.path().join("absent.csv"),
        &dir.path().join("out"),
        &dir.path().join("figures"),
        &fast_config(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("absent.csv"));
    assert!(!dir.path().join("out").exists());
}

#[cfg(feature = "cli")]
mod cli {
    use super::*;

    fn bin() -> Command {
        Command::new(env!("CARGO_BIN_EXE_reliability-card"))
    }

    #[test]
    fn test_help_lists_flags() {
        let output = bin().arg("--help").output().unwrap();
        assert!(output.status.success());
        let help = String::from_utf8_lossy(&output.stdout);
        for flag in ["--input", "--out", "--figures", "--seed", "--calibration", "--target-coverage"] {
            assert!(help.contains(flag), "missing {flag}");
        }
    }

    #[test]
    fn test_cli_run_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("labeled.csv");
        write_corpus(&input, 15);
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"model": {"max_iter": 100, "cv_folds": 2}}"#).unwrap();

        let output = bin()
            .arg("--input")
            .arg(&input)
            .arg("--out")
            .arg(dir.path().join("out"))
            .arg("--figures")
            .arg(dir.path().join("figs"))
            .arg("--config")
            .arg(&config)
            .args(["--seed", "7", "--calibration", "none", "--target-coverage", "0.6", "-q"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let policy = read_json(&dir.path().join("out").join(POLICY_FILE));
        assert_eq!(policy["target_coverage"], 0.6);
        let printed: f64 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap();
        let recorded = policy["recommended_threshold"].as_f64().unwrap();
        assert!((printed - recorded).abs() < 1e-4);
    }

    #[test]
    fn test_cli_fails_on_missing_input_and_bad_target() {
        let dir = tempfile::tempdir().unwrap();
        let output = bin()
            .arg("--input")
            .arg(dir.path().join("absent.csv"))
            .arg("--out")
            .arg(dir.path().join("out"))
            .output()
            .unwrap();
        assert!(!output.status.success());

        let input = dir.path().join("labeled.csv");
        write_corpus(&input, 5);
        let output = bin()
            .arg("--input")
            .arg(&input)
            .args(["--target-coverage", "1.5"])
            .output()
            .unwrap();
        assert!(!output.status.success());
    }
}
