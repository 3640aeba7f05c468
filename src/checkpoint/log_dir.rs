//! Trial log directory.
//!
//! Layout of `<log_folder>/<trial_name>/`:
//! - `run_args.json`: run arguments and config snapshot
//! - `checkpoint-<step>/`: written by the trainer
//! - `eval_results.json`: aggregate evaluation metrics
//! - `eval_samples.jsonl`: per-sample evaluation trace
//!
//! JSON documents are written atomically (write-then-rename).

use crate::models::{Config, EvalResults, EvalSampleRecord, HintcalError, Result, RunArgs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RUN_ARGS_FILE: &str = "run_args.json";
pub const EVAL_RESULTS_FILE: &str = "eval_results.json";
pub const EVAL_SAMPLES_FILE: &str = "eval_samples.jsonl";

/// Snapshot written to `run_args.json` at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub args: RunArgs,
    /// Whether a checkpoint was found to resume from
    pub resume: bool,
    /// Config with API keys redacted
    pub config: Config,
    pub started_at: DateTime<Utc>,
}

/// Handle to one trial's log directory.
#[derive(Debug, Clone)]
pub struct LogDir {
    path: PathBuf,
}

impl LogDir {
    /// Create the directory (if needed) and write the run snapshot.
    pub fn init(path: &Path, args: &RunArgs, config: &Config, resume: bool) -> Result<Self> {
        fs::create_dir_all(path).map_err(|e| HintcalError::io("creating log directory", e))?;

        let log_dir = Self {
            path: path.to_path_buf(),
        };
        let snapshot = RunSnapshot {
            args: args.clone(),
            resume,
            config: config.redacted(),
            started_at: Utc::now(),
        };
        write_json_atomic(&log_dir.path.join(RUN_ARGS_FILE), &snapshot)?;

        info!(path = %path.display(), resume, "Initialized log directory");
        Ok(log_dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn eval_results_path(&self) -> PathBuf {
        self.path.join(EVAL_RESULTS_FILE)
    }

    pub fn eval_samples_path(&self) -> PathBuf {
        self.path.join(EVAL_SAMPLES_FILE)
    }

    /// Write `eval_results.json` atomically.
    pub fn write_eval_results(&self, results: &EvalResults) -> Result<PathBuf> {
        let path = self.eval_results_path();
        write_json_atomic(&path, results)?;
        info!(path = %path.display(), "Metric results saved");
        Ok(path)
    }

    /// Write the per-sample trace, one JSON object per line.
    pub fn write_eval_samples(&self, samples: &[EvalSampleRecord]) -> Result<PathBuf> {
        let path = self.eval_samples_path();
        let file = File::create(&path).map_err(|e| HintcalError::io("creating eval samples", e))?;
        let mut writer = BufWriter::new(file);

        for sample in samples {
            let json = serde_json::to_string(sample).map_err(|e| {
                HintcalError::Internal(format!("Failed to serialize sample: {e}"))
            })?;
            writeln!(writer, "{json}").map_err(|e| HintcalError::io("writing eval samples", e))?;
        }
        writer
            .flush()
            .map_err(|e| HintcalError::io("flushing eval samples", e))?;

        debug!(count = samples.len(), path = %path.display(), "Wrote eval samples");
        Ok(path)
    }
}

/// Serialize `value` as pretty JSON to a sibling temp file, then rename it
/// over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| HintcalError::Internal(format!("not a file path: {}", path.display())))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let file = File::create(&temp_path).map_err(|e| HintcalError::io("creating temp file", e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| HintcalError::Internal(format!("Serializing {}: {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| HintcalError::io("flushing temp file", e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| HintcalError::io("renaming temp file", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalibrationMetrics;
    use tempfile::TempDir;

    fn config() -> Config {
        Config::from_toml_str("[model]\npolicy = \"p\"\n[dataset]\nname = \"mmlu\"\npath = \"d\"\n")
            .unwrap()
    }

    fn args(root: &Path) -> RunArgs {
        RunArgs {
            log_folder: root.to_path_buf(),
            trial_name: "trial".into(),
            entropy: true,
            closed_source: false,
        }
    }

    #[test]
    fn test_init_writes_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let args = args(temp_dir.path());
        let log_dir = LogDir::init(&args.log_path(), &args, &config(), false).unwrap();

        let content = fs::read_to_string(log_dir.path().join(RUN_ARGS_FILE)).unwrap();
        let snapshot: RunSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(snapshot.args.trial_name, "trial");
        assert!(snapshot.args.entropy);
        assert!(!snapshot.resume);
        assert_eq!(snapshot.config.dataset.name, "mmlu");
    }

    #[test]
    fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let args = args(temp_dir.path());
        LogDir::init(&args.log_path(), &args, &config(), false).unwrap();
        let log_dir = LogDir::init(&args.log_path(), &args, &config(), true).unwrap();

        let content = fs::read_to_string(log_dir.path().join(RUN_ARGS_FILE)).unwrap();
        assert!(content.contains("\"resume\": true"));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");
        write_json_atomic(&path, &serde_json::json!({"a": 1})).unwrap();
        write_json_atomic(&path, &serde_json::json!({"a": 2})).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["a"], 2);
        assert!(!temp_dir.path().join("out.json.tmp").exists());
    }

    #[test]
    fn test_eval_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let args = args(temp_dir.path());
        let log_dir = LogDir::init(&args.log_path(), &args, &config(), false).unwrap();

        let metrics = CalibrationMetrics {
            accuracy: 1.0,
            ece: 0.0,
            confidence_avg: 1.0,
            confidence_std: 0.0,
            entropy_mean: Some(0.25),
        };
        let results = EvalResults::new(metrics.clone(), metrics, None);
        let path = log_dir.write_eval_results(&results).unwrap();
        let read: EvalResults = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(read, results);

        let sample = EvalSampleRecord {
            index: 0,
            gt_answer: 1,
            completion: "hint".into(),
            calibrated_answer: 1,
            calibrated_confidence: 1.0,
            baseline_answer: -1,
            baseline_confidence: 1e-4,
            calibrated_entropy: None,
            baseline_entropy: None,
        };
        let path = log_dir
            .write_eval_samples(&[sample.clone(), sample])
            .unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!content.contains("calibrated_entropy"));
    }
}
