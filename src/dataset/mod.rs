//! Dataset loading.
//!
//! A split is a JSONL file `<dataset.path>/<split>.jsonl`, one
//! [`QuestionRecord`] per line:
//!
//! ```json
//! {"question": "...", "options": ["...", "..."], "gt_answer": 2,
//!  "prompt": [{"role": "user", "content": "..."}]}
//! ```

use crate::models::{DatasetConfig, HintcalError, QuestionRecord, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Path of `split` under the dataset directory.
pub fn split_path(dataset: &DatasetConfig, split: &str) -> PathBuf {
    dataset.path.join(format!("{split}.jsonl"))
}

/// Load and validate one split.
pub fn load_split(dataset: &DatasetConfig, split: &str) -> Result<Vec<QuestionRecord>> {
    let path = split_path(dataset, split);
    let records = load_records(&path)?;
    info!(
        dataset = %dataset.name,
        split,
        count = records.len(),
        "Loaded split"
    );
    Ok(records)
}

/// Load records from a JSONL file. Blank lines are skipped.
pub fn load_records(path: &Path) -> Result<Vec<QuestionRecord>> {
    let file = File::open(path)
        .map_err(|e| HintcalError::io(format!("opening dataset {}", path.display()), e))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| HintcalError::io("reading dataset", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: QuestionRecord = serde_json::from_str(&line)
            .map_err(|e| HintcalError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
        record.validate().map_err(|e| {
            HintcalError::InvalidInput(format!("Line {}: {}", line_num + 1, e))
        })?;
        records.push(record);
    }

    Ok(records)
}
