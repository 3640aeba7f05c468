//! Trainer checkpoint discovery.
//!
//! The trainer saves into `<output_dir>/checkpoint-<step>`. Resuming picks
//! the directory with the largest step number.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn checkpoint_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^checkpoint-(\d+)$").expect("static pattern is valid"))
}

/// Step number of a `checkpoint-<step>` directory name.
pub fn checkpoint_step(name: &str) -> Option<u64> {
    checkpoint_name_pattern()
        .captures(name)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Latest checkpoint under `dir`, or `None` when `dir` is absent or holds
/// no checkpoint directories.
pub fn find_last_checkpoint(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let pattern = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{pattern}/checkpoint-*");
    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "Invalid checkpoint glob");
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let step = checkpoint_step(path.file_name()?.to_str()?)?;
            Some((step, path))
        })
        .max_by_key(|(step, _)| *step)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dir_has_no_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(find_last_checkpoint(&temp_dir.path().join("nope")), None);
    }

    #[test]
    fn test_largest_step_wins_numerically() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["checkpoint-250", "checkpoint-1000", "checkpoint-750"] {
            fs::create_dir(temp_dir.path().join(name)).unwrap();
        }

        let last = find_last_checkpoint(temp_dir.path()).unwrap();
        assert_eq!(last.file_name().unwrap(), "checkpoint-1000");
    }

    #[test]
    fn test_ignores_files_and_odd_names() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("checkpoint-10")).unwrap();
        fs::create_dir(temp_dir.path().join("checkpoint-latest")).unwrap();
        fs::create_dir(temp_dir.path().join("checkpoint-99-tmp")).unwrap();
        fs::write(temp_dir.path().join("checkpoint-500"), "not a dir").unwrap();

        let last = find_last_checkpoint(temp_dir.path()).unwrap();
        assert_eq!(last.file_name().unwrap(), "checkpoint-10");
    }

    #[test]
    fn test_empty_dir_has_no_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("run_args.json"), "{}").unwrap();
        assert_eq!(find_last_checkpoint(temp_dir.path()), None);
    }

    #[test]
    fn test_checkpoint_step() {
        assert_eq!(checkpoint_step("checkpoint-42"), Some(42));
        assert_eq!(checkpoint_step("checkpoint-"), None);
        assert_eq!(checkpoint_step("ckpt-42"), None);
    }
}
