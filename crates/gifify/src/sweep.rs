//! Temp directory sweep
//!
//! Removes downloads a crashed or killed process left behind. Files that
//! belong to a job still in progress are never touched, whatever their age.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Job id a temp file belongs to: the file name up to its first `.`
///
/// Downloads are written as `<id>.mp4` and `<id>.mp4.part`.
fn owning_job_id(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().filter(|stem| !stem.is_empty())
}

/// Files in `dir` whose modification time is at least `max_age` old
///
/// Only regular files directly inside `dir` are considered. A zero
/// `max_age` disables the sweep and matches nothing. Files owned by an id
/// in `live_jobs` are skipped.
pub fn find_stale_files(
    dir: &Path,
    max_age: Duration,
    now: SystemTime,
    live_jobs: &HashSet<String>,
) -> Vec<PathBuf> {
    if max_age.is_zero() || !dir.exists() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            owning_job_id(entry.path()).map_or(true, |id| !live_jobs.contains(id))
        })
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= max_age)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Delete stale downloads in `tmp_dir`; returns how many were removed
///
/// A zero `max_age` disables the sweep.
pub fn sweep_stale_downloads(
    tmp_dir: &Path,
    max_age: Duration,
    live_jobs: &HashSet<String>,
) -> usize {
    let mut removed = 0;
    for path in find_stale_files(tmp_dir, max_age, SystemTime::now(), live_jobs) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale download");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale download"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Write `name` with a modification time `age` in the past
    fn write_aged(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let none = HashSet::new();
        assert!(find_stale_files(&missing, HOUR, SystemTime::now(), &none).is_empty());
        assert_eq!(sweep_stale_downloads(&missing, HOUR, &none), 0);
    }

    #[test]
    fn test_age_cutoff() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("abc.mp4");
        fs::write(&file, b"x").unwrap();
        let none = HashSet::new();

        let now = SystemTime::now();
        // Fresh file is kept
        assert!(find_stale_files(temp.path(), HOUR, now, &none).is_empty());
        // Viewed from two hours later it is stale
        let later = now + 2 * HOUR;
        assert_eq!(find_stale_files(temp.path(), HOUR, later, &none), vec![file]);
    }

    #[test]
    fn test_zero_age_disables_sweep() {
        let temp = TempDir::new().unwrap();
        let file = write_aged(temp.path(), "inflight.mp4", 2 * HOUR);

        let later = SystemTime::now() + 10 * HOUR;
        assert!(find_stale_files(temp.path(), Duration::ZERO, later, &HashSet::new()).is_empty());
        assert_eq!(sweep_stale_downloads(temp.path(), Duration::ZERO, &HashSet::new()), 0);
        assert!(file.exists());
    }

    #[test]
    fn test_live_job_files_survive() {
        let temp = TempDir::new().unwrap();
        let live = write_aged(temp.path(), "0123abcd.mp4", 2 * HOUR);
        let live_part = write_aged(temp.path(), "0123abcd.mp4.part", 2 * HOUR);
        let orphan = write_aged(temp.path(), "deadbeef.mp4", 2 * HOUR);
        let live_jobs: HashSet<String> = ["0123abcd".to_string()].into_iter().collect();

        let removed = sweep_stale_downloads(temp.path(), Duration::from_secs(60), &live_jobs);

        assert_eq!(removed, 1);
        assert!(live.exists());
        assert!(live_part.exists());
        assert!(!orphan.exists());
    }

    #[test]
    fn test_sweep_removes_files_but_not_subdirs() {
        let temp = TempDir::new().unwrap();
        write_aged(temp.path(), "a.mp4", 2 * HOUR);
        write_aged(temp.path(), "b.mp4.part", 2 * HOUR);
        let nested = temp.path().join("keep");
        fs::create_dir(&nested).unwrap();
        let deep = write_aged(&nested, "c.mp4", 2 * HOUR);

        let removed = sweep_stale_downloads(temp.path(), HOUR, &HashSet::new());

        assert_eq!(removed, 2);
        assert!(!temp.path().join("a.mp4").exists());
        assert!(deep.exists());
    }

    #[test]
    fn test_owning_job_id() {
        assert_eq!(owning_job_id(Path::new("/tmp/abc.mp4.part")), Some("abc"));
        assert_eq!(owning_job_id(Path::new("/tmp/abc")), Some("abc"));
        assert_eq!(owning_job_id(Path::new("/tmp/.hidden")), None);
    }
}
