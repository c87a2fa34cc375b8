//! C7: report directory lifecycle (spec.md §4.6).
//!
//! A directory created by `create` is always a valid archive of raw data,
//! independent of whether synthesis ever succeeds (spec.md §3 "Ownership and
//! lifecycle").

mod slug;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub use slug::slug;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report not found: {0}")]
    NotFound(String),
    #[error("directory name does not match the report layout: {0}")]
    InvalidDirectoryName(String),
    #[error("a report directory already exists for this routine at this timestamp: {0}")]
    Collision(PathBuf),
}

/// A finalized (or partially finalized) report.
#[derive(Debug, Clone)]
pub struct Report {
    pub dir: PathBuf,
    pub date: String,
    pub routine: String,
    pub title: String,
    pub markdown: String,
    pub data_files: Vec<String>,
}

static DIR_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})(T\d{4,6})?-(.+)$").unwrap());

/// Allocates and reads back report directories under a common `base`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    base: PathBuf,
}

impl ReportStore {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Allocates `base/<YYYY-MM-DDTHHMMSS>-<slug(routine_name)>/` and, if
    /// `raw_data` is non-empty, writes each entry to
    /// `<dir>/data/<slug(key)>.json` with the raw payload bytes.
    ///
    /// Two calls for the same routine within the same second collide on
    /// this directory name; rather than silently merging into the existing
    /// directory, the later call fails (spec.md §9 "do not silently
    /// overwrite").
    pub fn create(&self, routine_name: &str, raw_data: &BTreeMap<String, Vec<u8>>) -> Result<PathBuf, ReportError> {
        let stamp = Local::now().format("%Y-%m-%dT%H%M%S");
        let dir = self.base.join(format!("{stamp}-{}", slug(routine_name)));
        std::fs::create_dir_all(&self.base)?;
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ReportError::Collision(dir));
            }
            Err(e) => return Err(e.into()),
        }

        if !raw_data.is_empty() {
            let data_dir = dir.join("data");
            std::fs::create_dir_all(&data_dir)?;
            for (name, payload) in raw_data {
                let path = data_dir.join(format!("{}.json", slug(name)));
                write_atomic(&path, payload)?;
            }
        }

        Ok(dir)
    }

    /// Writes `<dir>/report.md` and returns the finalized [`Report`].
    pub fn finish(&self, dir: &Path, routine_name: &str, markdown: &str) -> Result<Report, ReportError> {
        write_atomic(&dir.join("report.md"), markdown.as_bytes())?;
        let (date, _routine_from_dir) = parse_dir_name(dir)?;
        Ok(Report {
            dir: dir.to_path_buf(),
            date,
            routine: routine_name.to_string(),
            title: extract_title(markdown),
            markdown: markdown.to_string(),
            data_files: list_data_files(dir)?,
        })
    }

    /// `create` then `finish`.
    pub fn save(
        &self,
        routine_name: &str,
        markdown: &str,
        raw_data: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Report, ReportError> {
        let dir = self.create(routine_name, raw_data)?;
        self.finish(&dir, routine_name, markdown)
    }

    /// Reads `report.md` from an existing report directory.
    pub fn load(&self, dir: &Path) -> Result<Report, ReportError> {
        let markdown = std::fs::read_to_string(dir.join("report.md"))?;
        let (date, routine) = parse_dir_name(dir)?;
        Ok(Report {
            dir: dir.to_path_buf(),
            date,
            routine,
            title: extract_title(&markdown),
            markdown,
            data_files: list_data_files(dir)?,
        })
    }

    /// Every subdirectory of `base` containing `report.md`, sorted newest
    /// first by basename (directory names are timestamp-lexicographic).
    pub fn list(&self) -> Result<Vec<PathBuf>, ReportError> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.base)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join("report.md").is_file())
            .collect();
        dirs.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(dirs)
    }

    /// The lexicographically latest report directory for `routine`, if any.
    pub fn find_latest(&self, routine: &str) -> Result<Option<Report>, ReportError> {
        let target_slug = slug(routine);
        let matching = self
            .list()?
            .into_iter()
            .filter(|dir| {
                parse_dir_name(dir)
                    .map(|(_, r)| slug(&r) == target_slug)
                    .unwrap_or(false)
            })
            .max_by(|a, b| a.file_name().cmp(&b.file_name()));

        matching.map(|dir| self.load(&dir)).transpose()
    }
}

fn parse_dir_name(dir: &Path) -> Result<(String, String), ReportError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReportError::InvalidDirectoryName(dir.display().to_string()))?;
    let caps = DIR_NAME_RE
        .captures(name)
        .ok_or_else(|| ReportError::InvalidDirectoryName(name.to_string()))?;
    let date = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let routine = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
    Ok((date, routine))
}

fn extract_title(markdown: &str) -> String {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn list_data_files(dir: &Path) -> Result<Vec<String>, ReportError> {
    let data_dir = dir.join("data");
    if !data_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<String> = std::fs::read_dir(&data_dir)?
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    files.sort();
    Ok(files)
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.as_bytes().to_vec())).collect()
    }

    #[test]
    fn create_writes_raw_data_with_byte_identical_payloads() {
        let base = tempfile::tempdir().unwrap();
        let store = ReportStore::new(base.path());
        let data = raw(&[("0-news-search", "headline text")]);
        let dir = store.create("Daily Digest", &data).unwrap();

        let written = std::fs::read(dir.join("data/0-news-search.json")).unwrap();
        assert_eq!(written, b"headline text");
        assert!(!dir.join("report.md").exists());
    }

    #[test]
    fn create_with_no_raw_data_creates_no_data_directory() {
        let base = tempfile::tempdir().unwrap();
        let store = ReportStore::new(base.path());
        let dir = store.create("Empty Routine", &BTreeMap::new()).unwrap();
        assert!(!dir.join("data").exists());
    }

    #[test]
    fn save_then_load_round_trips_markdown_and_data_files() {
        let base = tempfile::tempdir().unwrap();
        let store = ReportStore::new(base.path());
        let data = raw(&[("0-news-search", "hi")]);
        let markdown = "# Daily Digest\n\nBody text.\n";

        let saved = store.save("Daily Digest", markdown, &data).unwrap();
        let loaded = store.load(&saved.dir).unwrap();

        assert_eq!(loaded.markdown, markdown);
        assert_eq!(loaded.title, "Daily Digest");
        assert_eq!(loaded.data_files, vec!["0-news-search.json".to_string()]);
    }

    #[test]
    fn a_crash_between_create_and_finish_leaves_raw_data_intact() {
        let base = tempfile::tempdir().unwrap();
        let store = ReportStore::new(base.path());
        let data = raw(&[("0-news-search", "hi")]);
        let dir = store.create("Daily Digest", &data).unwrap();

        assert!(dir.join("data/0-news-search.json").exists());
        assert!(!dir.join("report.md").exists());
    }

    #[test]
    fn a_same_second_collision_fails_the_later_call_instead_of_overwriting() {
        let base = tempfile::tempdir().unwrap();
        let store = ReportStore::new(base.path());
        let first = raw(&[("0-news-search", "first")]);
        let dir = store.create("Daily Digest", &first).unwrap();

        let second = raw(&[("0-news-search", "second")]);
        let err = store.create("Daily Digest", &second).unwrap_err();
        assert!(matches!(err, ReportError::Collision(_)));

        let written = std::fs::read(dir.join("data/0-news-search.json")).unwrap();
        assert_eq!(written, b"first");
    }

    #[test]
    fn list_returns_only_finalized_reports_newest_first() {
        let base = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(base.path().join("2024-01-01T090000-alpha/data")).unwrap();
        std::fs::write(base.path().join("2024-01-01T090000-alpha/report.md"), "# A").unwrap();
        std::fs::create_dir_all(base.path().join("2024-06-01T090000-alpha")).unwrap();
        std::fs::write(base.path().join("2024-06-01T090000-alpha/report.md"), "# B").unwrap();
        std::fs::create_dir_all(base.path().join("2024-03-01T090000-alpha-unfinished")).unwrap();

        let store = ReportStore::new(base.path());
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].to_string_lossy().contains("2024-06-01"));
    }

    #[test]
    fn find_latest_filters_by_routine_slug_and_picks_the_max() {
        let base = tempfile::tempdir().unwrap();
        for stamp in ["2024-01-01T090000", "2024-06-01T090000"] {
            let dir = base.path().join(format!("{stamp}-daily-digest"));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("report.md"), format!("# {stamp}")).unwrap();
        }
        let other = base.path().join("2024-12-01T090000-weekly-roundup");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("report.md"), "# other").unwrap();

        let store = ReportStore::new(base.path());
        let latest = store.find_latest("Daily Digest").unwrap().unwrap();
        assert!(latest.dir.to_string_lossy().contains("2024-06-01"));
    }

    #[test]
    fn parse_dir_name_rejects_a_directory_not_matching_the_layout() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("not-a-report-dir");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("report.md"), "# x").unwrap();
        let store = ReportStore::new(base.path());
        assert!(store.load(&dir).is_err());
    }
}
