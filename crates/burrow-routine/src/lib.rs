//! C10: routine YAML loading and validation (spec.md §3, §6).

use std::path::Path;

use burrow_core::model::{ReportSettings, Source, SynthesisSettings};
use burrow_core::Routine;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid routine YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid routine: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
struct RoutineYaml {
    #[serde(default)]
    schedule: String,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    jitter: u64,
    #[serde(default)]
    llm: Option<String>,
    report: ReportSettings,
    #[serde(default)]
    synthesis: SynthesisSettings,
    sources: Vec<Source>,
}

/// Parses routine YAML text, deriving `name` from the caller-supplied
/// filename stem, and validates the result.
pub fn parse_str(yaml: &str, name: &str) -> Result<Routine, RoutineError> {
    let parsed: RoutineYaml = serde_yaml::from_str(yaml)?;
    let routine = Routine {
        name: name.to_string(),
        schedule: parsed.schedule,
        timezone: parsed.timezone,
        jitter: parsed.jitter,
        llm: parsed.llm,
        report: parsed.report,
        synthesis: parsed.synthesis,
        sources: parsed.sources,
    };
    validate(&routine)?;
    Ok(routine)
}

/// Reads and parses a routine file; `name` is the filename without its
/// extension (spec.md §3: "`name` (from filename)").
pub fn load_file(path: &Path) -> Result<Routine, RoutineError> {
    let yaml = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    parse_str(&yaml, &name)
}

/// Loads every `.yaml`/`.yml` file directly under `dir`, sorted by filename.
/// A missing directory yields an empty list rather than an error, since the
/// scheduler reloads this list on every tick and an operator may not have
/// created it yet.
pub fn load_dir(dir: &Path) -> Result<Vec<Routine>, RoutineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        })
        .collect();
    paths.sort();
    paths.iter().map(|p| load_file(p)).collect()
}

fn validate(routine: &Routine) -> Result<(), RoutineError> {
    if routine.report.title.trim().is_empty() {
        return Err(RoutineError::Validation("report.title must not be empty".to_string()));
    }
    if routine.sources.is_empty() {
        return Err(RoutineError::Validation("routine must declare at least one source".to_string()));
    }
    for (i, source) in routine.sources.iter().enumerate() {
        if source.service.trim().is_empty() {
            return Err(RoutineError::Validation(format!("sources[{i}].service must not be empty")));
        }
        if source.tool.trim().is_empty() {
            return Err(RoutineError::Validation(format!("sources[{i}].tool must not be empty")));
        }
    }
    if routine.synthesis.strategy().is_none() {
        return Err(RoutineError::Validation(format!(
            "synthesis.strategy must be one of \"\", auto, single, multi-stage; got {:?}",
            routine.synthesis.strategy_raw
        )));
    }
    Ok(())
}
