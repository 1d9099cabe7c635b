use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::RecordKind;

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D+").expect("valid regex"));

const ALLOWED_EXTENSIONS: [&str; 1] = ["csv"];

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Where an upload of `kind` is stored. Names are unique so concurrent
/// uploads never share a file.
pub fn upload_path(upload_dir: &Path, kind: RecordKind) -> PathBuf {
    upload_dir.join(format!("{}-{}.csv", kind.tag(), Uuid::new_v4()))
}

/// Compares a header row against the expected columns, reporting the first
/// mismatch.
pub fn check_columns(actual: &[&str], expected: &[&str]) -> Result<(), AppError> {
    if actual.len() != expected.len() {
        return Err(AppError::Validation(format!(
            "CSV file has {} columns, expected {} columns",
            actual.len(),
            expected.len()
        )));
    }

    for (position, (found, wanted)) in actual.iter().zip(expected).enumerate() {
        if found != wanted {
            return Err(AppError::Validation(format!(
                "CSV file has {} column at position {}, expected {} column",
                found,
                position + 1,
                wanted
            )));
        }
    }

    Ok(())
}

fn read_headers(path: &Path) -> Result<Vec<String>, AppError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// Checks the header row of an uploaded file. A file that fails the check is
/// removed before the error is returned.
#[instrument]
pub fn validate_upload(path: &Path, kind: RecordKind) -> Result<(), AppError> {
    let result = read_headers(path).and_then(|headers| {
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        check_columns(&headers, kind.upload_columns())
    });

    if let Err(AppError::Validation(_)) = &result {
        discard(path);
    }

    result
}

/// Removes an upload that is no longer needed. Failure only logs.
pub fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Removed upload"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload"),
    }
}

pub fn normalize_score_value(raw: &str) -> String {
    NON_DIGITS.replace_all(raw, "").into_owned()
}

/// Rewrites a name as "student" followed by its last character. This matches
/// the naming of the sample score files and is kept as-is.
pub fn normalize_score_name(raw: &str) -> Option<String> {
    raw.chars().last().map(|last| format!("student{}", last))
}

/// Rewrites every row of a score file in place: digits-only scores and
/// normalized names. The header row is written back unchanged.
#[instrument]
pub fn normalize_scores(path: &Path) -> Result<(), AppError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let name_idx = column_index(&headers, "name")?;
    let score_idx = column_index(&headers, "score")?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();

        let name = fields.get(name_idx).map(String::as_str).unwrap_or_default();
        let Some(name) = normalize_score_name(name) else {
            return Err(AppError::Validation(format!(
                "CSV file row {} has an empty name",
                index + 1
            )));
        };
        fields[name_idx] = name;

        if let Some(score) = fields.get_mut(score_idx) {
            *score = normalize_score_value(score);
        }

        rows.push(fields);
    }
    drop(reader);

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), "Normalized score file");
    Ok(())
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, AppError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| AppError::Validation(format!("CSV file has no {} column", column)))
}

/// Everything that has to happen to an uploaded file before its rows are
/// inserted. Validation failures discard the file.
#[instrument]
pub fn prepare_upload(path: &Path, kind: RecordKind) -> Result<(), AppError> {
    validate_upload(path, kind)?;

    if kind == RecordKind::Score {
        if let Err(e) = normalize_scores(path) {
            if matches!(e, AppError::Validation(_)) {
                discard(path);
            }
            return Err(e);
        }
    }

    Ok(())
}
