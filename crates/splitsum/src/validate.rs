//! Validation of command-line parameters.
//!
//! These checks run before any file is read or backend is contacted, so
//! mistakes surface with a clear message instead of a backend error.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Largest accepted overlap, in lines.
pub const MAX_OVERLAP_LINES: u32 = 99_999;

/// Characters rejected in output filenames.
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("split percentage must be between 1 and 100")]
    SplitOutOfRange,
    #[error("overlap lines must be between 0 and 99999")]
    OverlapOutOfRange,
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("path is a directory, not a file: {}", .0.display())]
    IsDirectory(PathBuf),
    #[error("cannot read file: {}", .0.display())]
    Unreadable(PathBuf),
    #[error("output filename must not be empty")]
    EmptyOutputName,
    #[error("output filename contains invalid characters")]
    InvalidOutputName,
}

/// Parse a number with no fractional part. Decimal and exponent forms
/// such as `50.0` or `1e2` are accepted.
fn parse_whole_number(value: &str) -> Option<f64> {
    let n = value.trim().parse::<f64>().ok()?;
    (n.is_finite() && n.fract() == 0.0).then_some(n)
}

/// Parse a split percentage: a whole number in 1..=100.
pub fn validate_split(value: &str) -> Result<u32, ValidationError> {
    parse_whole_number(value)
        .filter(|n| (1.0..=100.0).contains(n))
        .map(|n| n as u32)
        .ok_or(ValidationError::SplitOutOfRange)
}

/// Parse an overlap line count: a whole number in `0..=MAX_OVERLAP_LINES`.
pub fn validate_overlap(value: &str) -> Result<u32, ValidationError> {
    parse_whole_number(value)
        .filter(|n| (0.0..=f64::from(MAX_OVERLAP_LINES)).contains(n))
        .map(|n| n as u32)
        .ok_or(ValidationError::OverlapOutOfRange)
}

/// Check that `path` names an existing, readable regular file.
pub fn validate_file(path: &Path) -> Result<&Path, ValidationError> {
    let meta = std::fs::metadata(path).map_err(|_| ValidationError::FileNotFound(path.into()))?;
    if meta.is_dir() {
        return Err(ValidationError::IsDirectory(path.into()));
    }
    std::fs::File::open(path).map_err(|_| ValidationError::Unreadable(path.into()))?;
    Ok(path)
}

/// Normalize a model name: trimmed, with blank treated as "no override".
pub fn validate_model(model: Option<&str>) -> Option<String> {
    model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Check an output filename for characters most filesystems reject.
pub fn validate_output_file(name: &str) -> Result<&str, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyOutputName);
    }
    if name.contains(INVALID_FILENAME_CHARS) {
        return Err(ValidationError::InvalidOutputName);
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_accepts_bounds() {
        assert_eq!(validate_split("1"), Ok(1));
        assert_eq!(validate_split("50"), Ok(50));
        assert_eq!(validate_split("100"), Ok(100));
    }

    #[test]
    fn whole_numbers_in_decimal_or_exponent_form() {
        assert_eq!(validate_split("50.0"), Ok(50));
        assert_eq!(validate_split("1e2"), Ok(100));
        assert_eq!(validate_overlap("12.0"), Ok(12));
        assert_eq!(validate_overlap("1e3"), Ok(1000));
        assert_eq!(validate_overlap("-0"), Ok(0));
    }

    #[test]
    fn split_rejects_bad_values() {
        for bad in ["0", "101", "-5", "50.5", "1e3", "abc", "", "inf", "NaN"] {
            assert_eq!(
                validate_split(bad),
                Err(ValidationError::SplitOutOfRange),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn overlap_accepts_bounds() {
        assert_eq!(validate_overlap("0"), Ok(0));
        assert_eq!(validate_overlap("99999"), Ok(99_999));
    }

    #[test]
    fn overlap_rejects_bad_values() {
        for bad in ["", "-1", "100000", "1.5", "1e5", "many", "inf"] {
            assert_eq!(
                validate_overlap(bad),
                Err(ValidationError::OverlapOutOfRange),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn file_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "content").unwrap();

        assert!(validate_file(&file).is_ok());
        assert_eq!(
            validate_file(dir.path()),
            Err(ValidationError::IsDirectory(dir.path().into()))
        );
        let missing = dir.path().join("missing.txt");
        assert_eq!(
            validate_file(&missing),
            Err(ValidationError::FileNotFound(missing.clone()))
        );
    }

    #[test]
    fn model_is_trimmed_or_dropped() {
        assert_eq!(validate_model(Some("  opus ")), Some("opus".to_string()));
        assert_eq!(validate_model(Some("   ")), None);
        assert_eq!(validate_model(None), None);
    }

    #[test]
    fn output_name_checks() {
        assert_eq!(validate_output_file("summary.md"), Ok("summary.md"));
        assert_eq!(
            validate_output_file(""),
            Err(ValidationError::EmptyOutputName)
        );
        for bad in ["a<b", "a>b", "c:d", "x\"y", "p|q", "why?", "star*"] {
            assert_eq!(
                validate_output_file(bad),
                Err(ValidationError::InvalidOutputName),
                "{bad:?}"
            );
        }
    }
}
